use std::path::Path;

use ab_glyph::FontArc;
use image::{ImageBuffer, Luma, RgbImage};
use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::camera_model::{DepthImage, Intrinsics, PinholeCamera};
use crate::config::{FrameChainConfig, ServoConfig};
use crate::correspondence::ExclusionMask;
use crate::error::{Result, ServoError};
use crate::geometry::transforms::FrameChain;

/// Serializes an object to a pretty-printed JSON file.
pub fn object_to_json<T: Serialize>(output_path: impl AsRef<Path>, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    std::fs::write(output_path, j)?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Like [`object_from_json`], but malformed content is a configuration error.
fn config_from_json<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    serde_json::from_str(&contents).map_err(|e| {
        ServoError::InvalidConfiguration(format!("{}: {}", file_path.display(), e))
    })
}

pub fn load_config(path: impl AsRef<Path>) -> Result<ServoConfig> {
    let config: ServoConfig = config_from_json(path.as_ref())?;
    config.validate()?;
    debug!("loaded config from {}", path.as_ref().display());
    Ok(config)
}

pub fn load_camera(path: impl AsRef<Path>) -> Result<PinholeCamera> {
    let intrinsics: Intrinsics = config_from_json(path.as_ref())?;
    PinholeCamera::new(intrinsics)
}

pub fn load_frame_chain(path: impl AsRef<Path>) -> Result<FrameChain> {
    let frames: FrameChainConfig = config_from_json(path.as_ref())?;
    frames.to_chain()
}

pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

/// 16-bit depth image in raw sensor units; the pipeline applies `depth_scale`.
pub fn load_depth(path: impl AsRef<Path>) -> Result<DepthImage> {
    let raw = image::open(path)?.to_luma16();
    let (w, h) = raw.dimensions();
    let data: Vec<f32> = raw.as_raw().iter().map(|&d| d as f32).collect();
    ImageBuffer::from_raw(w, h, data).ok_or_else(|| {
        ServoError::InputShapeMismatch(format!("depth buffer does not fit {}x{}", w, h))
    })
}

/// Writes `depth / scale` as a 16-bit PNG. Read it back with [`load_depth`]
/// and a `depth_scale` of `scale`.
pub fn save_depth(path: impl AsRef<Path>, depth: &DepthImage, scale: f64) -> Result<()> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(ServoError::InvalidConfiguration(format!(
            "depth scale must be positive, got {}",
            scale
        )));
    }
    let raw = ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(depth.width(), depth.height(), |x, y| {
        let d = depth.get_pixel(x, y)[0] as f64 / scale;
        Luma([d.round().clamp(0.0, u16::MAX as f64) as u16])
    });
    raw.save(path)?;
    Ok(())
}

/// Any non-zero pixel of the image file is excluded.
pub fn load_mask(path: impl AsRef<Path>) -> Result<ExclusionMask> {
    Ok(ExclusionMask(image::open(path)?.to_luma8()))
}

/// TrueType or OpenType font for the image overlay.
pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc> {
    let bytes = std::fs::read(path.as_ref())?;
    FontArc::try_from_vec(bytes).map_err(|e| {
        ServoError::InvalidConfiguration(format!("{}: {}", path.as_ref().display(), e))
    })
}

pub fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&Rfc3339).unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub path: String,
    /// `[vx, vy, vz, wx, wy, wz]` in the camera frame.
    pub velocity: Option<[f64; 6]>,
    pub similarity: Option<f64>,
    pub num_points: usize,
    pub rank: Option<usize>,
    pub residual: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceReport {
    pub timestamp: String,
    pub reference: String,
    pub frames: Vec<FrameReport>,
    pub succeeded: usize,
    pub failed: usize,
}

impl SequenceReport {
    pub fn new(reference: &str, frames: Vec<FrameReport>) -> SequenceReport {
        let failed = frames.iter().filter(|f| f.error.is_some()).count();
        SequenceReport {
            timestamp: timestamp(),
            reference: reference.to_string(),
            succeeded: frames.len() - failed,
            failed,
            frames,
        }
    }
}

pub fn write_report(output_path: impl AsRef<Path>, report: &SequenceReport) -> Result<()> {
    object_to_json(output_path, report)
}
