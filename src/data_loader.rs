use std::path::{Path, PathBuf};

use glob::glob;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use rerun::TimeCell;

use crate::camera_model::DepthImage;
use crate::correspondence::ExclusionMask;
use crate::error::{Result, ServoError};
use crate::io::{load_depth, load_rgb, FrameReport};
use crate::servo::Ibvs;
use crate::visualization::{log_correspondences, log_image_as_compressed};

/// A recorded frame: colour image plus the depth image with the same file stem.
#[derive(Debug, Clone)]
pub struct FramePaths {
    pub time_ns: i64,
    pub rgb: PathBuf,
    pub depth: PathBuf,
}

/// Parses the timestamp from a file path.
///
/// The file stem is read as nanoseconds; anything else falls back to the frame index.
fn path_to_timestamp(path: &Path, idx: usize) -> i64 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(idx as i64 * 100_000_000)
}

fn img_filter(rp: glob::GlobResult) -> Option<PathBuf> {
    if let Ok(p) = rp {
        for ext in &[".png", ".jpg"] {
            if p.as_os_str().to_string_lossy().ends_with(ext) {
                return Some(p);
            }
        }
    }
    None
}

/// Frames under `root/rgb/*` whose depth lives at `root/depth/<stem>.png`,
/// sorted by path.
pub fn list_frames(root_folder: &str) -> Result<Vec<FramePaths>> {
    let pattern = format!("{}/rgb/*", root_folder);
    let img_paths = glob(&pattern)
        .map_err(|e| ServoError::InvalidConfiguration(format!("bad glob {}: {}", pattern, e)))?;
    let mut sorted_path: Vec<PathBuf> = img_paths.into_iter().filter_map(img_filter).collect();
    sorted_path.sort();

    let mut frames = Vec::with_capacity(sorted_path.len());
    for (idx, rgb) in sorted_path.into_iter().enumerate() {
        let Some(stem) = rgb.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let depth = Path::new(root_folder)
            .join("depth")
            .join(format!("{}.png", stem));
        if !depth.exists() {
            log::warn!("no depth for {}, skipping", rgb.display());
            continue;
        }
        frames.push(FramePaths {
            time_ns: path_to_timestamp(&rgb, idx),
            rgb,
            depth,
        });
    }
    log::trace!("found {} frames under {}", frames.len(), root_folder);
    Ok(frames)
}

fn process_frame(
    ibvs: &Ibvs,
    reference: &image::RgbImage,
    reference_depth: &DepthImage,
    frame: &FramePaths,
    mask: Option<&ExclusionMask>,
    recording_option: Option<&rerun::RecordingStream>,
) -> Result<FrameReport> {
    let current = load_rgb(&frame.rgb)?;
    let current_depth = load_depth(&frame.depth)?;
    let output = ibvs.compute_velocity_from_images(
        reference,
        &current,
        reference_depth,
        &current_depth,
        mask,
        ibvs.depth_config().use_median_depth,
    )?;
    if let Some(recording) = recording_option {
        recording.set_time(
            "stable",
            TimeCell::from_timestamp_nanos_since_epoch(frame.time_ns),
        );
        let annotated = image::DynamicImage::ImageRgb8(output.annotated.clone());
        if let Err(e) = log_image_as_compressed(recording, "matches", &annotated, image::ImageFormat::Png)
            .and_then(|_| log_correspondences(recording, "matches", &output.correspondences))
        {
            log::warn!("rerun logging failed: {}", e);
        }
    }
    let v = output.velocity.to_vector();
    Ok(FrameReport {
        path: frame.rgb.display().to_string(),
        velocity: Some([v[0], v[1], v[2], v[3], v[4], v[5]]),
        similarity: Some(output.similarity),
        num_points: output.estimate.num_points,
        rank: Some(output.estimate.rank),
        residual: Some(output.estimate.residual),
        error: None,
    })
}

/// Runs every frame against the reference in parallel. Per-frame failures are
/// recorded in the report rather than aborting the run.
pub fn process_sequence(
    ibvs: &Ibvs,
    reference: &image::RgbImage,
    reference_depth: &DepthImage,
    frames: &[FramePaths],
    mask: Option<&ExclusionMask>,
    recording_option: Option<&rerun::RecordingStream>,
) -> Vec<FrameReport> {
    let mut reports: Vec<_> = frames
        .par_iter()
        .progress_count(frames.len() as u64)
        .map(|frame| {
            let report =
                process_frame(ibvs, reference, reference_depth, frame, mask, recording_option)
                    .unwrap_or_else(|e| {
                        log::warn!("{}: {}", frame.rgb.display(), e);
                        FrameReport {
                            path: frame.rgb.display().to_string(),
                            velocity: None,
                            similarity: None,
                            num_points: 0,
                            rank: None,
                            residual: None,
                            error: Some(e.to_string()),
                        }
                    });
            (frame.time_ns, report)
        })
        .collect();
    reports.sort_by(|a, b| a.0.cmp(&b.0));
    reports.into_iter().map(|r| r.1).collect()
}
