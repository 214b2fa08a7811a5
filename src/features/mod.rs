//! Keypoint detection and binary descriptors.
//!
//! The correspondence search only relies on [`FeatureExtractor`]: anything that
//! turns a grey image into keypoints with a fixed-length descriptor can be
//! plugged in. The supported detectors form a closed set, [`DetectorKind`],
//! chosen once at configuration time.

pub mod matcher;
pub mod orb;

use std::fmt;
use std::str::FromStr;

use image::GrayImage;
use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServoError};

pub use matcher::{Match, RatioMatcher};
pub use orb::OrbExtractor;

pub const DESCRIPTOR_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub x: f64,
    pub y: f64,
    /// Orientation in radians, 0 for upright detectors.
    pub angle: f32,
    pub response: f32,
}

impl KeyPoint {
    pub fn pt(&self) -> na::Vector2<f64> {
        na::Vector2::new(self.x, self.y)
    }
}

/// 256-bit binary descriptor compared by Hamming distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor(pub [u8; DESCRIPTOR_BYTES]);

impl Descriptor {
    pub fn distance(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Feature {
    pub keypoint: KeyPoint,
    pub descriptor: Descriptor,
}

pub trait FeatureExtractor: Send + Sync {
    fn kind(&self) -> DetectorKind;
    fn detect_and_compute(&self, image: &GrayImage) -> Vec<Feature>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DetectorKind {
    /// Oriented FAST corners with rotated BRIEF descriptors.
    Orb,
    /// Upright FAST corners with plain BRIEF descriptors.
    FastBrief,
}

impl DetectorKind {
    pub fn name(self) -> &'static str {
        match self {
            DetectorKind::Orb => "orb",
            DetectorKind::FastBrief => "fast_brief",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DetectorKind {
    type Err = ServoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "orb" => Ok(DetectorKind::Orb),
            "fast_brief" | "brief" => Ok(DetectorKind::FastBrief),
            other => Err(ServoError::InvalidConfiguration(format!(
                "unsupported feature detector '{}', expected one of: orb, fast_brief",
                other
            ))),
        }
    }
}

impl TryFrom<String> for DetectorKind {
    type Error = ServoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DetectorKind> for String {
    fn from(kind: DetectorKind) -> String {
        kind.name().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub detector: DetectorKind,
    pub max_features: usize,
    pub fast_threshold: u8,
    pub nms_radius: u32,
    pub blur_sigma: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::Orb,
            max_features: 500,
            fast_threshold: 20,
            nms_radius: 3,
            blur_sigma: 2.0,
        }
    }
}

/// Builds the extractor named by `config.detector`.
pub fn create_extractor(config: &FeatureConfig) -> Result<Box<dyn FeatureExtractor>> {
    let extractor = match config.detector {
        DetectorKind::Orb => OrbExtractor::new(config, true)?,
        DetectorKind::FastBrief => OrbExtractor::new(config, false)?,
    };
    Ok(Box::new(extractor))
}
