use serde::{Deserialize, Serialize};

use crate::error::{Result, ServoError};
use crate::features::FeatureConfig;
use crate::geometry::essential::RansacConfig;
use crate::geometry::transforms::{isometry_from_rows, isometry_to_rows, FrameChain};
use crate::servo::manipulator::DEFAULT_ACCELERATION;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Lowe ratio, a match is kept when `best < ratio * second_best`.
    pub ratio: f32,
    /// Matches required before any filtering.
    pub min_matches: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            ratio: 0.75,
            min_matches: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    pub use_median_depth: bool,
    /// Metric depths at or below this are treated as missing.
    pub min_depth: f64,
    /// Multiplier from raw depth units to metres.
    pub depth_scale: f64,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            use_median_depth: false,
            min_depth: 0.0,
            depth_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub gain: f64,
    /// SSIM at or above which the servo loop is considered converged.
    pub convergence_similarity: f64,
    /// Tool acceleration limit sent with every command, m/s².
    pub acceleration: f64,
    /// Seconds each command stays active, 0 means until the next one.
    pub command_duration: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            gain: 0.5,
            convergence_similarity: 0.95,
            acceleration: DEFAULT_ACCELERATION,
            command_duration: 0.0,
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.gain.is_finite() && self.gain > 0.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "control gain must be positive, got {}",
                self.gain
            )));
        }
        if !(self.acceleration.is_finite() && self.acceleration > 0.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "acceleration must be positive, got {}",
                self.acceleration
            )));
        }
        if !(self.command_duration.is_finite() && self.command_duration >= 0.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "command_duration must be non-negative, got {}",
                self.command_duration
            )));
        }
        Ok(())
    }
}

/// Camera-to-tool and base-to-world as row-major homogeneous matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameChainConfig {
    pub camera_to_tool: [[f64; 4]; 4],
    pub base_to_world: [[f64; 4]; 4],
}

const IDENTITY_ROWS: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

impl Default for FrameChainConfig {
    fn default() -> Self {
        Self {
            camera_to_tool: IDENTITY_ROWS,
            base_to_world: IDENTITY_ROWS,
        }
    }
}

impl FrameChainConfig {
    pub fn to_chain(&self) -> Result<FrameChain> {
        Ok(FrameChain::new(
            isometry_from_rows(&self.camera_to_tool)?,
            isometry_from_rows(&self.base_to_world)?,
        ))
    }

    pub fn from_chain(chain: &FrameChain) -> FrameChainConfig {
        FrameChainConfig {
            camera_to_tool: isometry_to_rows(&chain.camera_to_tool),
            base_to_world: isometry_to_rows(&chain.base_to_world),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    pub features: FeatureConfig,
    pub matching: MatchingConfig,
    pub ransac: RansacConfig,
    pub depth: DepthConfig,
    pub control: ControlConfig,
    pub frames: FrameChainConfig,
}

impl ServoConfig {
    /// Checks every section; components validate again when built.
    pub fn validate(&self) -> Result<()> {
        if !(self.matching.ratio > 0.0 && self.matching.ratio <= 1.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "match ratio must be in (0, 1], got {}",
                self.matching.ratio
            )));
        }
        if self.matching.min_matches < 3 {
            return Err(ServoError::InvalidConfiguration(format!(
                "min_matches must be at least 3, got {}",
                self.matching.min_matches
            )));
        }
        self.ransac.validate()?;
        if !(self.depth.depth_scale.is_finite() && self.depth.depth_scale > 0.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "depth_scale must be positive, got {}",
                self.depth.depth_scale
            )));
        }
        if !(self.depth.min_depth.is_finite() && self.depth.min_depth >= 0.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "min_depth must be non-negative, got {}",
                self.depth.min_depth
            )));
        }
        self.control.validate()?;
        self.frames.to_chain()?;
        Ok(())
    }
}
