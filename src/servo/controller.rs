use image::RgbImage;
use log::{debug, info};
use serde::Serialize;

use super::manipulator::{Manipulator, VelocityCommand};
use super::pipeline::{Ibvs, ServoOutput};
use crate::camera_model::DepthImage;
use crate::config::ControlConfig;
use crate::correspondence::ExclusionMask;
use crate::error::{Result, ServoError};
use crate::geometry::transforms::{FrameChain, Twist};

/// The latest camera frame handed to a controller.
pub struct Observation {
    pub image: RgbImage,
    pub depth: DepthImage,
    pub mask: Option<ExclusionMask>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServoStep {
    /// Gain-scaled camera-frame command.
    pub camera: Twist,
    pub tool: Twist,
    /// `tool` with the configured acceleration and duration.
    pub command: VelocityCommand,
    pub similarity: f64,
    pub converged: bool,
    pub num_points: usize,
}

pub trait VisualServoController {
    fn update(&mut self, observation: Observation);
    fn calc_vel(&self) -> Result<ServoStep>;
}

/// Proportional IBVS law `v = λ L⁺ e` towards a fixed reference view.
pub struct IbvsController {
    ibvs: Ibvs,
    frames: FrameChain,
    reference: RgbImage,
    reference_depth: DepthImage,
    control: ControlConfig,
    use_median_depth: bool,
    observation: Option<Observation>,
}

impl IbvsController {
    pub fn new(
        ibvs: Ibvs,
        frames: FrameChain,
        reference: RgbImage,
        reference_depth: DepthImage,
        control: &ControlConfig,
    ) -> Result<IbvsController> {
        control.validate()?;
        let use_median_depth = ibvs.depth_config().use_median_depth;
        Ok(IbvsController {
            ibvs,
            frames,
            reference,
            reference_depth,
            control: control.clone(),
            use_median_depth,
            observation: None,
        })
    }

    pub fn gain(&self) -> f64 {
        self.control.gain
    }

    /// One servo tick: computes the command and sends it to `arm` in the tool frame.
    pub fn drive<M: Manipulator>(&self, arm: &mut M) -> Result<ServoStep> {
        let step = self.calc_vel()?;
        arm.apply_tcp_vel(&step.command)?;
        Ok(step)
    }

    /// Full pipeline output for the latest observation, before the gain.
    pub fn evaluate(&self) -> Result<ServoOutput> {
        let obs = self.observation.as_ref().ok_or_else(|| {
            ServoError::InputShapeMismatch("no observation received yet".to_string())
        })?;
        self.ibvs.compute_velocity_from_images(
            &self.reference,
            &obs.image,
            &self.reference_depth,
            &obs.depth,
            obs.mask.as_ref(),
            self.use_median_depth,
        )
    }
}

impl VisualServoController for IbvsController {
    fn update(&mut self, observation: Observation) {
        debug!(
            "new observation {}x{}",
            observation.image.width(),
            observation.image.height()
        );
        self.observation = Some(observation);
    }

    fn calc_vel(&self) -> Result<ServoStep> {
        let output = self.evaluate()?;
        let converged = output.similarity >= self.control.convergence_similarity;
        if converged {
            info!(
                "converged, similarity {:.4} >= {:.4}",
                output.similarity, self.control.convergence_similarity
            );
        }
        let camera = output.velocity.scaled(self.control.gain);
        let tool = self.frames.camera_to_tool(&camera)?;
        let command = VelocityCommand::new(tool)
            .with_acceleration(self.control.acceleration)
            .with_duration(self.control.command_duration);
        Ok(ServoStep {
            camera,
            tool,
            command,
            similarity: output.similarity,
            converged,
            num_points: output.estimate.num_points,
        })
    }
}
