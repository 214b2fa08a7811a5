//! Contract between the servo loop and a robot arm.
//!
//! Implementations only need to accept base-frame velocity commands and to
//! report the tool pose; frame conversions are provided on top of those.

use log::debug;
use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServoError};
use crate::geometry::transforms::{link_vel_transform, vel_transform, Frame, FrameChain, Twist};

pub const DEFAULT_ACCELERATION: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub twist: Twist,
    /// Tool acceleration limit in m/s².
    pub acceleration: f64,
    /// Seconds the command stays active, 0 means until the next command.
    pub duration: f64,
}

impl VelocityCommand {
    pub fn new(twist: Twist) -> VelocityCommand {
        VelocityCommand {
            twist,
            acceleration: DEFAULT_ACCELERATION,
            duration: 0.0,
        }
    }

    pub fn with_acceleration(mut self, acceleration: f64) -> VelocityCommand {
        self.acceleration = acceleration;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> VelocityCommand {
        self.duration = duration;
        self
    }

    fn with_twist(&self, twist: Twist) -> VelocityCommand {
        VelocityCommand { twist, ..*self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManipulatorCapabilities {
    pub protocol_version: u32,
    /// Controller compensates joint errors inside its inverse kinematics.
    pub ik_joint_error_correction: bool,
}

impl Default for ManipulatorCapabilities {
    fn default() -> Self {
        ManipulatorCapabilities {
            protocol_version: 1,
            ik_joint_error_correction: false,
        }
    }
}

pub trait Manipulator {
    /// Tool pose in the base frame.
    fn tcp_pose(&self) -> Result<na::Isometry3<f64>>;
    fn base_to_world(&self) -> na::Isometry3<f64>;
    fn capabilities(&self) -> ManipulatorCapabilities;
    /// `cmd.twist` must be expressed in [`Frame::Base`].
    fn apply_vel(&mut self, cmd: &VelocityCommand) -> Result<()>;
    fn stop(&mut self) -> Result<()>;

    fn world_pose(&self) -> Result<na::Isometry3<f64>> {
        Ok(self.base_to_world() * self.tcp_pose()?)
    }

    fn apply_tcp_vel(&mut self, cmd: &VelocityCommand) -> Result<()> {
        cmd.twist.expect_frame(Frame::Tool)?;
        let tcp = self.tcp_pose()?;
        let v = vel_transform(&cmd.twist.to_vector(), &tcp.rotation);
        self.apply_vel(&cmd.with_twist(Twist::from_vector(Frame::Base, &v)))
    }

    fn apply_world_vel(&mut self, cmd: &VelocityCommand) -> Result<()> {
        cmd.twist.expect_frame(Frame::World)?;
        let rotation = self.base_to_world().rotation.inverse();
        let v = vel_transform(&cmd.twist.to_vector(), &rotation);
        self.apply_vel(&cmd.with_twist(Twist::from_vector(Frame::Base, &v)))
    }

    fn apply_camera_vel(&mut self, cmd: &VelocityCommand, camera_to_tool: &na::Isometry3<f64>) -> Result<()> {
        cmd.twist.expect_frame(Frame::Camera)?;
        let v = link_vel_transform(&cmd.twist.to_vector(), camera_to_tool);
        self.apply_tcp_vel(&cmd.with_twist(Twist::from_vector(Frame::Tool, &v)))
    }
}

/// Kinematic stand-in for a real arm: base-frame twists are integrated
/// over the command duration.
#[derive(Debug, Clone)]
pub struct SimulatedManipulator {
    tcp: na::Isometry3<f64>,
    base_to_world: na::Isometry3<f64>,
    capabilities: ManipulatorCapabilities,
    last_command: Option<VelocityCommand>,
    /// No command is moving the arm: a timed command has run to completion
    /// or `stop` was called. An untimed command keeps it moving.
    idle: bool,
}

impl SimulatedManipulator {
    pub fn new(tcp: na::Isometry3<f64>, base_to_world: na::Isometry3<f64>) -> SimulatedManipulator {
        SimulatedManipulator {
            tcp,
            base_to_world,
            capabilities: ManipulatorCapabilities::default(),
            last_command: None,
            idle: true,
        }
    }

    pub fn from_chain(tcp: na::Isometry3<f64>, chain: &FrameChain) -> SimulatedManipulator {
        SimulatedManipulator::new(tcp, chain.base_to_world)
    }

    pub fn with_capabilities(mut self, capabilities: ManipulatorCapabilities) -> SimulatedManipulator {
        self.capabilities = capabilities;
        self
    }

    pub fn last_command(&self) -> Option<&VelocityCommand> {
        self.last_command.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        self.idle
    }
}

impl Manipulator for SimulatedManipulator {
    fn tcp_pose(&self) -> Result<na::Isometry3<f64>> {
        Ok(self.tcp)
    }

    fn base_to_world(&self) -> na::Isometry3<f64> {
        self.base_to_world
    }

    fn capabilities(&self) -> ManipulatorCapabilities {
        self.capabilities
    }

    fn apply_vel(&mut self, cmd: &VelocityCommand) -> Result<()> {
        cmd.twist.expect_frame(Frame::Base)?;
        if !cmd.twist.is_finite() {
            return Err(ServoError::InvalidConfiguration(
                "velocity command is not finite".to_string(),
            ));
        }
        if !(cmd.duration.is_finite() && cmd.duration >= 0.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "command duration must be non-negative, got {}",
                cmd.duration
            )));
        }
        let dt = cmd.duration;
        let rotation = na::UnitQuaternion::from_scaled_axis(cmd.twist.angular * dt);
        let translation = self.tcp.translation.vector + cmd.twist.linear * dt;
        self.tcp = na::Isometry3::from_parts(
            na::Translation3::from(translation),
            rotation * self.tcp.rotation,
        );
        debug!("simulated arm moved for {:.3}s to {}", dt, self.tcp.translation.vector.transpose());
        self.last_command = Some(*cmd);
        self.idle = dt > 0.0;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.idle = true;
        self.last_command = None;
        Ok(())
    }
}
