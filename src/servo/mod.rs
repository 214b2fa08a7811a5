//! Image-based visual servoing: interaction matrices, the velocity solve and
//! the per-tick pipeline, plus the controller and robot contracts built on it.

pub mod controller;
pub mod interaction;
pub mod manipulator;
pub mod pipeline;
pub mod solver;

pub use controller::{IbvsController, Observation, ServoStep, VisualServoController};
pub use interaction::{interaction_matrix, PointDepths};
pub use manipulator::{Manipulator, ManipulatorCapabilities, SimulatedManipulator, VelocityCommand};
pub use pipeline::{Ibvs, ServoOutput};
pub use solver::{velocity_from_keypoints, VelocityEstimate, VelocitySolver};
