pub mod camera_model;
pub mod config;
pub mod correspondence;
pub mod data_loader;
pub mod error;
pub mod features;
pub mod geometry;
pub mod io;
pub mod metric;
pub mod servo;
pub mod synthetic;
pub mod visualization;

pub use config::ServoConfig;
pub use error::{Result, ServoError};
pub use geometry::transforms::{Frame, FrameChain, Twist};
pub use servo::{Ibvs, ServoOutput};
