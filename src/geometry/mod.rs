pub mod essential;
pub mod transforms;

pub use essential::{
    EpipolarEstimate, EpipolarModel, EpipolarRansac, EssentialMatrix, FivePoint, NormalizedMatch,
    RansacConfig, five_point,
};
pub use transforms::{Frame, FrameChain, Twist, link_vel_transform, vel_transform};
