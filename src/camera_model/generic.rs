use nalgebra as na;
use rayon::prelude::*;

/// Projection contract shared by camera models.
///
/// `project_one` returns `None` for points that cannot be imaged
/// (on the camera plane or non-finite); it does not clip to the image bounds.
pub trait CameraModel
where
    Self: Sync,
{
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn project_one(&self, pt: &na::Vector3<f64>) -> Option<na::Vector2<f64>>;
    /// Pixel to the normalized image plane (`z = 1`).
    fn unproject_one(&self, pt: &na::Vector2<f64>) -> na::Vector2<f64>;

    fn project(&self, p3d: &[na::Vector3<f64>]) -> Vec<Option<na::Vector2<f64>>> {
        p3d.par_iter().map(|pt| self.project_one(pt)).collect()
    }
    fn unproject(&self, p2d: &[na::Vector2<f64>]) -> Vec<na::Vector2<f64>> {
        p2d.par_iter().map(|pt| self.unproject_one(pt)).collect()
    }
}
