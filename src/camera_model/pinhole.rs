use super::generic::CameraModel;
use crate::error::{Result, ServoError};
use image::{ImageBuffer, Luma};
use nalgebra as na;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Metric depth image aligned to the colour image grid.
pub type DepthImage = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: u32, height: u32) -> Intrinsics {
        Intrinsics {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fx.is_finite() && self.fx > 0.0 && self.fy.is_finite() && self.fy > 0.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "focal lengths must be positive, got fx={} fy={}",
                self.fx, self.fy
            )));
        }
        if !(self.cx.is_finite() && self.cy.is_finite()) {
            return Err(ServoError::InvalidConfiguration(
                "principal point must be finite".to_string(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ServoError::InvalidConfiguration(format!(
                "image size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Row-major `H×W` grid of camera-frame points produced by [`PinholeCamera::backproject`].
#[derive(Debug, Clone)]
pub struct OrganizedCloud {
    pub width: u32,
    pub height: u32,
    pub points: Vec<na::Vector3<f32>>,
}

impl OrganizedCloud {
    pub fn get(&self, u: u32, v: u32) -> Option<&na::Vector3<f32>> {
        if u >= self.width || v >= self.height {
            return None;
        }
        self.points.get(v as usize * self.width as usize + u as usize)
    }
}

/// Distortion-free pinhole camera.
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    intrinsics: Intrinsics,
    k: na::Matrix3<f64>,
}

impl PinholeCamera {
    pub fn new(intrinsics: Intrinsics) -> Result<PinholeCamera> {
        intrinsics.validate()?;
        let k = na::Matrix3::new(
            intrinsics.fx,
            0.0,
            intrinsics.cx,
            0.0,
            intrinsics.fy,
            intrinsics.cy,
            0.0,
            0.0,
            1.0,
        );
        Ok(PinholeCamera { intrinsics, k })
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn k_matrix(&self) -> &na::Matrix3<f64> {
        &self.k
    }

    /// Mean focal length, used to express pixel tolerances on the normalized plane.
    pub fn mean_focal(&self) -> f64 {
        0.5 * (self.intrinsics.fx + self.intrinsics.fy)
    }

    pub fn pixel_to_camera_frame(&self, pixels: &[na::Vector2<f64>]) -> Vec<na::Vector2<f64>> {
        pixels.iter().map(|p| self.unproject_one(p)).collect()
    }

    pub fn camera_frame_to_pixel(&self, normalized: &[na::Vector2<f64>]) -> Vec<na::Vector2<f64>> {
        let Intrinsics { fx, fy, cx, cy, .. } = self.intrinsics;
        normalized
            .iter()
            .map(|p| na::Vector2::new(p.x * fx + cx, p.y * fy + cy))
            .collect()
    }

    /// Every pixel of `depth` lifted to the camera frame.
    ///
    /// Non-positive depth is not an error: the point degenerates to the origin
    /// (or to non-finite values) and the caller filters it.
    pub fn backproject(&self, depth: &DepthImage) -> OrganizedCloud {
        let (w, h) = depth.dimensions();
        let Intrinsics { fx, fy, cx, cy, .. } = self.intrinsics;
        let points = (0..(w as usize * h as usize))
            .into_par_iter()
            .map(|idx| {
                let u = (idx % w as usize) as f64;
                let v = (idx / w as usize) as f64;
                let z = depth.as_raw()[idx] as f64;
                na::Vector3::new(
                    ((u - cx) * z / fx) as f32,
                    ((v - cy) * z / fy) as f32,
                    z as f32,
                )
            })
            .collect();
        OrganizedCloud {
            width: w,
            height: h,
            points,
        }
    }
}

impl CameraModel for PinholeCamera {
    fn width(&self) -> u32 {
        self.intrinsics.width
    }

    fn height(&self) -> u32 {
        self.intrinsics.height
    }

    fn project_one(&self, pt: &na::Vector3<f64>) -> Option<na::Vector2<f64>> {
        if !pt.iter().all(|v| v.is_finite()) || pt.z.abs() < f64::EPSILON {
            return None;
        }
        let Intrinsics { fx, fy, cx, cy, .. } = self.intrinsics;
        Some(na::Vector2::new(
            pt.x * fx / pt.z + cx,
            pt.y * fy / pt.z + cy,
        ))
    }

    fn unproject_one(&self, pt: &na::Vector2<f64>) -> na::Vector2<f64> {
        let Intrinsics { fx, fy, cx, cy, .. } = self.intrinsics;
        na::Vector2::new((pt.x - cx) / fx, (pt.y - cy) / fy)
    }
}
