use ab_glyph::FontArc;
use image::{GrayImage, RgbImage};
use log::{debug, info};
use nalgebra as na;

use super::interaction::PointDepths;
use super::solver::{VelocityEstimate, VelocitySolver};
use crate::camera_model::{CameraModel, DepthImage, PinholeCamera};
use crate::config::{DepthConfig, ServoConfig};
use crate::correspondence::{CorrespondenceFinder, CorrespondenceResult, ExclusionMask};
use crate::error::{Result, ServoError};
use crate::geometry::transforms::Twist;
use crate::metric;
use crate::visualization::draw_matches;

/// Points needed after depth filtering.
pub const MIN_DEPTH_POINTS: usize = 3;

pub struct ServoOutput {
    /// Camera-frame twist.
    pub velocity: Twist,
    pub similarity: f64,
    pub annotated: RgbImage,
    pub correspondences: CorrespondenceResult,
    pub estimate: VelocityEstimate,
}

/// Depth at the pixel nearest to `pt`, clamped to the image and scaled to metres.
pub fn sample_depth(depth: &DepthImage, pt: &na::Vector2<f64>, scale: f64) -> f64 {
    let (w, h) = depth.dimensions();
    let u = pt.x.round().clamp(0.0, (w.max(1) - 1) as f64) as u32;
    let v = pt.y.round().clamp(0.0, (h.max(1) - 1) as f64) as u32;
    depth.get_pixel(u, v)[0] as f64 * scale
}

/// One IBVS tick: images in, camera-frame velocity out.
pub struct Ibvs {
    camera: PinholeCamera,
    finder: CorrespondenceFinder,
    solver: VelocitySolver,
    depth: DepthConfig,
    font: Option<FontArc>,
}

impl Ibvs {
    pub fn new(camera: PinholeCamera, config: &ServoConfig) -> Result<Ibvs> {
        config.validate()?;
        Ok(Ibvs {
            camera,
            finder: CorrespondenceFinder::new(config)?,
            solver: VelocitySolver::default(),
            depth: config.depth.clone(),
            font: None,
        })
    }

    /// Font for the match count and similarity written on the annotated image.
    pub fn with_font(mut self, font: FontArc) -> Ibvs {
        self.font = Some(font);
        self
    }

    pub fn camera(&self) -> &PinholeCamera {
        &self.camera
    }

    pub fn depth_config(&self) -> &DepthConfig {
        &self.depth
    }

    fn check_shapes(
        &self,
        reference: &RgbImage,
        current: &RgbImage,
        reference_depth: &DepthImage,
        current_depth: &DepthImage,
        mask: Option<&ExclusionMask>,
    ) -> Result<()> {
        let dims = reference.dimensions();
        let mut named = vec![
            ("current image", current.dimensions()),
            ("reference depth", reference_depth.dimensions()),
            ("current depth", current_depth.dimensions()),
            ("intrinsics", (self.camera.width(), self.camera.height())),
        ];
        if let Some(mask) = mask {
            named.push(("mask", mask.dimensions()));
        }
        for (name, other) in named {
            if other != dims {
                return Err(ServoError::InputShapeMismatch(format!(
                    "{} is {}x{}, reference image is {}x{}",
                    name, other.0, other.1, dims.0, dims.1
                )));
            }
        }
        Ok(())
    }

    pub fn compute_velocity_from_images(
        &self,
        reference: &RgbImage,
        current: &RgbImage,
        reference_depth: &DepthImage,
        current_depth: &DepthImage,
        mask: Option<&ExclusionMask>,
        use_median_depth: bool,
    ) -> Result<ServoOutput> {
        self.check_shapes(reference, current, reference_depth, current_depth, mask)?;

        let ref_gray: GrayImage = image::imageops::grayscale(reference);
        let cur_gray: GrayImage = image::imageops::grayscale(current);
        let correspondences = self.finder.find(&ref_gray, &cur_gray, mask, &self.camera)?;

        let pairs = &correspondences.correspondences;
        let scale = self.depth.depth_scale;
        let valid = |z: f64| z.is_finite() && z > self.depth.min_depth;
        let mut ref_px = Vec::with_capacity(pairs.len());
        let mut cur_px = Vec::with_capacity(pairs.len());
        let mut ref_z = Vec::with_capacity(pairs.len());
        let mut cur_z = Vec::with_capacity(pairs.len());
        for (r, c) in pairs.reference.iter().zip(pairs.current.iter()) {
            let zr = sample_depth(reference_depth, r, scale);
            let zc = sample_depth(current_depth, c, scale);
            if valid(zr) && valid(zc) {
                ref_px.push(*r);
                cur_px.push(*c);
                ref_z.push(zr);
                cur_z.push(zc);
            }
        }
        debug!(
            "{} of {} correspondences have valid depth in both views",
            ref_z.len(),
            pairs.len()
        );
        if ref_z.len() < MIN_DEPTH_POINTS {
            return Err(ServoError::DegenerateGeometry(format!(
                "only {} correspondences with valid depth, need {}",
                ref_z.len(),
                MIN_DEPTH_POINTS
            )));
        }

        let (ref_depths, cur_depths) = if use_median_depth {
            (PointDepths::median_of(&ref_z)?, PointDepths::median_of(&cur_z)?)
        } else {
            (PointDepths::PerPoint(ref_z), PointDepths::PerPoint(cur_z))
        };
        let estimate = self.solver.solve(
            &self.camera.pixel_to_camera_frame(&ref_px),
            &self.camera.pixel_to_camera_frame(&cur_px),
            &ref_depths,
            &cur_depths,
        )?;

        let similarity = metric::ssim(reference, current)?;
        let annotated = draw_matches(
            reference,
            current,
            &correspondences,
            Some(similarity),
            self.font.as_ref(),
        );
        info!(
            "{} points, v = [{:.4}, {:.4}, {:.4}] w = [{:.4}, {:.4}, {:.4}], ssim {:.4}",
            estimate.num_points,
            estimate.twist.linear.x,
            estimate.twist.linear.y,
            estimate.twist.linear.z,
            estimate.twist.angular.x,
            estimate.twist.angular.y,
            estimate.twist.angular.z,
            similarity
        );
        Ok(ServoOutput {
            velocity: estimate.twist,
            similarity,
            annotated,
            correspondences,
            estimate,
        })
    }
}
