use log::{trace, warn};
use nalgebra as na;
use serde::Serialize;

use super::interaction::{interaction_matrix, PointDepths};
use crate::camera_model::PinholeCamera;
use crate::error::{Result, ServoError};
use crate::geometry::transforms::{Frame, Twist};

/// Full rank of the 6-DOF interaction matrix.
pub const FULL_RANK: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct VelocityEstimate {
    /// Camera-frame twist driving the current view towards the reference.
    pub twist: Twist,
    pub rank: usize,
    pub singular_values: Vec<f64>,
    /// `‖L v - e‖` of the least-squares fit.
    pub residual: f64,
    pub num_points: usize,
}

impl VelocityEstimate {
    /// Some motion directions are unobservable; the unobservable components
    /// of the twist are zero (minimum-norm solution).
    pub fn is_degenerate(&self) -> bool {
        self.rank < FULL_RANK
    }

    pub fn condition_number(&self) -> f64 {
        let max = self.singular_values.iter().copied().fold(0.0, f64::max);
        let min = self.singular_values.iter().copied().fold(f64::INFINITY, f64::min);
        if min <= 0.0 { f64::INFINITY } else { max / min }
    }
}

/// Least-squares IBVS solve on the mean of the reference and current
/// interaction matrices.
#[derive(Debug, Clone, Copy)]
pub struct VelocitySolver {
    /// Singular values below `rcond * σ_max` are treated as zero.
    rcond: f64,
}

impl Default for VelocitySolver {
    fn default() -> Self {
        VelocitySolver { rcond: 1e-10 }
    }
}

impl VelocitySolver {
    pub fn new(rcond: f64) -> Result<VelocitySolver> {
        if !(rcond.is_finite() && (0.0..1.0).contains(&rcond)) {
            return Err(ServoError::InvalidConfiguration(format!(
                "rcond must be in [0, 1), got {}",
                rcond
            )));
        }
        Ok(VelocitySolver { rcond })
    }

    /// Points are normalized image coordinates, index aligned.
    pub fn solve(
        &self,
        reference: &[na::Vector2<f64>],
        current: &[na::Vector2<f64>],
        reference_depths: &PointDepths,
        current_depths: &PointDepths,
    ) -> Result<VelocityEstimate> {
        if reference.len() != current.len() {
            return Err(ServoError::InputShapeMismatch(format!(
                "{} reference points but {} current points",
                reference.len(),
                current.len()
            )));
        }
        let n = reference.len();
        if n == 0 {
            return Err(ServoError::InsufficientCorrespondences {
                found: 0,
                required: 1,
            });
        }

        let l_ref = interaction_matrix(reference, reference_depths)?;
        let l_cur = interaction_matrix(current, current_depths)?;
        let l_mean = (l_ref + l_cur) * 0.5;
        let mut error = na::DVector::zeros(2 * n);
        for (i, (r, c)) in reference.iter().zip(current.iter()).enumerate() {
            error[2 * i] = r.x - c.x;
            error[2 * i + 1] = r.y - c.y;
        }

        let svd = l_mean.clone().svd(true, true);
        let sigma_max = svd.singular_values.max();
        let cutoff = sigma_max * self.rcond;
        let rank = svd.singular_values.iter().filter(|s| **s > cutoff).count();
        if rank == 0 || !sigma_max.is_finite() {
            return Err(ServoError::DegenerateGeometry(
                "interaction matrix has rank 0".to_string(),
            ));
        }
        let v = svd
            .solve(&error, cutoff)
            .map_err(|msg| ServoError::DegenerateGeometry(msg.to_string()))?;
        if !v.iter().all(|x| x.is_finite()) {
            return Err(ServoError::DegenerateGeometry(
                "least-squares solution is not finite".to_string(),
            ));
        }
        if rank < FULL_RANK {
            warn!(
                "interaction matrix rank {} < {} with {} points, some axes are unobservable",
                rank, FULL_RANK, n
            );
        }
        let residual = (&l_mean * &v - &error).norm();
        trace!("ibvs solve: rank {}, residual {:.3e}", rank, residual);

        let twist = Twist::new(
            Frame::Camera,
            na::Vector3::new(v[0], v[1], v[2]),
            na::Vector3::new(v[3], v[4], v[5]),
        );
        Ok(VelocityEstimate {
            twist,
            rank,
            singular_values: svd.singular_values.iter().copied().collect(),
            residual,
            num_points: n,
        })
    }
}

/// Pixel keypoints through the camera model, then [`VelocitySolver::solve`].
pub fn velocity_from_keypoints(
    camera: &PinholeCamera,
    reference_px: &[na::Vector2<f64>],
    current_px: &[na::Vector2<f64>],
    reference_depths: &PointDepths,
    current_depths: &PointDepths,
) -> Result<VelocityEstimate> {
    if reference_px.len() != current_px.len() {
        return Err(ServoError::InputShapeMismatch(format!(
            "{} reference keypoints but {} current keypoints",
            reference_px.len(),
            current_px.len()
        )));
    }
    let reference = camera.pixel_to_camera_frame(reference_px);
    let current = camera.pixel_to_camera_frame(current_px);
    VelocitySolver::default().solve(&reference, &current, reference_depths, current_depths)
}
