use std::fmt;

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServoError};

const ROTATION_TOLERANCE: f64 = 1e-6;

/// Coordinate frame a twist is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frame {
    Camera,
    Tool,
    Base,
    World,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Frame::Camera => "camera",
            Frame::Tool => "tool",
            Frame::Base => "base",
            Frame::World => "world",
        };
        f.write_str(name)
    }
}

/// Spatial velocity: linear part in m/s, angular part in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    pub frame: Frame,
    pub linear: na::Vector3<f64>,
    pub angular: na::Vector3<f64>,
}

impl Twist {
    pub fn new(frame: Frame, linear: na::Vector3<f64>, angular: na::Vector3<f64>) -> Twist {
        Twist {
            frame,
            linear,
            angular,
        }
    }

    pub fn zero(frame: Frame) -> Twist {
        Twist::new(frame, na::Vector3::zeros(), na::Vector3::zeros())
    }

    /// `[vx, vy, vz, wx, wy, wz]` layout.
    pub fn from_vector(frame: Frame, v: &na::Vector6<f64>) -> Twist {
        Twist::new(
            frame,
            v.fixed_rows::<3>(0).into_owned(),
            v.fixed_rows::<3>(3).into_owned(),
        )
    }

    pub fn to_vector(&self) -> na::Vector6<f64> {
        na::Vector6::new(
            self.linear.x,
            self.linear.y,
            self.linear.z,
            self.angular.x,
            self.angular.y,
            self.angular.z,
        )
    }

    pub fn scaled(&self, gain: f64) -> Twist {
        Twist::new(self.frame, self.linear * gain, self.angular * gain)
    }

    pub fn is_finite(&self) -> bool {
        self.linear.iter().chain(self.angular.iter()).all(|v| v.is_finite())
    }

    pub fn expect_frame(&self, frame: Frame) -> Result<()> {
        if self.frame != frame {
            return Err(ServoError::InvalidConfiguration(format!(
                "twist is expressed in the {} frame, expected {}",
                self.frame, frame
            )));
        }
        Ok(())
    }
}

/// Rotates both halves of a twist: `block_diag(R, R) · v`.
pub fn vel_transform(v: &na::Vector6<f64>, rotation: &na::UnitQuaternion<f64>) -> na::Vector6<f64> {
    let linear = rotation * v.fixed_rows::<3>(0).into_owned();
    let angular = rotation * v.fixed_rows::<3>(3).into_owned();
    na::Vector6::new(
        linear.x, linear.y, linear.z, angular.x, angular.y, angular.z,
    )
}

/// Moves a twist across a rigid link: `w' = R w`, `v' = R v - t × w'`.
pub fn link_vel_transform(v: &na::Vector6<f64>, transform: &na::Isometry3<f64>) -> na::Vector6<f64> {
    let rotation = &transform.rotation;
    let t = transform.translation.vector;
    let angular = rotation * v.fixed_rows::<3>(3).into_owned();
    let linear = rotation * v.fixed_rows::<3>(0).into_owned() - t.cross(&angular);
    na::Vector6::new(
        linear.x, linear.y, linear.z, angular.x, angular.y, angular.z,
    )
}

/// Accepts a 3×3 matrix only if it is orthonormal with determinant +1.
pub fn rotation_from_matrix(m: &na::Matrix3<f64>) -> Result<na::UnitQuaternion<f64>> {
    if !m.iter().all(|v| v.is_finite()) {
        return Err(ServoError::InvalidConfiguration(
            "rotation matrix has non-finite entries".to_string(),
        ));
    }
    let orthogonality = (m.transpose() * m - na::Matrix3::identity()).abs().max();
    let det = m.determinant();
    if orthogonality > ROTATION_TOLERANCE || (det - 1.0).abs() > ROTATION_TOLERANCE {
        return Err(ServoError::InvalidConfiguration(format!(
            "not a rotation matrix (orthogonality error {:.2e}, det {:.6})",
            orthogonality, det
        )));
    }
    let rot = na::Rotation3::from_matrix_unchecked(*m);
    Ok(na::UnitQuaternion::from_rotation_matrix(&rot))
}

/// Homogeneous 4×4 matrix to a rigid transform.
pub fn isometry_from_matrix(m: &na::Matrix4<f64>) -> Result<na::Isometry3<f64>> {
    let bottom = m.fixed_view::<1, 4>(3, 0);
    let expected = na::RowVector4::new(0.0, 0.0, 0.0, 1.0);
    if (bottom - expected).abs().max() > ROTATION_TOLERANCE {
        return Err(ServoError::InvalidConfiguration(format!(
            "homogeneous transform must end with [0, 0, 0, 1], got {}",
            bottom
        )));
    }
    let rotation = rotation_from_matrix(&m.fixed_view::<3, 3>(0, 0).into_owned())?;
    let t = m.fixed_view::<3, 1>(0, 3).into_owned();
    if !t.iter().all(|v| v.is_finite()) {
        return Err(ServoError::InvalidConfiguration(
            "translation has non-finite entries".to_string(),
        ));
    }
    Ok(na::Isometry3::from_parts(na::Translation3::from(t), rotation))
}

pub fn isometry_from_rows(rows: &[[f64; 4]; 4]) -> Result<na::Isometry3<f64>> {
    let m = na::Matrix4::from_fn(|r, c| rows[r][c]);
    isometry_from_matrix(&m)
}

pub fn isometry_to_rows(iso: &na::Isometry3<f64>) -> [[f64; 4]; 4] {
    let m = iso.to_homogeneous();
    let mut rows = [[0.0; 4]; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = m[(r, c)];
        }
    }
    rows
}

pub fn rtvec_to_isometry(rvec: &na::Vector3<f64>, tvec: &na::Vector3<f64>) -> na::Isometry3<f64> {
    na::Isometry3::new(*tvec, *rvec)
}

/// `[x, y, z, rx, ry, rz]` with the rotation as an axis-angle vector.
pub fn pose_to_isometry(pose: &[f64; 6]) -> na::Isometry3<f64> {
    rtvec_to_isometry(
        &na::Vector3::new(pose[3], pose[4], pose[5]),
        &na::Vector3::new(pose[0], pose[1], pose[2]),
    )
}

pub fn isometry_to_pose(iso: &na::Isometry3<f64>) -> [f64; 6] {
    let t = iso.translation.vector;
    let r = iso.rotation.scaled_axis();
    [t.x, t.y, t.z, r.x, r.y, r.z]
}

/// Fixed transforms between camera, tool, base and world.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameChain {
    /// Maps camera coordinates into the tool (flange) frame.
    pub camera_to_tool: na::Isometry3<f64>,
    /// Maps robot base coordinates into the world frame.
    pub base_to_world: na::Isometry3<f64>,
}

impl Default for FrameChain {
    fn default() -> Self {
        FrameChain {
            camera_to_tool: na::Isometry3::identity(),
            base_to_world: na::Isometry3::identity(),
        }
    }
}

impl FrameChain {
    pub fn new(camera_to_tool: na::Isometry3<f64>, base_to_world: na::Isometry3<f64>) -> FrameChain {
        FrameChain {
            camera_to_tool,
            base_to_world,
        }
    }

    pub fn camera_to_tool(&self, twist: &Twist) -> Result<Twist> {
        twist.expect_frame(Frame::Camera)?;
        let v = link_vel_transform(&twist.to_vector(), &self.camera_to_tool);
        Ok(Twist::from_vector(Frame::Tool, &v))
    }

    /// `tcp_pose` is the tool pose in the base frame.
    pub fn tool_to_base(&self, twist: &Twist, tcp_pose: &na::Isometry3<f64>) -> Result<Twist> {
        twist.expect_frame(Frame::Tool)?;
        let v = vel_transform(&twist.to_vector(), &tcp_pose.rotation);
        Ok(Twist::from_vector(Frame::Base, &v))
    }

    pub fn camera_to_base(&self, twist: &Twist, tcp_pose: &na::Isometry3<f64>) -> Result<Twist> {
        let tool = self.camera_to_tool(twist)?;
        self.tool_to_base(&tool, tcp_pose)
    }

    pub fn base_to_world(&self, twist: &Twist) -> Result<Twist> {
        twist.expect_frame(Frame::Base)?;
        let v = vel_transform(&twist.to_vector(), &self.base_to_world.rotation);
        Ok(Twist::from_vector(Frame::World, &v))
    }

    pub fn world_to_base(&self, twist: &Twist) -> Result<Twist> {
        twist.expect_frame(Frame::World)?;
        let v = vel_transform(&twist.to_vector(), &self.base_to_world.rotation.inverse());
        Ok(Twist::from_vector(Frame::Base, &v))
    }

    pub fn camera_to_world(&self, twist: &Twist, tcp_pose: &na::Isometry3<f64>) -> Result<Twist> {
        let base = self.camera_to_base(twist, tcp_pose)?;
        self.base_to_world(&base)
    }
}
