use approx::assert_relative_eq;
use nalgebra as na;
use visual_servo::geometry::transforms::{
    isometry_from_matrix, isometry_from_rows, isometry_to_pose, isometry_to_rows,
    link_vel_transform, pose_to_isometry, rotation_from_matrix, vel_transform,
};
use visual_servo::{Frame, FrameChain, Twist};

fn twist_vec() -> na::Vector6<f64> {
    na::Vector6::new(0.1, -0.2, 0.3, 0.05, -0.01, 0.02)
}

#[test]
fn test_vel_transform_identity() {
    let v = twist_vec();
    assert_relative_eq!(vel_transform(&v, &na::UnitQuaternion::identity()), v);
}

#[test]
fn test_vel_transform_composes() {
    let r1 = na::UnitQuaternion::from_euler_angles(0.1, 0.4, -0.3);
    let r2 = na::UnitQuaternion::from_euler_angles(-0.7, 0.2, 1.1);
    let v = twist_vec();
    let chained = vel_transform(&vel_transform(&v, &r1), &r2);
    let direct = vel_transform(&v, &(r2 * r1));
    assert_relative_eq!(chained, direct, epsilon = 1e-12);
}

#[test]
fn test_link_without_translation_is_rotation() {
    let r = na::UnitQuaternion::from_euler_angles(0.3, -0.2, 0.9);
    let iso = na::Isometry3::from_parts(na::Translation3::identity(), r);
    let v = twist_vec();
    assert_relative_eq!(link_vel_transform(&v, &iso), vel_transform(&v, &r), epsilon = 1e-12);
}

#[test]
fn test_link_lever_arm() {
    // pure spin about z of the camera, tool offset along x
    let iso = na::Isometry3::translation(0.1, 0.0, 0.0);
    let v = na::Vector6::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let out = link_vel_transform(&v, &iso);
    assert_relative_eq!(out[5], 1.0);
    // v' = -t x w' = -(0.1, 0, 0) x (0, 0, 1) = (0, 0.1, 0)
    assert_relative_eq!(out[1], 0.1, epsilon = 1e-12);
    assert_relative_eq!(out[0], 0.0, epsilon = 1e-12);
}

#[test]
fn test_homogeneous_round_trip() {
    let iso = pose_to_isometry(&[0.4, -0.1, 0.9, 0.2, -0.3, 0.5]);
    let rows = isometry_to_rows(&iso);
    let back = isometry_from_rows(&rows).unwrap();
    assert_relative_eq!(back.to_homogeneous(), iso.to_homogeneous(), epsilon = 1e-12);
    let m = iso.to_homogeneous();
    assert!(isometry_from_matrix(&m).is_ok());
}

#[test]
fn test_pose_vector_round_trip() {
    let pose = [0.5, 0.1, -0.2, 0.3, 0.2, -0.4];
    let back = isometry_to_pose(&pose_to_isometry(&pose));
    for (a, b) in pose.iter().zip(back.iter()) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn test_rotation_validation() {
    let good = na::Rotation3::from_euler_angles(0.1, 0.2, 0.3).into_inner();
    assert!(rotation_from_matrix(&good).is_ok());
    assert!(rotation_from_matrix(&(good * 1.01)).is_err());
}

#[test]
fn test_frame_chain_round_trip_through_world() {
    let base_to_world = pose_to_isometry(&[1.0, 2.0, 0.0, 0.0, 0.0, 0.8]);
    let chain = FrameChain::new(na::Isometry3::identity(), base_to_world);
    let base = Twist::from_vector(Frame::Base, &twist_vec());
    let world = chain.base_to_world(&base).unwrap();
    assert_eq!(world.frame, Frame::World);
    let back = chain.world_to_base(&world).unwrap();
    assert_eq!(back.frame, Frame::Base);
    assert_relative_eq!(back.to_vector(), base.to_vector(), epsilon = 1e-12);
}

#[test]
fn test_camera_to_base_uses_tcp_rotation() {
    let chain = FrameChain::default();
    let tcp = pose_to_isometry(&[0.3, 0.0, 0.5, 0.0, 0.0, std::f64::consts::FRAC_PI_2]);
    let cam = Twist::new(Frame::Camera, na::Vector3::new(1.0, 0.0, 0.0), na::Vector3::zeros());
    let base = chain.camera_to_base(&cam, &tcp).unwrap();
    assert_eq!(base.frame, Frame::Base);
    assert_relative_eq!(base.linear, na::Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
}

#[test]
fn test_camera_to_world_chains_every_link() {
    let camera_to_tool = pose_to_isometry(&[0.0, 0.05, 0.1, 0.0, 0.0, 0.0]);
    let base_to_world = pose_to_isometry(&[2.0, 0.0, 0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_2]);
    let chain = FrameChain::new(camera_to_tool, base_to_world);
    let tcp = pose_to_isometry(&[0.3, 0.0, 0.5, 0.0, 0.0, std::f64::consts::FRAC_PI_2]);
    let cam = Twist::new(
        Frame::Camera,
        na::Vector3::new(0.1, 0.0, 0.0),
        na::Vector3::new(0.0, 0.0, 0.2),
    );

    let world = chain.camera_to_world(&cam, &tcp).unwrap();
    let base = chain.camera_to_base(&cam, &tcp).unwrap();
    assert_eq!(world.frame, Frame::World);
    assert_relative_eq!(
        world.to_vector(),
        chain.base_to_world(&base).unwrap().to_vector(),
        epsilon = 1e-12
    );
    // rotations about z leave a z spin unchanged
    assert_relative_eq!(world.angular, na::Vector3::new(0.0, 0.0, 0.2), epsilon = 1e-12);
    assert!(chain.camera_to_world(&base, &tcp).is_err());
}
