use nalgebra as na;
use visual_servo::config::{ControlConfig, ServoConfig};
use visual_servo::geometry::transforms::pose_to_isometry;
use visual_servo::servo::{
    IbvsController, Manipulator, ManipulatorCapabilities, Observation, SimulatedManipulator,
    VelocityCommand, VisualServoController,
};
use visual_servo::synthetic::translated_pair;
use visual_servo::{Frame, FrameChain, Ibvs, ServoError, Twist};

fn controller(seed: u64, shift: (i32, i32)) -> (IbvsController, visual_servo::synthetic::SyntheticPair) {
    let pair = translated_pair(320, 240, shift, 1.5, seed).unwrap();
    let config = ServoConfig::default();
    let ibvs = Ibvs::new(pair.camera.clone(), &config).unwrap();
    let ctrl = IbvsController::new(
        ibvs,
        FrameChain::default(),
        pair.reference.clone(),
        pair.reference_depth.clone(),
        &config.control,
    )
    .unwrap();
    (ctrl, pair)
}

#[test]
fn test_calc_vel_before_update_fails() {
    let (ctrl, _) = controller(11, (4, 0));
    assert!(matches!(ctrl.calc_vel(), Err(ServoError::InputShapeMismatch(_))));
}

#[test]
fn test_step_scales_by_gain() {
    let (mut ctrl, pair) = controller(12, (5, 0));
    ctrl.update(Observation {
        image: pair.current.clone(),
        depth: pair.current_depth.clone(),
        mask: None,
    });
    let raw = ctrl.evaluate().unwrap().velocity;
    let step = ctrl.calc_vel().unwrap();
    assert_eq!(step.camera.frame, Frame::Camera);
    assert_eq!(step.tool.frame, Frame::Tool);
    assert!((step.camera.to_vector() - raw.to_vector() * ctrl.gain()).norm() < 1e-12);
    assert!(!step.converged);
    // identity camera-to-tool leaves the command unchanged
    assert!((step.tool.to_vector() - step.camera.to_vector()).norm() < 1e-12);
}

#[test]
fn test_identical_view_converges() {
    let (mut ctrl, pair) = controller(13, (0, 0));
    ctrl.update(Observation {
        image: pair.reference.clone(),
        depth: pair.reference_depth.clone(),
        mask: None,
    });
    let step = ctrl.calc_vel().unwrap();
    assert!(step.converged);
    assert!(step.camera.to_vector().norm() < 1e-9);
}

#[test]
fn test_invalid_gain() {
    let pair = translated_pair(64, 48, (0, 0), 1.0, 1).unwrap();
    let ibvs = Ibvs::new(pair.camera.clone(), &ServoConfig::default()).unwrap();
    let control = ControlConfig {
        gain: 0.0,
        ..Default::default()
    };
    let res = IbvsController::new(
        ibvs,
        FrameChain::default(),
        pair.reference,
        pair.reference_depth,
        &control,
    );
    assert!(matches!(res, Err(ServoError::InvalidConfiguration(_))));
}

#[test]
fn test_camera_command_reaches_base() {
    let tcp = pose_to_isometry(&[0.4, 0.0, 0.3, 0.0, 0.0, std::f64::consts::FRAC_PI_2]);
    let mut arm = SimulatedManipulator::new(tcp, na::Isometry3::identity()).with_capabilities(
        ManipulatorCapabilities {
            protocol_version: 2,
            ik_joint_error_correction: true,
        },
    );
    assert!(arm.capabilities().ik_joint_error_correction);
    let cmd = VelocityCommand::new(Twist::new(
        Frame::Camera,
        na::Vector3::new(0.1, 0.0, 0.0),
        na::Vector3::zeros(),
    ))
    .with_duration(1.0);
    arm.apply_camera_vel(&cmd, &na::Isometry3::identity()).unwrap();
    let sent = arm.last_command().unwrap();
    assert_eq!(sent.twist.frame, Frame::Base);
    assert!((sent.twist.linear - na::Vector3::new(0.0, 0.1, 0.0)).norm() < 1e-12);
    assert_eq!(sent.acceleration, 0.25);
    let moved = arm.tcp_pose().unwrap();
    assert!((moved.translation.vector - na::Vector3::new(0.4, 0.1, 0.3)).norm() < 1e-12);
    arm.stop().unwrap();
    assert!(arm.is_stopped());
}

#[test]
fn test_world_command_uses_inverse_base_rotation() {
    let base_to_world = pose_to_isometry(&[0.0, 0.0, 0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_2]);
    let mut arm = SimulatedManipulator::new(na::Isometry3::identity(), base_to_world);
    let cmd = VelocityCommand::new(Twist::new(
        Frame::World,
        na::Vector3::new(0.0, 1.0, 0.0),
        na::Vector3::zeros(),
    ));
    arm.apply_world_vel(&cmd).unwrap();
    let sent = arm.last_command().unwrap();
    assert!((sent.twist.linear - na::Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
    let world = arm.world_pose().unwrap();
    assert!((world.rotation.angle() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
}

#[test]
fn test_drive_sends_configured_command() {
    let pair = translated_pair(320, 240, (5, 0), 1.5, 14).unwrap();
    let config = ServoConfig::default();
    let control = ControlConfig {
        acceleration: 0.4,
        command_duration: 0.1,
        ..Default::default()
    };
    let ibvs = Ibvs::new(pair.camera.clone(), &config).unwrap();
    let mut ctrl = IbvsController::new(
        ibvs,
        FrameChain::default(),
        pair.reference.clone(),
        pair.reference_depth.clone(),
        &control,
    )
    .unwrap();
    ctrl.update(Observation {
        image: pair.current.clone(),
        depth: pair.current_depth.clone(),
        mask: None,
    });

    let mut arm = SimulatedManipulator::new(na::Isometry3::identity(), na::Isometry3::identity());
    let step = ctrl.drive(&mut arm).unwrap();
    assert_eq!(step.command.twist, step.tool);
    let sent = arm.last_command().unwrap();
    assert_eq!(sent.twist.frame, Frame::Base);
    assert_eq!(sent.acceleration, 0.4);
    assert_eq!(sent.duration, 0.1);
    let moved = arm.tcp_pose().unwrap().translation.vector;
    assert!((moved - step.tool.linear * 0.1).norm() < 1e-12);
    assert!(arm.is_stopped());
}

#[test]
fn test_invalid_acceleration() {
    let pair = translated_pair(64, 48, (0, 0), 1.0, 1).unwrap();
    let ibvs = Ibvs::new(pair.camera.clone(), &ServoConfig::default()).unwrap();
    let control = ControlConfig {
        acceleration: -1.0,
        ..Default::default()
    };
    let res = IbvsController::new(
        ibvs,
        FrameChain::default(),
        pair.reference,
        pair.reference_depth,
        &control,
    );
    assert!(matches!(res, Err(ServoError::InvalidConfiguration(_))));
}
