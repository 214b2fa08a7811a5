use nalgebra as na;
use visual_servo::camera_model::{CameraModel, DepthImage, Intrinsics, PinholeCamera};
use visual_servo::ServoError;

fn camera() -> PinholeCamera {
    PinholeCamera::new(Intrinsics::new(525.0, 520.0, 319.5, 239.5, 640, 480)).unwrap()
}

#[test]
fn test_pixel_round_trip_through_depth() {
    let cam = camera();
    let pixels = vec![
        na::Vector2::new(0.0, 0.0),
        na::Vector2::new(319.5, 239.5),
        na::Vector2::new(100.25, 400.75),
        na::Vector2::new(639.0, 479.0),
    ];
    let normalized = cam.pixel_to_camera_frame(&pixels);
    for (depth, (px, n)) in [0.3, 1.0, 2.5, 7.0].iter().zip(pixels.iter().zip(normalized.iter())) {
        let p3d = na::Vector3::new(n.x * depth, n.y * depth, *depth);
        let back = cam.project_one(&p3d).unwrap();
        assert!((back - px).norm() < 1e-9, "{} vs {}", back, px);
    }
    let restored = cam.camera_frame_to_pixel(&normalized);
    for (a, b) in restored.iter().zip(pixels.iter()) {
        assert!((a - b).norm() < 1e-9);
    }
}

#[test]
fn test_backproject_matches_formula() {
    let cam = camera();
    let mut depth = DepthImage::from_pixel(640, 480, image::Luma([2.0]));
    depth.put_pixel(10, 20, image::Luma([0.0]));
    let cloud = cam.backproject(&depth);
    assert_eq!(cloud.points.len(), 640 * 480);
    let p = cloud.get(100, 50).unwrap();
    assert!((p.z - 2.0).abs() < 1e-6);
    assert!((p.x as f64 - (100.0 - 319.5) * 2.0 / 525.0).abs() < 1e-5);
    assert!((p.y as f64 - (50.0 - 239.5) * 2.0 / 520.0).abs() < 1e-5);
    // zero depth collapses to the optical centre
    assert_eq!(cloud.get(10, 20).unwrap().norm(), 0.0);
    assert!(cloud.get(640, 0).is_none());
}

#[test]
fn test_project_rejects_points_on_camera_plane() {
    let cam = camera();
    let out = cam.project(&[
        na::Vector3::new(1.0, 1.0, 0.0),
        na::Vector3::new(f64::NAN, 0.0, 1.0),
        na::Vector3::new(0.0, 0.0, 1.0),
    ]);
    assert!(out[0].is_none());
    assert!(out[1].is_none());
    assert!(out[2].is_some());
}

#[test]
fn test_invalid_intrinsics() {
    for intr in [
        Intrinsics::new(0.0, 500.0, 320.0, 240.0, 640, 480),
        Intrinsics::new(500.0, -1.0, 320.0, 240.0, 640, 480),
        Intrinsics::new(f64::NAN, 500.0, 320.0, 240.0, 640, 480),
        Intrinsics::new(500.0, 500.0, 320.0, 240.0, 0, 480),
    ] {
        assert!(matches!(
            PinholeCamera::new(intr),
            Err(ServoError::InvalidConfiguration(_))
        ));
    }
}

#[test]
fn test_k_matrix() {
    let cam = camera();
    let k = cam.k_matrix();
    assert_eq!(k[(0, 0)], 525.0);
    assert_eq!(k[(1, 1)], 520.0);
    assert_eq!(k[(0, 2)], 319.5);
    assert_eq!(k[(2, 2)], 1.0);
    assert!((cam.mean_focal() - 522.5).abs() < 1e-12);
}
