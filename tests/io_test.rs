use approx::assert_relative_eq;
use image::Luma;
use visual_servo::camera_model::{DepthImage, Intrinsics};
use visual_servo::config::{FrameChainConfig, ServoConfig};
use visual_servo::data_loader::list_frames;
use visual_servo::features::DetectorKind;
use visual_servo::geometry::transforms::pose_to_isometry;
use visual_servo::io::{
    load_camera, load_config, load_depth, load_font, load_frame_chain, load_mask, object_from_json,
    object_to_json, save_depth, write_report, FrameReport, SequenceReport,
};
use visual_servo::{FrameChain, ServoError};

#[test]
fn test_config_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut config = ServoConfig::default();
    config.features.detector = DetectorKind::FastBrief;
    config.ransac.seed = 42;
    config.control.gain = 0.8;
    object_to_json(&path, &config).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"fast_brief\""));
    let loaded = load_config(&path).unwrap();
    assert_eq!(loaded.features.detector, DetectorKind::FastBrief);
    assert_eq!(loaded.ransac.seed, 42);
    assert_eq!(loaded.control.gain, 0.8);
}

#[test]
fn test_unsupported_detector_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"features": {"detector": "surf"}}"#).unwrap();
    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ServoError::InvalidConfiguration(_)));
    assert!(err.to_string().contains("unsupported feature detector"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"matching": {"ratio": 1.5}}"#).unwrap();
    assert!(matches!(load_config(&path), Err(ServoError::InvalidConfiguration(_))));
    std::fs::write(&path, r#"{"ransac": {"confidence": 1.0}}"#).unwrap();
    assert!(matches!(load_config(&path), Err(ServoError::InvalidConfiguration(_))));
    assert!(matches!(load_config(dir.path().join("missing.json")), Err(ServoError::Io(_))));
}

#[test]
fn test_load_camera() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("intrinsics.json");
    object_to_json(&path, &Intrinsics::new(600.0, 610.0, 320.0, 240.0, 640, 480)).unwrap();
    let cam = load_camera(&path).unwrap();
    assert_eq!(cam.intrinsics().fy, 610.0);

    object_to_json(&path, &Intrinsics::new(-600.0, 610.0, 320.0, 240.0, 640, 480)).unwrap();
    assert!(matches!(load_camera(&path), Err(ServoError::InvalidConfiguration(_))));
}

#[test]
fn test_frame_chain_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.json");
    let chain = FrameChain::new(
        pose_to_isometry(&[0.0, 0.0, 0.1, 0.0, 0.0, 0.3]),
        pose_to_isometry(&[1.0, 0.0, 0.0, 0.0, 0.2, 0.0]),
    );
    object_to_json(&path, &FrameChainConfig::from_chain(&chain)).unwrap();
    let loaded = load_frame_chain(&path).unwrap();
    assert_relative_eq!(
        loaded.camera_to_tool.to_homogeneous(),
        chain.camera_to_tool.to_homogeneous(),
        epsilon = 1e-12
    );

    std::fs::write(&path, r#"{"camera_to_tool": [[2,0,0,0],[0,1,0,0],[0,0,1,0],[0,0,0,1]]}"#).unwrap();
    assert!(matches!(load_frame_chain(&path), Err(ServoError::InvalidConfiguration(_))));
}

#[test]
fn test_depth_png_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("depth.png");
    let mut depth = DepthImage::from_pixel(16, 8, Luma([1.25]));
    depth.put_pixel(3, 2, Luma([0.0]));
    save_depth(&path, &depth, 0.001).unwrap();
    let raw = load_depth(&path).unwrap();
    assert_eq!(raw.dimensions(), (16, 8));
    assert_eq!(raw.get_pixel(0, 0)[0], 1250.0);
    assert_eq!(raw.get_pixel(3, 2)[0], 0.0);
    assert!(save_depth(&path, &depth, 0.0).is_err());
}

#[test]
fn test_mask_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mask.png");
    let mut img = image::GrayImage::new(10, 10);
    img.put_pixel(5, 5, Luma([255]));
    img.save(&path).unwrap();
    let mask = load_mask(&path).unwrap();
    assert!(mask.is_excluded(&nalgebra::Vector2::new(5.2, 4.9)));
    assert!(!mask.is_excluded(&nalgebra::Vector2::new(1.0, 1.0)));
    assert!((mask.excluded_fraction() - 0.01).abs() < 1e-12);
}

#[test]
fn test_report_counts_failures() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    let ok = FrameReport {
        path: "a.png".to_string(),
        velocity: Some([0.0; 6]),
        similarity: Some(0.9),
        num_points: 40,
        rank: Some(6),
        residual: Some(0.0),
        error: None,
    };
    let failed = FrameReport {
        path: "b.png".to_string(),
        velocity: None,
        similarity: None,
        num_points: 0,
        rank: None,
        residual: None,
        error: Some("too few matches".to_string()),
    };
    let report = SequenceReport::new("ref.png", vec![ok, failed]);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    write_report(&path, &report).unwrap();
    let value: serde_json::Value = object_from_json(&path).unwrap();
    assert_eq!(value["frames"].as_array().unwrap().len(), 2);
    assert!(!value["timestamp"].as_str().unwrap().is_empty());
}

#[test]
fn test_list_frames_pairs_depth_by_stem() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("rgb")).unwrap();
    std::fs::create_dir_all(dir.path().join("depth")).unwrap();
    let img = image::RgbImage::new(4, 4);
    for stem in ["200", "100", "300"] {
        img.save(dir.path().join("rgb").join(format!("{}.png", stem))).unwrap();
    }
    let depth = DepthImage::from_pixel(4, 4, Luma([1.0]));
    for stem in ["100", "200"] {
        save_depth(dir.path().join("depth").join(format!("{}.png", stem)), &depth, 0.001).unwrap();
    }
    let frames = list_frames(dir.path().to_str().unwrap()).unwrap();
    let times: Vec<_> = frames.iter().map(|f| f.time_ns).collect();
    assert_eq!(times, vec![100, 200]);
}

#[test]
fn test_font_file_must_parse() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("font.ttf");
    std::fs::write(&path, b"definitely not a font").unwrap();
    assert!(matches!(load_font(&path), Err(ServoError::InvalidConfiguration(_))));
    assert!(matches!(load_font(dir.path().join("missing.ttf")), Err(ServoError::Io(_))));
}
