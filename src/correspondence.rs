//! Feature correspondences between a reference and a current view.
//!
//! Stages run in a fixed order (ratio test, exclusion mask, epipolar RANSAC)
//! and none of them can add points, so every count in [`FilterStats`] is
//! bounded by the one before it.

use image::GrayImage;
use log::{debug, trace};
use nalgebra as na;
use serde::Serialize;

use crate::camera_model::PinholeCamera;
use crate::config::ServoConfig;
use crate::error::{Result, ServoError};
use crate::features::{create_extractor, FeatureExtractor, KeyPoint, Match, RatioMatcher};
use crate::geometry::essential::EpipolarRansac;

/// RANSAC is only attempted above this many surviving matches.
pub const RANSAC_MIN_MATCHES: usize = 4;

/// Per-pixel exclusion mask; any non-zero pixel is excluded.
#[derive(Debug, Clone)]
pub struct ExclusionMask(pub GrayImage);

impl ExclusionMask {
    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    /// The point is rounded to the nearest pixel and clamped to the image.
    pub fn is_excluded(&self, pt: &na::Vector2<f64>) -> bool {
        let (w, h) = self.0.dimensions();
        if w == 0 || h == 0 {
            return false;
        }
        let u = pt.x.round().clamp(0.0, (w - 1) as f64) as u32;
        let v = pt.y.round().clamp(0.0, (h - 1) as f64) as u32;
        self.0.get_pixel(u, v)[0] != 0
    }

    pub fn excluded_fraction(&self) -> f64 {
        let total = self.0.as_raw().len();
        if total == 0 {
            return 0.0;
        }
        self.0.as_raw().iter().filter(|&&p| p != 0).count() as f64 / total as f64
    }
}

/// Index-aligned pixel coordinates, `reference[i]` matches `current[i]`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Correspondences {
    pub reference: Vec<na::Vector2<f64>>,
    pub current: Vec<na::Vector2<f64>>,
}

impl Correspondences {
    pub fn len(&self) -> usize {
        self.reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    pub fn push(&mut self, reference: na::Vector2<f64>, current: na::Vector2<f64>) {
        self.reference.push(reference);
        self.current.push(current);
    }

    /// Keeps the pairs whose flag is set, in order.
    pub fn retain_flags(&mut self, keep: &[bool]) {
        let mut flags = keep.iter();
        self.reference.retain(|_| flags.next().copied().unwrap_or(false));
        let mut flags = keep.iter();
        self.current.retain(|_| flags.next().copied().unwrap_or(false));
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub reference_keypoints: usize,
    pub current_keypoints: usize,
    pub ratio_matches: usize,
    pub after_mask: usize,
    pub after_ransac: usize,
}

#[derive(Debug, Clone)]
pub struct CorrespondenceResult {
    pub correspondences: Correspondences,
    pub stats: FilterStats,
    pub reference_keypoints: Vec<KeyPoint>,
    pub current_keypoints: Vec<KeyPoint>,
}

pub struct CorrespondenceFinder {
    extractor: Box<dyn FeatureExtractor>,
    matcher: RatioMatcher,
    ransac: Option<EpipolarRansac>,
    min_matches: usize,
}

impl CorrespondenceFinder {
    pub fn new(config: &ServoConfig) -> Result<CorrespondenceFinder> {
        let extractor = create_extractor(&config.features)?;
        let matcher = RatioMatcher::new(config.matching.ratio)?;
        let ransac = if config.ransac.enabled {
            Some(EpipolarRansac::new(config.ransac.clone())?)
        } else {
            None
        };
        if config.matching.min_matches < 3 {
            return Err(ServoError::InvalidConfiguration(format!(
                "min_matches must be at least 3, got {}",
                config.matching.min_matches
            )));
        }
        debug!(
            "correspondence finder: detector {}, ratio {}, ransac {}",
            extractor.kind(),
            matcher.ratio(),
            if ransac.is_some() { "on" } else { "off" }
        );
        Ok(CorrespondenceFinder {
            extractor,
            matcher,
            ransac,
            min_matches: config.matching.min_matches,
        })
    }

    /// Epipolar stage on pixel correspondences. A no-op when RANSAC is disabled
    /// or at most [`RANSAC_MIN_MATCHES`] pairs are left.
    pub fn reject_outliers(&self, correspondences: &mut Correspondences, camera: &PinholeCamera) {
        let Some(ransac) = &self.ransac else {
            return;
        };
        if correspondences.len() <= RANSAC_MIN_MATCHES {
            return;
        }
        let n1 = camera.pixel_to_camera_frame(&correspondences.reference);
        let n2 = camera.pixel_to_camera_frame(&correspondences.current);
        match ransac.estimate(&n1, &n2, camera.mean_focal()) {
            Some(estimate) => correspondences.retain_flags(&estimate.inliers),
            None => debug!("epipolar check found no model, keeping all matches"),
        }
    }

    pub fn find(
        &self,
        reference: &GrayImage,
        current: &GrayImage,
        mask: Option<&ExclusionMask>,
        camera: &PinholeCamera,
    ) -> Result<CorrespondenceResult> {
        if reference.dimensions() != current.dimensions() {
            return Err(ServoError::InputShapeMismatch(format!(
                "reference is {:?} but current is {:?}",
                reference.dimensions(),
                current.dimensions()
            )));
        }
        if let Some(mask) = mask {
            if mask.dimensions() != reference.dimensions() {
                return Err(ServoError::InputShapeMismatch(format!(
                    "mask is {:?} but images are {:?}",
                    mask.dimensions(),
                    reference.dimensions()
                )));
            }
        }

        let (ref_features, cur_features) = rayon::join(
            || self.extractor.detect_and_compute(reference),
            || self.extractor.detect_and_compute(current),
        );
        let matches = self.matcher.knn_match(&ref_features, &cur_features);
        let mut stats = FilterStats {
            reference_keypoints: ref_features.len(),
            current_keypoints: cur_features.len(),
            ratio_matches: matches.len(),
            ..Default::default()
        };
        trace!(
            "{} reference / {} current keypoints, {} ratio matches",
            stats.reference_keypoints,
            stats.current_keypoints,
            stats.ratio_matches
        );
        if matches.len() < self.min_matches {
            return Err(ServoError::InsufficientCorrespondences {
                found: matches.len(),
                required: self.min_matches,
            });
        }

        let mut correspondences = Correspondences::default();
        for Match {
            query_idx,
            train_idx,
            ..
        } in &matches
        {
            let r = ref_features[*query_idx].keypoint.pt();
            let c = cur_features[*train_idx].keypoint.pt();
            if mask.is_some_and(|m| m.is_excluded(&r) || m.is_excluded(&c)) {
                continue;
            }
            correspondences.push(r, c);
        }
        stats.after_mask = correspondences.len();

        self.reject_outliers(&mut correspondences, camera);
        stats.after_ransac = correspondences.len();
        debug!(
            "correspondences: {} ratio, {} after mask, {} after ransac",
            stats.ratio_matches, stats.after_mask, stats.after_ransac
        );

        Ok(CorrespondenceResult {
            correspondences,
            stats,
            reference_keypoints: ref_features.iter().map(|f| f.keypoint).collect(),
            current_keypoints: cur_features.iter().map(|f| f.keypoint).collect(),
        })
    }
}
