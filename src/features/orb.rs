use image::GrayImage;
use imageproc::corners::{corners_fast9, Corner};
use imageproc::filter::gaussian_blur_f32;
use log::trace;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::{
    Descriptor, DetectorKind, Feature, FeatureConfig, FeatureExtractor, KeyPoint,
    DESCRIPTOR_BYTES,
};
use crate::error::{Result, ServoError};

const PATCH_RADIUS: i32 = 15;
const PATTERN_HALF_SPAN: i32 = 13;
/// Keeps the orientation patch and every rotated test pair inside the image.
const EDGE: u32 = 20;
const PATTERN_SEED: u64 = 0x0b1f_2d3c;

type TestPair = [(i32, i32); 2];

/// FAST-9 corners described with (rotated) BRIEF.
pub struct OrbExtractor {
    max_features: usize,
    fast_threshold: u8,
    nms_radius: u32,
    blur_sigma: f32,
    oriented: bool,
    pattern: Vec<TestPair>,
}

impl OrbExtractor {
    pub fn new(config: &FeatureConfig, oriented: bool) -> Result<OrbExtractor> {
        if !(config.blur_sigma.is_finite() && config.blur_sigma > 0.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "blur sigma must be positive, got {}",
                config.blur_sigma
            )));
        }
        if config.max_features == 0 {
            return Err(ServoError::InvalidConfiguration(
                "max_features must be at least 1".to_string(),
            ));
        }
        Ok(OrbExtractor {
            max_features: config.max_features,
            fast_threshold: config.fast_threshold,
            nms_radius: config.nms_radius,
            blur_sigma: config.blur_sigma,
            oriented,
            pattern: sampling_pattern(),
        })
    }

    fn detect(&self, image: &GrayImage) -> Vec<Corner> {
        let (w, h) = image.dimensions();
        if w <= 2 * EDGE || h <= 2 * EDGE {
            return Vec::new();
        }
        let mut corners: Vec<Corner> = corners_fast9(image, self.fast_threshold)
            .into_iter()
            .filter(|c| c.x >= EDGE && c.y >= EDGE && c.x < w - EDGE && c.y < h - EDGE)
            .collect();
        corners.sort_by(|a, b| b.score.total_cmp(&a.score));
        let kept = suppress_non_maxima(&corners, w, h, self.nms_radius, self.max_features);
        trace!("fast9: {} raw corners, {} after nms", corners.len(), kept.len());
        kept
    }

    fn describe(&self, smoothed: &GrayImage, kp: &KeyPoint) -> Descriptor {
        let (s, c) = kp.angle.sin_cos();
        let x = kp.x as i32;
        let y = kp.y as i32;
        let sample = |(dx, dy): (i32, i32)| {
            let rx = (dx as f32 * c - dy as f32 * s).round() as i32;
            let ry = (dx as f32 * s + dy as f32 * c).round() as i32;
            smoothed.get_pixel((x + rx) as u32, (y + ry) as u32)[0]
        };
        let mut bits = [0u8; DESCRIPTOR_BYTES];
        for (i, [p, q]) in self.pattern.iter().enumerate() {
            if sample(*p) < sample(*q) {
                bits[i / 8] |= 1 << (i % 8);
            }
        }
        Descriptor(bits)
    }
}

impl FeatureExtractor for OrbExtractor {
    fn kind(&self) -> DetectorKind {
        if self.oriented {
            DetectorKind::Orb
        } else {
            DetectorKind::FastBrief
        }
    }

    fn detect_and_compute(&self, image: &GrayImage) -> Vec<Feature> {
        let corners = self.detect(image);
        if corners.is_empty() {
            return Vec::new();
        }
        let smoothed = gaussian_blur_f32(image, self.blur_sigma);
        corners
            .par_iter()
            .map(|corner| {
                let angle = if self.oriented {
                    intensity_centroid_angle(image, corner.x as i32, corner.y as i32)
                } else {
                    0.0
                };
                let keypoint = KeyPoint {
                    x: corner.x as f64,
                    y: corner.y as f64,
                    angle,
                    response: corner.score,
                };
                Feature {
                    keypoint,
                    descriptor: self.describe(&smoothed, &keypoint),
                }
            })
            .collect()
    }
}

/// Greedy suppression over corners sorted by decreasing score.
fn suppress_non_maxima(
    corners: &[Corner],
    width: u32,
    height: u32,
    radius: u32,
    max_features: usize,
) -> Vec<Corner> {
    let mut occupied = vec![false; width as usize * height as usize];
    let r = radius as i64;
    let mut kept = Vec::new();
    for corner in corners {
        if kept.len() >= max_features {
            break;
        }
        let (cx, cy) = (corner.x as i64, corner.y as i64);
        let mut free = true;
        'search: for y in (cy - r).max(0)..=(cy + r).min(height as i64 - 1) {
            for x in (cx - r).max(0)..=(cx + r).min(width as i64 - 1) {
                if occupied[y as usize * width as usize + x as usize] {
                    free = false;
                    break 'search;
                }
            }
        }
        if free {
            occupied[cy as usize * width as usize + cx as usize] = true;
            kept.push(*corner);
        }
    }
    kept
}

/// Orientation from the intensity centroid of a circular patch.
fn intensity_centroid_angle(image: &GrayImage, x: i32, y: i32) -> f32 {
    let mut m01 = 0i64;
    let mut m10 = 0i64;
    for dy in -PATCH_RADIUS..=PATCH_RADIUS {
        let span = ((PATCH_RADIUS * PATCH_RADIUS - dy * dy) as f32).sqrt() as i32;
        for dx in -span..=span {
            let v = image.get_pixel((x + dx) as u32, (y + dy) as u32)[0] as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

fn sampling_pattern() -> Vec<TestPair> {
    let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
    let mut pattern = Vec::with_capacity(DESCRIPTOR_BYTES * 8);
    while pattern.len() < DESCRIPTOR_BYTES * 8 {
        let p = (
            rng.random_range(-PATTERN_HALF_SPAN..=PATTERN_HALF_SPAN),
            rng.random_range(-PATTERN_HALF_SPAN..=PATTERN_HALF_SPAN),
        );
        let q = (
            rng.random_range(-PATTERN_HALF_SPAN..=PATTERN_HALF_SPAN),
            rng.random_range(-PATTERN_HALF_SPAN..=PATTERN_HALF_SPAN),
        );
        if p != q {
            pattern.push([p, q]);
        }
    }
    pattern
}
