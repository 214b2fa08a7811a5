//! Seeded synthetic views of a textured fronto-parallel plane.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use nalgebra as na;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::camera_model::{DepthImage, Intrinsics, PinholeCamera};
use crate::error::{Result, ServoError};

const NUM_RECTS: usize = 300;
const BACKGROUND: Rgb<u8> = Rgb([128, 128, 128]);

/// Overlapping rectangles of random size and colour on a grey background.
pub fn textured_scene(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    if width < 2 || height < 2 {
        return img;
    }
    let max_side = (width.min(height) / 6).max(4);
    for _ in 0..NUM_RECTS {
        let w = rng.random_range(3..=max_side);
        let h = rng.random_range(3..=max_side);
        let x = rng.random_range(0..width) as i32 - (w / 2) as i32;
        let y = rng.random_range(0..height) as i32 - (h / 2) as i32;
        let color = Rgb([rng.random(), rng.random(), rng.random()]);
        draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(w, h), color);
    }
    img
}

pub fn uniform_depth(width: u32, height: u32, depth: f32) -> DepthImage {
    DepthImage::from_pixel(width, height, image::Luma([depth]))
}

/// Default camera for synthetic views: 60° horizontal field of view.
pub fn synthetic_camera(width: u32, height: u32) -> Result<PinholeCamera> {
    let f = width as f64 / (2.0 * (30.0f64).to_radians().tan());
    PinholeCamera::new(Intrinsics::new(
        f,
        f,
        width as f64 / 2.0,
        height as f64 / 2.0,
        width,
        height,
    ))
}

pub struct SyntheticPair {
    pub reference: RgbImage,
    pub current: RgbImage,
    pub reference_depth: DepthImage,
    pub current_depth: DepthImage,
    pub camera: PinholeCamera,
    /// Pixel offset of the content in the current view relative to the reference.
    pub shift: (i32, i32),
    pub depth: f64,
}

impl SyntheticPair {
    /// Camera-frame linear velocity that brings the current view back onto
    /// the reference for a plane parallel to the image.
    pub fn expected_linear_velocity(&self) -> na::Vector3<f64> {
        let intr = self.camera.intrinsics();
        na::Vector3::new(
            self.shift.0 as f64 * self.depth / intr.fx,
            self.shift.1 as f64 * self.depth / intr.fy,
            0.0,
        )
    }
}

/// Two crops of one scene; a reference feature at `(u, v)` appears at
/// `(u + shift.0, v + shift.1)` in the current view.
pub fn translated_pair(
    width: u32,
    height: u32,
    shift: (i32, i32),
    depth: f64,
    seed: u64,
) -> Result<SyntheticPair> {
    if !(depth.is_finite() && depth > 0.0) {
        return Err(ServoError::InvalidConfiguration(format!(
            "synthetic depth must be positive, got {}",
            depth
        )));
    }
    let margin = shift.0.unsigned_abs().max(shift.1.unsigned_abs()) + 8;
    let scene = textured_scene(width + 2 * margin, height + 2 * margin, seed);
    let crop = |x: u32, y: u32| image::imageops::crop_imm(&scene, x, y, width, height).to_image();
    let reference = crop(margin, margin);
    let current = crop(
        (margin as i32 - shift.0) as u32,
        (margin as i32 - shift.1) as u32,
    );
    Ok(SyntheticPair {
        reference,
        current,
        reference_depth: uniform_depth(width, height, depth as f32),
        current_depth: uniform_depth(width, height, depth as f32),
        camera: synthetic_camera(width, height)?,
        shift,
        depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_is_deterministic() {
        assert_eq!(textured_scene(64, 48, 7), textured_scene(64, 48, 7));
        assert_ne!(textured_scene(64, 48, 7), textured_scene(64, 48, 8));
    }

    #[test]
    fn current_view_is_shifted_reference() {
        let pair = translated_pair(80, 60, (5, -3), 1.0, 3).unwrap();
        for (u, v) in [(10u32, 10u32), (40, 30), (70, 50)] {
            let cu = (u as i32 + 5) as u32;
            let cv = (v as i32 - 3) as u32;
            assert_eq!(pair.reference.get_pixel(u, v), pair.current.get_pixel(cu, cv));
        }
    }
}
