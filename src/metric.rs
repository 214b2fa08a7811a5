//! Structural similarity between two views.
//!
//! Matches the common reference formulation: a 7×7 uniform window, sample
//! covariance, `K1 = 0.01`, `K2 = 0.03`, data range 255, averaged over the
//! window centres that do not touch the border and then over channels.

use image::{GrayImage, RgbImage};
use rayon::prelude::*;

use crate::error::{Result, ServoError};

pub const WINDOW: u32 = 7;
const K1: f64 = 0.01;
const K2: f64 = 0.03;
const DATA_RANGE: f64 = 255.0;

/// Summed-area table with a zero first row and column.
struct Integral {
    stride: usize,
    table: Vec<f64>,
}

impl Integral {
    fn new(width: usize, height: usize, value: impl Fn(usize) -> f64) -> Integral {
        let stride = width + 1;
        let mut table = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row = 0.0;
            for x in 0..width {
                row += value(y * width + x);
                table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row;
            }
        }
        Integral { stride, table }
    }

    /// Sum over `[x0, x1) × [y0, y1)`.
    fn sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let s = self.stride;
        self.table[y1 * s + x1] - self.table[y0 * s + x1] - self.table[y1 * s + x0]
            + self.table[y0 * s + x0]
    }
}

/// Mean SSIM of one channel, `a` and `b` interleaved with `channels` values per pixel.
fn ssim_channel(a: &[u8], b: &[u8], width: usize, height: usize, channels: usize, channel: usize) -> f64 {
    let at = |buf: &[u8], i: usize| buf[i * channels + channel] as f64;
    let sa = Integral::new(width, height, |i| at(a, i));
    let sb = Integral::new(width, height, |i| at(b, i));
    let saa = Integral::new(width, height, |i| at(a, i) * at(a, i));
    let sbb = Integral::new(width, height, |i| at(b, i) * at(b, i));
    let sab = Integral::new(width, height, |i| at(a, i) * at(b, i));

    let win = WINDOW as usize;
    let np = (win * win) as f64;
    let cov_norm = np / (np - 1.0);
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);

    let rows = height - win + 1;
    let cols = width - win + 1;
    let total: f64 = (0..rows)
        .into_par_iter()
        .map(|y0| {
            let mut acc = 0.0;
            for x0 in 0..cols {
                let (x1, y1) = (x0 + win, y0 + win);
                let ux = sa.sum(x0, y0, x1, y1) / np;
                let uy = sb.sum(x0, y0, x1, y1) / np;
                let vx = cov_norm * (saa.sum(x0, y0, x1, y1) / np - ux * ux);
                let vy = cov_norm * (sbb.sum(x0, y0, x1, y1) / np - uy * uy);
                let vxy = cov_norm * (sab.sum(x0, y0, x1, y1) / np - ux * uy);
                let num = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
                let den = (ux * ux + uy * uy + c1) * (vx + vy + c2);
                acc += num / den;
            }
            acc
        })
        .sum();
    total / (rows * cols) as f64
}

fn check_shapes(a: (u32, u32), b: (u32, u32)) -> Result<()> {
    if a != b {
        return Err(ServoError::InputShapeMismatch(format!(
            "cannot compare {:?} with {:?}",
            a, b
        )));
    }
    if a.0 < WINDOW || a.1 < WINDOW {
        return Err(ServoError::InputShapeMismatch(format!(
            "images must be at least {}x{}, got {:?}",
            WINDOW, WINDOW, a
        )));
    }
    Ok(())
}

/// Channel-averaged SSIM of two colour images, in `[-1, 1]`.
pub fn ssim(a: &RgbImage, b: &RgbImage) -> Result<f64> {
    check_shapes(a.dimensions(), b.dimensions())?;
    let (w, h) = a.dimensions();
    let sum: f64 = (0..3)
        .map(|c| ssim_channel(a.as_raw(), b.as_raw(), w as usize, h as usize, 3, c))
        .sum();
    Ok(sum / 3.0)
}

pub fn ssim_gray(a: &GrayImage, b: &GrayImage) -> Result<f64> {
    check_shapes(a.dimensions(), b.dimensions())?;
    let (w, h) = a.dimensions();
    Ok(ssim_channel(a.as_raw(), b.as_raw(), w as usize, h as usize, 1, 0))
}
