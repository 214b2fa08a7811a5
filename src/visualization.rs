use std::error::Error;
use std::io::Cursor;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use rerun::RecordingStream;

use crate::correspondence::CorrespondenceResult;

const KEYPOINT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_SCALE: f32 = 20.0;
const LABEL_PAD: u32 = 4;

/// Overlay text of an annotated match image.
pub fn overlay_lines(num_matches: usize, similarity: Option<f64>) -> Vec<String> {
    let mut lines = vec![format!("Matched Features: {}", num_matches)];
    if let Some(score) = similarity {
        lines.push(format!("SSIM score: {:.4}", score));
    }
    lines
}

/// Black text on white boxes, one line under the other from the top-left corner.
pub fn draw_labels(img: &mut RgbImage, font: &FontArc, lines: &[String]) {
    let scale = PxScale::from(LABEL_SCALE);
    let mut y = LABEL_PAD;
    for line in lines {
        let (w, h) = text_size(scale, font, line);
        let h = h.max(LABEL_SCALE as u32);
        draw_filled_rect_mut(
            img,
            Rect::at(LABEL_PAD as i32, y as i32).of_size(w + 2 * LABEL_PAD, h + 2 * LABEL_PAD),
            Rgb([255, 255, 255]),
        );
        draw_text_mut(
            img,
            Rgb([0, 0, 0]),
            (2 * LABEL_PAD) as i32,
            (y + LABEL_PAD) as i32,
            scale,
            font,
            line,
        );
        y += h + 3 * LABEL_PAD;
    }
}

pub fn match_color(i: usize, total: usize) -> Rgb<u8> {
    let t = if total <= 1 {
        0.0
    } else {
        i as f64 / (total - 1) as f64
    };
    let c = colorous::TURBO.eval_continuous(t);
    Rgb([c.r, c.g, c.b])
}

/// Reference and current side by side with keypoints and match lines. The
/// match count and the similarity score are written when a font is given.
pub fn draw_matches(
    reference: &RgbImage,
    current: &RgbImage,
    result: &CorrespondenceResult,
    similarity: Option<f64>,
    font: Option<&FontArc>,
) -> RgbImage {
    let (w, h) = reference.dimensions();
    let mut canvas = RgbImage::new(w + current.width(), h.max(current.height()));
    image::imageops::replace(&mut canvas, reference, 0, 0);
    image::imageops::replace(&mut canvas, current, w as i64, 0);

    for kp in &result.reference_keypoints {
        draw_hollow_circle_mut(&mut canvas, (kp.x as i32, kp.y as i32), 3, KEYPOINT_COLOR);
    }
    for kp in &result.current_keypoints {
        draw_hollow_circle_mut(
            &mut canvas,
            (kp.x as i32 + w as i32, kp.y as i32),
            3,
            KEYPOINT_COLOR,
        );
    }
    let pairs = &result.correspondences;
    for (i, (r, c)) in pairs.reference.iter().zip(pairs.current.iter()).enumerate() {
        draw_line_segment_mut(
            &mut canvas,
            (r.x as f32, r.y as f32),
            (c.x as f32 + w as f32, c.y as f32),
            match_color(i, pairs.len()),
        );
    }

    if let Some(font) = font {
        draw_labels(&mut canvas, font, &overlay_lines(pairs.len(), similarity));
    }
    canvas
}

pub fn log_image_as_compressed(
    recording: &RecordingStream,
    topic: &str,
    img: &DynamicImage,
    format: image::ImageFormat,
) -> Result<(), Box<dyn Error>> {
    let mut bytes: Vec<u8> = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), format)?;
    recording.log(
        format!("{}/image", topic),
        &rerun::EncodedImage::from_file_contents(bytes),
    )?;
    Ok(())
}

/// rerun use top left corner as (0, 0)
pub fn rerun_shift(p2ds: &[(f32, f32)]) -> Vec<(f32, f32)> {
    p2ds.iter().map(|(x, y)| (*x + 0.5, *y + 0.5)).collect()
}

/// Matched points of both views, coloured like the match lines of [`draw_matches`].
pub fn log_correspondences(
    recording: &RecordingStream,
    topic: &str,
    result: &CorrespondenceResult,
) -> Result<(), Box<dyn Error>> {
    let pairs = &result.correspondences;
    let colors: Vec<_> = (0..pairs.len())
        .map(|i| {
            let c = match_color(i, pairs.len());
            rerun::Color::from_rgb(c[0], c[1], c[2])
        })
        .collect();
    for (name, pts) in [("reference", &pairs.reference), ("current", &pairs.current)] {
        let pts: Vec<_> = pts.iter().map(|p| (p.x as f32, p.y as f32)).collect();
        recording.log(
            format!("{}/{}/pts", topic, name),
            &rerun::Points2D::new(rerun_shift(&pts))
                .with_colors(colors.clone())
                .with_radii([rerun::Radius::new_ui_points(5.0)]),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondence::{Correspondences, FilterStats};
    use nalgebra as na;

    const FONT_CANDIDATES: [&str; 2] = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
    ];

    fn system_font() -> Option<FontArc> {
        FONT_CANDIDATES
            .iter()
            .filter_map(|p| std::fs::read(p).ok())
            .find_map(|bytes| FontArc::try_from_vec(bytes).ok())
    }

    fn one_match() -> CorrespondenceResult {
        let mut correspondences = Correspondences::default();
        correspondences.push(na::Vector2::new(30.0, 40.0), na::Vector2::new(34.0, 40.0));
        CorrespondenceResult {
            correspondences,
            stats: FilterStats::default(),
            reference_keypoints: Vec::new(),
            current_keypoints: Vec::new(),
        }
    }

    #[test]
    fn overlay_text_names_both_values() {
        assert_eq!(
            overlay_lines(42, Some(0.91234)),
            vec!["Matched Features: 42".to_string(), "SSIM score: 0.9123".to_string()]
        );
        assert_eq!(overlay_lines(7, None), vec!["Matched Features: 7".to_string()]);
    }

    #[test]
    fn no_font_leaves_corner_untouched() {
        let img = RgbImage::from_pixel(64, 64, Rgb([10, 10, 200]));
        let out = draw_matches(&img, &img, &one_match(), Some(0.5), None);
        assert_eq!(out.dimensions(), (128, 64));
        assert_eq!(*out.get_pixel(LABEL_PAD + 1, LABEL_PAD + 1), Rgb([10, 10, 200]));
    }

    #[test]
    fn labels_paint_dark_text_on_white() {
        let Some(font) = system_font() else {
            return;
        };
        let mut img = RgbImage::from_pixel(400, 100, Rgb([10, 10, 200]));
        draw_labels(&mut img, &font, &overlay_lines(12, Some(0.5)));
        assert_eq!(*img.get_pixel(LABEL_PAD, LABEL_PAD), Rgb([255, 255, 255]));
        assert!(img.pixels().any(|p| p[0] < 100 && p[2] < 100));
        assert_eq!(*img.get_pixel(399, 99), Rgb([10, 10, 200]));
    }

    #[test]
    fn image_logging_accepts_encoded_png() {
        let recording = rerun::RecordingStream::disabled();
        let img = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        assert!(log_image_as_compressed(&recording, "test", &img, image::ImageFormat::Png).is_ok());
    }
}
