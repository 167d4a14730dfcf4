// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Skew estimation (Canny + Hough) and bicubic rotation about the page centre.

use folio_core::config::DeskewConfig;
use image::{DynamicImage, GrayImage, ImageBuffer, Pixel};
use imageproc::edges::canny;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};
use rayon::prelude::*;
use tracing::{debug, instrument};

/// Largest tilt, in degrees, still treated as a horizontal text line.
const MAX_SKEW_DEGREES: f32 = 45.0;

/// Estimate the skew of a page from its near-horizontal lines.
///
/// Returns the median line direction in image coordinates (y down), in
/// degrees: positive when lines descend to the right. `None` when no
/// near-horizontal line reaches the vote threshold.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn estimate_skew(gray: &GrayImage, params: &DeskewConfig) -> Option<f32> {
    let edges = canny(gray, params.canny_low, params.canny_high);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold: params.vote_threshold,
            suppression_radius: params.suppression_radius,
        },
    );

    let mut angles: Vec<f32> = lines.iter().filter_map(line_direction).collect();
    debug!(
        lines = lines.len(),
        near_horizontal = angles.len(),
        "Hough lines detected"
    );
    if angles.is_empty() {
        return None;
    }

    angles.sort_by(f32::total_cmp);
    Some(median(&angles))
}

/// Direction of a Hough line folded into `(-45, 45]`, or `None` for lines
/// closer to vertical.
///
/// `PolarLine::angle_in_degrees` is the angle of the line's normal, so a
/// horizontal line reports 90.
fn line_direction(line: &PolarLine) -> Option<f32> {
    let direction = ((line.angle_in_degrees + 90) % 180) as f32;
    if direction <= MAX_SKEW_DEGREES {
        Some(direction)
    } else if direction > 180.0 - MAX_SKEW_DEGREES {
        Some(direction - 180.0)
    } else {
        None
    }
}

/// Median of a sorted, non-empty slice.
fn median(sorted: &[f32]) -> f32 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Rotate `image` about its centre by `degrees`, counter-clockwise as seen
/// on screen, keeping its dimensions.
///
/// Bicubic interpolation; samples falling outside the page repeat the
/// nearest edge pixel. Luma, RGB and RGBA buffers keep their colour type;
/// anything else is converted to RGBA8.
pub fn rotate(image: &DynamicImage, degrees: f32) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(rotate_buffer(buf, degrees)),
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(rotate_buffer(buf, degrees)),
        DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(rotate_buffer(buf, degrees)),
        other => DynamicImage::ImageRgba8(rotate_buffer(&other.to_rgba8(), degrees)),
    }
}

fn rotate_buffer<P>(src: &ImageBuffer<P, Vec<u8>>, degrees: f32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = src.dimensions();
    let (width, height) = (w as usize, h as usize);
    let channels = P::CHANNEL_COUNT as usize;
    let raw = src.as_raw();

    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    let mut out = vec![0u8; raw.len()];
    if width > 0 {
        out.par_chunks_mut(width * channels)
            .enumerate()
            .for_each(|(y, row)| {
                let dy = y as f32 - cy;
                for (x, pixel) in row.chunks_mut(channels).enumerate() {
                    let dx = x as f32 - cx;
                    // Inverse map: where does this output pixel come from?
                    let sx = cos * dx - sin * dy + cx;
                    let sy = sin * dx + cos * dy + cy;
                    sample_bicubic(raw, width, height, channels, sx, sy, pixel);
                }
            });
    }

    ImageBuffer::from_raw(w, h, out).unwrap_or_else(|| ImageBuffer::new(w, h))
}

/// Keys cubic convolution weights with `a = -0.75`.
fn cubic_weights(t: f32) -> [f32; 4] {
    const A: f32 = -0.75;
    let w0 = ((A * (t + 1.0) - 5.0 * A) * (t + 1.0) + 8.0 * A) * (t + 1.0) - 4.0 * A;
    let w1 = ((A + 2.0) * t - (A + 3.0)) * t * t + 1.0;
    let w2 = ((A + 2.0) * (1.0 - t) - (A + 3.0)) * (1.0 - t) * (1.0 - t) + 1.0;
    [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

fn sample_bicubic(
    raw: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    x: f32,
    y: f32,
    out: &mut [u8],
) {
    let x0 = x.floor();
    let y0 = y.floor();
    let wx = cubic_weights(x - x0);
    let wy = cubic_weights(y - y0);
    let (x0, y0) = (x0 as isize, y0 as isize);
    let clamp = |v: isize, len: usize| v.clamp(0, len as isize - 1) as usize;

    let mut acc = [0f32; 4];
    for (j, row_weight) in wy.iter().enumerate() {
        let yy = clamp(y0 - 1 + j as isize, height);
        for (i, col_weight) in wx.iter().enumerate() {
            let xx = clamp(x0 - 1 + i as isize, width);
            let base = (yy * width + xx) * channels;
            let weight = col_weight * row_weight;
            for ch in 0..channels {
                acc[ch] += weight * raw[base + ch] as f32;
            }
        }
    }
    for (ch, value) in out.iter_mut().enumerate() {
        *value = acc[ch].round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};
    use imageproc::geometric_transformations::{Interpolation, rotate_about_center};

    /// White page with dark horizontal bars, tilted clockwise by `degrees`.
    fn tilted_page(degrees: f32) -> GrayImage {
        let mut page = GrayImage::from_pixel(400, 300, Luma([255]));
        for top in [60, 110, 160, 210] {
            for y in top..top + 4 {
                for x in 40..360 {
                    page.put_pixel(x, y, Luma([0]));
                }
            }
        }
        rotate_about_center(
            &page,
            degrees.to_radians(),
            Interpolation::Bilinear,
            Luma([255]),
        )
    }

    #[test]
    fn recovers_synthetic_skew() {
        for tilt in [-40.0f32, -25.0, -12.0, -6.0, -1.0, 3.0, 5.0, 17.0, 30.0, 44.0] {
            let page = tilted_page(tilt);
            let estimate = estimate_skew(&page, &DeskewConfig::default())
                .expect("bars should produce near-horizontal lines");
            assert!(
                (estimate - tilt).abs() <= 1.0,
                "tilt {tilt}: estimated {estimate}"
            );
        }
    }

    #[test]
    fn rotation_undoes_tilt() {
        let page = DynamicImage::ImageLuma8(tilted_page(4.0));
        let estimate = estimate_skew(&page.to_luma8(), &DeskewConfig::default()).unwrap();
        let straightened = rotate(&page, estimate);

        let residual = estimate_skew(&straightened.to_luma8(), &DeskewConfig::default()).unwrap();
        assert!(residual.abs() <= 1.0, "residual skew {residual}");
    }

    #[test]
    fn blank_page_has_no_skew() {
        let blank = GrayImage::from_pixel(200, 300, Luma([200]));
        assert_eq!(estimate_skew(&blank, &DeskewConfig::default()), None);
    }

    #[test]
    fn direction_folding() {
        let line = |angle| PolarLine {
            r: 10.0,
            angle_in_degrees: angle,
        };
        assert_eq!(line_direction(&line(90)), Some(0.0));
        assert_eq!(line_direction(&line(95)), Some(5.0));
        assert_eq!(line_direction(&line(84)), Some(-6.0));
        assert_eq!(line_direction(&line(0)), None);
        assert_eq!(line_direction(&line(20)), None);
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&[1.0, 2.0, 9.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 4.0, 9.0]), 3.0);
    }

    #[test]
    fn zero_rotation_is_identity() {
        let img = RgbImage::from_fn(7, 5, |x, y| Rgb([(x * 30) as u8, (y * 40) as u8, 9]));
        let rotated = rotate(&DynamicImage::ImageRgb8(img.clone()), 0.0);
        assert_eq!(rotated.to_rgb8(), img);
    }

    #[test]
    fn rotation_keeps_dimensions_and_type() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(31, 17, Luma([90])));
        let rotated = rotate(&img, 12.5);
        assert!(matches!(rotated, DynamicImage::ImageLuma8(_)));
        assert_eq!((rotated.width(), rotated.height()), (31, 17));
        // Edge replication keeps a uniform page uniform.
        assert!(rotated.to_luma8().pixels().all(|p| p.0[0] == 90));
    }
}
