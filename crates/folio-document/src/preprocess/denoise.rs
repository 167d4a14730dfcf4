// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Non-local-means denoising for scanned pages.

use folio_core::config::DenoiseConfig;
use folio_core::error::{FolioError, Result};
use image::{DynamicImage, GenericImageView, GrayImage, RgbImage};
use rayon::prelude::*;
use tracing::{debug, instrument};

/// Denoise `image` with the non-local-means filter.
///
/// Each pixel becomes a weighted mean of the pixels in its search window,
/// weighted by how closely their surrounding patches match its own:
/// `w = exp(-d / h²)` where `d` is the mean squared patch difference.
/// Grayscale images use `params.h`; colour images use `params.h_color` with
/// the difference averaged over R, G and B. The output is `Luma8` or `Rgb8`
/// accordingly; alpha is dropped.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn non_local_means(image: &DynamicImage, params: &DenoiseConfig) -> Result<DynamicImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(FolioError::Preprocessing("cannot denoise an empty image".into()));
    }
    for (name, size) in [
        ("template window", params.template_window),
        ("search window", params.search_window),
    ] {
        if size == 0 || size % 2 == 0 {
            return Err(FolioError::Preprocessing(format!(
                "{name} must be a positive odd size, got {size}"
            )));
        }
    }

    let color = image.color().has_color();
    let (channels, data, strength) = if color {
        (3, image.to_rgb8().into_raw(), params.h_color)
    } else {
        (1, image.to_luma8().into_raw(), params.h)
    };
    if !(strength.is_finite() && strength > 0.0) {
        return Err(FolioError::Preprocessing(format!(
            "filter strength must be positive, got {strength}"
        )));
    }

    debug!(
        color,
        strength,
        template = params.template_window,
        search = params.search_window,
        "Running non-local means"
    );

    let filtered = filter(
        &data,
        Dims {
            width: width as usize,
            height: height as usize,
            channels,
        },
        params.template_window as usize / 2,
        params.search_window as usize / 2,
        strength,
    );

    let output = if color {
        RgbImage::from_raw(width, height, filtered).map(DynamicImage::ImageRgb8)
    } else {
        GrayImage::from_raw(width, height, filtered).map(DynamicImage::ImageLuma8)
    };
    output.ok_or_else(|| FolioError::Preprocessing("denoised buffer has the wrong size".into()))
}

#[derive(Clone, Copy)]
struct Dims {
    width: usize,
    height: usize,
    channels: usize,
}

/// Interleaved u8 samples in, interleaved u8 samples out.
///
/// Works one search offset at a time: the squared difference between the
/// image and its shifted copy is box-summed over the patch, turned into a
/// weight per pixel and accumulated.
fn filter(data: &[u8], dims: Dims, half_patch: usize, half_search: usize, h: f32) -> Vec<u8> {
    let Dims {
        width,
        height,
        channels,
    } = dims;
    let pad = half_patch + half_search;
    let padded_width = width + 2 * pad;
    let padded = pad_replicate(data, dims, pad);

    let patch = 2 * half_patch + 1;
    let norm = 1.0 / (patch * patch * channels) as f32;
    let inv_h2 = 1.0 / (h * h);

    // Differences cover the output plus a patch margin on each side.
    let diff_width = width + 2 * half_patch;
    let diff_height = height + 2 * half_patch;
    let mut diff = vec![0f32; diff_width * diff_height];
    let mut row_sums = vec![0f32; diff_height * width];
    let mut weights = vec![0f32; width * height];
    let mut values = vec![0f32; width * height * channels];

    let reach = half_search as isize;
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            diff.par_chunks_mut(diff_width).enumerate().for_each(|(v, row)| {
                let py = v + half_search;
                let qy = (py as isize + dy) as usize;
                for (u, out) in row.iter_mut().enumerate() {
                    let px = u + half_search;
                    let qx = (px as isize + dx) as usize;
                    let a = (py * padded_width + px) * channels;
                    let b = (qy * padded_width + qx) * channels;
                    let mut sum = 0.0;
                    for ch in 0..channels {
                        let d = padded[a + ch] - padded[b + ch];
                        sum += d * d;
                    }
                    *out = sum;
                }
            });

            row_sums.par_chunks_mut(width).enumerate().for_each(|(v, row)| {
                let src = &diff[v * diff_width..(v + 1) * diff_width];
                for (x, out) in row.iter_mut().enumerate() {
                    *out = src[x..x + patch].iter().sum();
                }
            });

            weights
                .par_chunks_mut(width)
                .zip(values.par_chunks_mut(width * channels))
                .enumerate()
                .for_each(|(y, (weight_row, value_row))| {
                    let qy = ((y + pad) as isize + dy) as usize;
                    for x in 0..width {
                        let mut distance = 0.0;
                        for j in 0..patch {
                            distance += row_sums[(y + j) * width + x];
                        }
                        let w = (-(distance * norm) * inv_h2).exp();
                        weight_row[x] += w;

                        let qx = ((x + pad) as isize + dx) as usize;
                        let q = (qy * padded_width + qx) * channels;
                        for ch in 0..channels {
                            value_row[x * channels + ch] += w * padded[q + ch];
                        }
                    }
                });
        }
    }

    values
        .par_chunks(channels)
        .zip(weights.par_iter())
        .flat_map_iter(|(pixel, &w)| pixel.iter().map(move |v| (v / w).round().clamp(0.0, 255.0) as u8))
        .collect()
}

/// Copy `data` into a float buffer with `pad` replicated pixels on each side.
fn pad_replicate(data: &[u8], dims: Dims, pad: usize) -> Vec<f32> {
    let Dims {
        width,
        height,
        channels,
    } = dims;
    let padded_width = width + 2 * pad;
    let padded_height = height + 2 * pad;
    let mut out = Vec::with_capacity(padded_width * padded_height * channels);
    for py in 0..padded_height {
        let y = py.saturating_sub(pad).min(height - 1);
        for px in 0..padded_width {
            let x = px.saturating_sub(pad).min(width - 1);
            let i = (y * width + x) * channels;
            out.extend(data[i..i + channels].iter().map(|&v| v as f32));
        }
    }
    out
}
