// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page preprocessing — denoising and skew correction ahead of text detection.

pub mod denoise;
pub mod deskew;

use std::fmt;

use folio_core::config::PreprocessingConfig;
use folio_core::error::{FolioError, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Rotations smaller than this (in degrees) are not worth resampling for.
const MIN_CORRECTION_DEGREES: f32 = 0.01;

/// A corrective transform applied to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Denoise,
    Deskew,
}

impl Transform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Denoise => "denoise",
            Self::Deskew => "deskew",
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page image after preprocessing, with a record of what was done to it.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub image: DynamicImage,
    /// Rotation applied by deskew in degrees, positive counter-clockwise.
    /// `None` when deskew did not run; `Some(0.0)` when it found nothing to
    /// correct.
    pub skew_angle: Option<f32>,
    /// Transforms applied, in order.
    pub history: Vec<Transform>,
}

impl ProcessedImage {
    /// Wrap an image no transform has touched yet.
    pub fn unprocessed(image: DynamicImage) -> Self {
        Self {
            image,
            skew_angle: None,
            history: Vec::new(),
        }
    }

    pub fn history_names(&self) -> Vec<&'static str> {
        self.history.iter().map(Transform::as_str).collect()
    }
}

/// Runs the enabled corrective transforms in a fixed order: denoise, then
/// deskew.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessingConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    /// Non-local-means denoise of `image`.
    pub fn denoise(&self, image: &DynamicImage) -> Result<ProcessedImage> {
        let image = denoise::non_local_means(image, &self.config.denoise_params)?;
        Ok(ProcessedImage {
            image,
            skew_angle: None,
            history: vec![Transform::Denoise],
        })
    }

    /// Estimate and remove the skew of `image`.
    pub fn deskew(&self, image: &DynamicImage) -> Result<ProcessedImage> {
        self.deskew_step(ProcessedImage::unprocessed(image.clone()))
    }

    /// Run every enabled transform over `image`.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn apply(&self, image: DynamicImage) -> Result<ProcessedImage> {
        let mut processed = ProcessedImage::unprocessed(image);
        if self.config.denoise {
            processed = self.denoise_step(processed)?;
        }
        if self.config.deskew {
            processed = self.deskew_step(processed)?;
        }
        debug!(history = ?processed.history_names(), skew = ?processed.skew_angle, "Preprocessed");
        Ok(processed)
    }

    fn denoise_step(&self, mut processed: ProcessedImage) -> Result<ProcessedImage> {
        processed.image = denoise::non_local_means(&processed.image, &self.config.denoise_params)?;
        processed.history.push(Transform::Denoise);
        Ok(processed)
    }

    fn deskew_step(&self, mut processed: ProcessedImage) -> Result<ProcessedImage> {
        if processed.image.width() == 0 || processed.image.height() == 0 {
            return Err(FolioError::Preprocessing("cannot deskew an empty image".into()));
        }

        let gray = processed.image.to_luma8();
        match deskew::estimate_skew(&gray, &self.config.deskew_params) {
            Some(angle) if angle.abs() >= MIN_CORRECTION_DEGREES => {
                info!(angle, "Correcting skew");
                processed.image = deskew::rotate(&processed.image, angle);
                processed.skew_angle = Some(angle);
                processed.history.push(Transform::Deskew);
            }
            estimate => {
                debug!(?estimate, "No skew to correct");
                processed.skew_angle = Some(0.0);
            }
        }
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::config::DenoiseConfig;
    use image::{GrayImage, Luma};
    use imageproc::geometric_transformations::{Interpolation, rotate_about_center};

    fn fast_config() -> PreprocessingConfig {
        PreprocessingConfig {
            denoise_params: DenoiseConfig {
                template_window: 3,
                search_window: 5,
                ..DenoiseConfig::default()
            },
            ..PreprocessingConfig::default()
        }
    }

    fn lined_page(tilt: f32) -> DynamicImage {
        let mut page = GrayImage::from_pixel(360, 240, Luma([255]));
        for top in [50, 100, 150] {
            for y in top..top + 4 {
                for x in 30..330 {
                    page.put_pixel(x, y, Luma([0]));
                }
            }
        }
        DynamicImage::ImageLuma8(rotate_about_center(
            &page,
            tilt.to_radians(),
            Interpolation::Bilinear,
            Luma([255]),
        ))
    }

    #[test]
    fn apply_runs_denoise_then_deskew() {
        let pre = Preprocessor::new(fast_config());
        let out = pre.apply(lined_page(5.0)).unwrap();
        assert_eq!(out.history, vec![Transform::Denoise, Transform::Deskew]);
        assert_eq!(out.history_names(), vec!["denoise", "deskew"]);
        let angle = out.skew_angle.unwrap();
        assert!((angle - 5.0).abs() <= 1.0, "angle {angle}");
    }

    #[test]
    fn blank_page_records_no_deskew() {
        let pre = Preprocessor::new(fast_config());
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([240])));
        let out = pre.deskew(&blank).unwrap();
        assert!(out.history.is_empty());
        assert_eq!(out.skew_angle, Some(0.0));
        assert_eq!(out.image.to_luma8(), blank.to_luma8());
    }

    #[test]
    fn disabled_transforms_are_skipped() {
        let config = PreprocessingConfig {
            denoise: false,
            deskew: false,
            ..fast_config()
        };
        let page = lined_page(3.0);
        let out = Preprocessor::new(config).apply(page.clone()).unwrap();
        assert!(out.history.is_empty());
        assert_eq!(out.skew_angle, None);
        assert_eq!(out.image.to_luma8(), page.to_luma8());
    }

    #[test]
    fn denoise_alone_records_one_entry() {
        let pre = Preprocessor::new(fast_config());
        let out = pre.denoise(&lined_page(0.0)).unwrap();
        assert_eq!(out.history, vec![Transform::Denoise]);
        assert_eq!(out.skew_angle, None);
    }

    #[test]
    fn empty_image_fails_preprocessing() {
        let pre = Preprocessor::new(fast_config());
        let err = pre.apply(DynamicImage::new_luma8(0, 0)).unwrap_err();
        assert!(matches!(err, FolioError::Preprocessing(_)));
    }
}
