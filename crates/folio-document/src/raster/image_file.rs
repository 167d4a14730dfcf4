// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single-page raster inputs (PNG, JPEG, TIFF, BMP) decoded with the `image`
// crate.

use std::path::Path;

use folio_core::error::{FolioError, Result};
use image::DynamicImage;
use tracing::{debug, instrument};

use super::{RasterBackend, RasterSession};

/// Treats an image file as a one-page document.
///
/// The pixels are used as-is; the requested DPI only labels the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileBackend;

impl RasterBackend for ImageFileBackend {
    fn page_count(&self, _path: &Path) -> Result<u32> {
        Ok(1)
    }

    fn open_session(&self) -> Result<Box<dyn RasterSession>> {
        Ok(Box::new(ImageFileSession))
    }
}

struct ImageFileSession;

impl RasterSession for ImageFileSession {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn render(&mut self, path: &Path, page: u32, _dpi: u32) -> Result<DynamicImage> {
        if page != 1 {
            return Err(FolioError::Rasterization(format!(
                "image inputs have a single page, requested page {}",
                page
            )));
        }

        let image = image::open(path).map_err(|err| {
            FolioError::Image(format!("failed to open {}: {}", path.display(), err))
        })?;
        debug!(width = image.width(), height = image.height(), "Image decoded");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn decodes_png_as_single_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        RgbImage::from_pixel(12, 8, Rgb([10, 20, 30])).save(&path).unwrap();

        assert_eq!(ImageFileBackend.page_count(&path).unwrap(), 1);
        let mut session = ImageFileBackend.open_session().unwrap();
        let image = session.render(&path, 1, 300).unwrap();
        assert_eq!((image.width(), image.height()), (12, 8));
    }

    #[test]
    fn second_page_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        RgbImage::new(4, 4).save(&path).unwrap();

        let mut session = ImageFileBackend.open_session().unwrap();
        let err = session.render(&path, 2, 300).unwrap_err();
        assert!(matches!(err, FolioError::Rasterization(_)));
    }

    #[test]
    fn corrupt_image_is_an_image_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let mut session = ImageFileBackend.open_session().unwrap();
        let err = session.render(&path, 1, 300).unwrap_err();
        assert!(matches!(err, FolioError::Image(_)));
        assert!(err.is_page_scoped());
    }
}
