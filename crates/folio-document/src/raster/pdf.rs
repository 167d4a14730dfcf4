// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF inputs — structure probing with `lopdf` and page rendering with
// pdfium (feature `pdfium`).

use std::path::Path;

use folio_core::error::{FolioError, Result};
use lopdf::Document;
use tracing::{debug, instrument};

/// Opens a PDF far enough to trust its page tree.
///
/// Rendering is left to a backend; the probe only answers whether the file
/// is a readable PDF and how many pages it has.
pub struct PdfProbe {
    document: Document,
}

impl PdfProbe {
    /// Open and parse a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = Document::load(path).map_err(|err| {
            FolioError::Pdf(format!("failed to open {}: {}", path.display(), err))
        })?;
        debug!(pages = document.get_pages().len(), "PDF probed");
        Ok(Self { document })
    }

    /// Parse a PDF already in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| FolioError::Pdf(format!("failed to load PDF from memory: {}", err)))?;
        Ok(Self { document })
    }

    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Whether the document is encrypted. Encrypted PDFs are still passed to
    /// the renderer, which may or may not cope.
    pub fn is_encrypted(&self) -> bool {
        self.document.is_encrypted()
    }
}

/// Renders PDF pages through the pdfium library.
///
/// Pdfium serializes calls internally, so the backend asks for a single
/// session at a time.
#[cfg(feature = "pdfium")]
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    /// Directory holding the pdfium shared library; the working directory and
    /// then the system library path are tried when unset.
    pub library_dir: Option<std::path::PathBuf>,
}

#[cfg(feature = "pdfium")]
impl super::RasterBackend for PdfiumBackend {
    fn page_count(&self, path: &Path) -> Result<u32> {
        let probe = PdfProbe::open(path)?;
        if probe.is_encrypted() {
            tracing::warn!(path = %path.display(), "PDF is encrypted");
        }
        Ok(probe.page_count())
    }

    fn open_session(&self) -> Result<Box<dyn super::RasterSession>> {
        use pdfium_render::prelude::Pdfium;

        let dir = self
            .library_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| "./".to_string());
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|err| {
                FolioError::UnsupportedFormat(format!("pdfium library unavailable: {}", err))
            })?;
        tracing::info!("pdfium bound");
        Ok(Box::new(PdfiumSession {
            pdfium: Pdfium::new(bindings),
        }))
    }

    fn max_parallelism(&self) -> Option<usize> {
        Some(1)
    }
}

#[cfg(feature = "pdfium")]
struct PdfiumSession {
    pdfium: pdfium_render::prelude::Pdfium,
}

#[cfg(feature = "pdfium")]
impl PdfiumSession {
    fn render_loaded(
        document: &pdfium_render::prelude::PdfDocument<'_>,
        page: u32,
        dpi: u32,
    ) -> Result<image::DynamicImage> {
        use pdfium_render::prelude::PdfRenderConfig;

        let pdf_page = document
            .pages()
            .iter()
            .nth(page.saturating_sub(1) as usize)
            .ok_or_else(|| FolioError::Rasterization(format!("page {} not found", page)))?;

        // PDF user space is 72 points per inch.
        let scale = dpi as f32 / 72.0;
        let width = (pdf_page.width().value * scale).round() as i32;
        let height = (pdf_page.height().value * scale).round() as i32;

        let bitmap = pdf_page
            .render_with_config(
                &PdfRenderConfig::new()
                    .set_target_width(width)
                    .set_target_height(height),
            )
            .map_err(|err| {
                FolioError::Rasterization(format!("failed to render page {}: {}", page, err))
            })?;

        debug!(page, width, height, "PDF page rendered");
        Ok(bitmap.as_image())
    }
}

#[cfg(feature = "pdfium")]
impl super::RasterSession for PdfiumSession {
    fn render(&mut self, path: &Path, page: u32, dpi: u32) -> Result<image::DynamicImage> {
        self.render_pages(path, &[page], dpi)
            .pop()
            .map(|(_, rendered)| rendered)
            .unwrap_or_else(|| Err(FolioError::Rasterization(format!("page {} not rendered", page))))
    }

    /// Loads the document once for all `pages`.
    #[instrument(skip(self, pages), fields(path = %path.display(), pages = pages.len()))]
    fn render_pages(
        &mut self,
        path: &Path,
        pages: &[u32],
        dpi: u32,
    ) -> Vec<(u32, Result<image::DynamicImage>)> {
        let document = match self.pdfium.load_pdf_from_file(path, None) {
            Ok(document) => document,
            Err(err) => {
                let reason = format!("failed to load {}: {}", path.display(), err);
                return pages
                    .iter()
                    .map(|&page| (page, Err(FolioError::Rasterization(reason.clone()))))
                    .collect();
            }
        };
        pages
            .iter()
            .map(|&page| (page, Self::render_loaded(&document, page, dpi)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Object, dictionary};

    /// Build a minimal PDF with `pages` blank A4 pages.
    fn blank_pdf(pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..pages)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn probe_counts_pages() {
        let probe = PdfProbe::from_bytes(&blank_pdf(3)).unwrap();
        assert_eq!(probe.page_count(), 3);
        assert!(!probe.is_encrypted());
    }

    #[test]
    fn probe_opens_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, blank_pdf(2)).unwrap();
        assert_eq!(PdfProbe::open(&path).unwrap().page_count(), 2);
    }

    #[test]
    fn garbage_is_a_pdf_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();
        let err = PdfProbe::open(&path).err().unwrap();
        assert!(matches!(err, FolioError::Pdf(_)));
        assert!(!err.is_page_scoped());
    }
}
