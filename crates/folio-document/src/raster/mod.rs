// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasterization — turns PDF pages and image files into pixel buffers,
// batch by batch, on a dedicated worker pool.

pub mod image_file;
pub mod pdf;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use folio_core::config::PipelineConfig;
use folio_core::error::{FolioError, Result};
use folio_core::types::DocumentKind;
use image::DynamicImage;
use image::imageops::FilterType;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

pub use image_file::ImageFileBackend;
pub use pdf::PdfProbe;
#[cfg(feature = "pdfium")]
pub use pdf::PdfiumBackend;

/// One rasterized page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based page number within the source document.
    pub page_number: u32,
    /// Resolution the page was rendered at.
    pub dpi: u32,
    pub image: DynamicImage,
}

impl PageImage {
    pub fn new(page_number: u32, dpi: u32, image: DynamicImage) -> Self {
        Self {
            page_number,
            dpi,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A rendering context owned by a single worker thread.
pub trait RasterSession {
    /// Render one 1-based page of `path` at `dpi`.
    fn render(&mut self, path: &Path, page: u32, dpi: u32) -> Result<DynamicImage>;

    /// Render several pages of one document, one entry per page in input
    /// order. Backends that open documents expensively override this to
    /// open `path` once.
    fn render_pages(&mut self, path: &Path, pages: &[u32], dpi: u32) -> Vec<(u32, Result<DynamicImage>)> {
        pages.iter().map(|&page| (page, self.render(path, page, dpi))).collect()
    }
}

/// A source of page images for one document kind.
pub trait RasterBackend: Send + Sync {
    /// Number of pages in the document. Failing here is fatal for the document.
    fn page_count(&self, path: &Path) -> Result<u32>;

    /// Open a per-worker rendering session.
    fn open_session(&self) -> Result<Box<dyn RasterSession>>;

    /// Upper bound on concurrent sessions, if the backend has one. At most
    /// this many sessions are open at once within a batch.
    fn max_parallelism(&self) -> Option<usize> {
        None
    }
}

/// Pages of one document, validated and ready to be rendered in batches.
pub struct RasterPlan {
    pub path: PathBuf,
    pub kind: DocumentKind,
    /// Total pages the document reports.
    pub page_count: u32,
    /// Pages to render, ascending and de-duplicated. May include pages past
    /// `page_count`; those fail individually when rendered.
    pub pages: Vec<u32>,
    batch_size: usize,
    backend: Arc<dyn RasterBackend>,
}

impl RasterPlan {
    /// Fixed-size page batches in ascending order.
    pub fn batches(&self) -> impl Iterator<Item = &[u32]> {
        self.pages.chunks(self.batch_size)
    }

    pub fn batch_count(&self) -> usize {
        self.pages.len().div_ceil(self.batch_size)
    }
}

impl fmt::Debug for RasterPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterPlan")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("page_count", &self.page_count)
            .field("pages", &self.pages)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

/// Converts documents into [`PageImage`]s.
///
/// Owns its own rayon pool so rasterization never competes with the page
/// pipeline's workers.
pub struct Rasterizer {
    dpi: u32,
    batch_size: usize,
    batch_resize: Option<[u32; 2]>,
    pool: rayon::ThreadPool,
    pdf_backend: Option<Arc<dyn RasterBackend>>,
    image_backend: Arc<dyn RasterBackend>,
}

impl Rasterizer {
    /// Build a rasterizer from the pipeline configuration.
    ///
    /// PDF support comes from pdfium when the `pdfium` feature is enabled;
    /// otherwise PDFs are rejected as unsupported unless a backend is injected
    /// with [`with_pdf_backend`](Self::with_pdf_backend).
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.raster.workers)
            .thread_name(|i| format!("folio-raster-{i}"))
            .build()
            .map_err(|err| FolioError::Config(format!("rasterization pool: {}", err)))?;

        Ok(Self {
            dpi: config.dpi,
            batch_size: config.raster.batch_size.max(1),
            batch_resize: config.raster.batch_resize,
            pool,
            pdf_backend: default_pdf_backend(),
            image_backend: Arc::new(ImageFileBackend),
        })
    }

    /// Replace the backend used for PDF documents.
    pub fn with_pdf_backend(mut self, backend: Arc<dyn RasterBackend>) -> Self {
        self.pdf_backend = Some(backend);
        self
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Validate `path` and resolve the pages to render.
    ///
    /// `pages` is a 1-based selection; `None` or an empty slice selects every
    /// page. Missing documents, unknown extensions and unreadable PDFs fail
    /// here, before any page is touched.
    #[instrument(skip(self, pages), fields(path = %path.display()))]
    pub fn plan(&self, path: &Path, pages: Option<&[u32]>) -> Result<RasterPlan> {
        if !path.is_file() {
            return Err(FolioError::NotFound(path.display().to_string()));
        }

        let kind = DocumentKind::from_path(path).ok_or_else(|| {
            FolioError::UnsupportedFormat(format!(
                "{} (expected .pdf, .png, .jpg, .jpeg, .tif, .tiff or .bmp)",
                path.display()
            ))
        })?;

        let backend = match kind {
            DocumentKind::Pdf => self.pdf_backend.clone().ok_or_else(|| {
                FolioError::UnsupportedFormat(
                    "PDF rendering is not available in this build (enable the `pdfium` feature)"
                        .to_string(),
                )
            })?,
            DocumentKind::Image(_) => Arc::clone(&self.image_backend),
        };

        let page_count = backend.page_count(path)?;

        let pages = match pages {
            Some(selection) if !selection.is_empty() => {
                let mut selection = selection.to_vec();
                selection.sort_unstable();
                selection.dedup();
                if selection.first() == Some(&0) {
                    return Err(FolioError::Config("page numbers are 1-based".into()));
                }
                selection
            }
            _ => (1..=page_count).collect(),
        };

        info!(
            ?kind,
            page_count,
            selected = pages.len(),
            batch_size = self.batch_size,
            "Document planned"
        );

        Ok(RasterPlan {
            path: path.to_path_buf(),
            kind,
            page_count,
            pages,
            batch_size: self.batch_size,
            backend,
        })
    }

    /// Render one batch of pages from `plan`.
    ///
    /// Every requested page yields exactly one entry, sorted by page number.
    /// A failing page is reported in place and does not stop the batch.
    #[instrument(skip(self, plan), fields(path = %plan.path.display(), pages = batch.len()))]
    pub fn rasterize_batch(&self, plan: &RasterPlan, batch: &[u32]) -> Vec<(u32, Result<PageImage>)> {
        let resize = if batch.len() > 1 { self.batch_resize } else { None };
        let workers = self.pool.current_num_threads();
        let sessions = plan
            .backend
            .max_parallelism()
            .unwrap_or(usize::MAX)
            .min(workers)
            .min(batch.len())
            .max(1);
        let render = |session: &mut Result<Box<dyn RasterSession>>, pages: &[u32]| {
            self.render_pages(session, plan, pages, resize)
        };

        let mut results: Vec<(u32, Result<PageImage>)> = if sessions == 1 {
            render(&mut plan.backend.open_session(), batch)
        } else if sessions < workers {
            // One session per chunk caps the number open at once.
            self.pool.install(|| {
                batch
                    .par_chunks(batch.len().div_ceil(sessions))
                    .flat_map_iter(|chunk| render(&mut plan.backend.open_session(), chunk))
                    .collect()
            })
        } else {
            self.pool.install(|| {
                batch
                    .par_iter()
                    .map_init(
                        || plan.backend.open_session(),
                        |session, &page| render(session, std::slice::from_ref(&page)),
                    )
                    .flatten_iter()
                    .collect()
            })
        };

        results.sort_by_key(|(page, _)| *page);
        debug!(
            ok = results.iter().filter(|(_, r)| r.is_ok()).count(),
            failed = results.iter().filter(|(_, r)| r.is_err()).count(),
            "Batch rasterized"
        );
        results
    }

    /// Render `pages` through one session. Out-of-range pages and a session
    /// that failed to open fail per page.
    fn render_pages(
        &self,
        session: &mut Result<Box<dyn RasterSession>>,
        plan: &RasterPlan,
        pages: &[u32],
        resize: Option<[u32; 2]>,
    ) -> Vec<(u32, Result<PageImage>)> {
        let (valid, invalid): (Vec<u32>, Vec<u32>) = pages
            .iter()
            .partition(|&&page| page >= 1 && page <= plan.page_count);

        let mut results: Vec<(u32, Result<PageImage>)> = invalid
            .into_iter()
            .map(|page| {
                let err = FolioError::Rasterization(format!(
                    "page {} out of range (document has {} pages)",
                    page, plan.page_count
                ));
                (page, Err(err))
            })
            .collect();

        match session {
            Ok(session) if !valid.is_empty() => {
                for (page, rendered) in session.render_pages(&plan.path, &valid, self.dpi) {
                    let image = rendered.map(|image| self.finish_page(page, image, resize));
                    results.push((page, image));
                }
            }
            Ok(_) => {}
            Err(err) => {
                for page in valid {
                    let err = FolioError::Rasterization(format!("no rendering session: {}", err));
                    results.push((page, Err(err)));
                }
            }
        }

        for (page, result) in &results {
            if let Err(err) = result {
                warn!(page, error = %err, "Page rasterization failed");
            }
        }
        results
    }

    fn finish_page(&self, page: u32, mut image: DynamicImage, resize: Option<[u32; 2]>) -> PageImage {
        if let Some([width, height]) = resize {
            image = image.resize_exact(width, height, FilterType::Triangle);
        }
        debug!(page, width = image.width(), height = image.height(), "Page rendered");
        PageImage::new(page, self.dpi, image)
    }
}

#[cfg(feature = "pdfium")]
fn default_pdf_backend() -> Option<Arc<dyn RasterBackend>> {
    Some(Arc::new(PdfiumBackend::default()))
}

#[cfg(not(feature = "pdfium"))]
fn default_pdf_backend() -> Option<Arc<dyn RasterBackend>> {
    None
}
