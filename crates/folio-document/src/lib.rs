// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// folio-document — the per-page stages of the Folio extraction pipeline.
//
// Rasterizes PDF pages and image files, cleans them up (non-local-means
// denoise, Hough-based deskew), detects text, rebuilds reading order and
// renders the result as plain text, JSON or XML.

pub mod format;
pub mod layout;
pub mod ocr;
pub mod preprocess;
pub mod raster;

// Re-export the primary types so callers can use `folio_document::Rasterizer` etc.
pub use format::{FormatOptions, JsonContent, JsonDocument, JsonPage, format_page, format_pages};
pub use layout::LayoutReconstructor;
pub use ocr::{ComputeDevice, TextDetector, resolve_device};
pub use preprocess::{Preprocessor, ProcessedImage, Transform};
pub use raster::{PageImage, RasterBackend, RasterPlan, RasterSession, Rasterizer};

#[cfg(feature = "ocr")]
pub use ocr::{OcrConfig, OcrsDetector};
