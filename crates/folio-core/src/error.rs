// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Folio.

use thiserror::Error;

/// Top-level error type for all Folio operations.
#[derive(Debug, Error)]
pub enum FolioError {
    // -- Input errors --
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("PDF operation failed: {0}")]
    Pdf(String),

    // -- Per-page stage errors --
    #[error("rasterization failed: {0}")]
    Rasterization(String),

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("text detection failed: {0}")]
    Detection(String),

    // -- Setup errors --
    #[error("model error: {0}")]
    Model(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Output --
    #[error("formatting failed: {0}")]
    Formatting(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FolioError {
    /// Whether the failure is confined to a single page.
    ///
    /// Page-scoped failures mark that page as failed and let the rest of the
    /// document continue; everything else aborts the unit of work it occurred
    /// in.
    pub fn is_page_scoped(&self) -> bool {
        matches!(
            self,
            Self::Rasterization(_) | Self::Image(_) | Self::Preprocessing(_) | Self::Detection(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FolioError>;
