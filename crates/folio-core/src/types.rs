// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Folio extraction pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Four polygon vertices in pixel coordinates, each `[x, y]`.
///
/// Vertices are ordered top-left, top-right, bottom-right, bottom-left.
pub type Quad = [[f32; 2]; 4];

/// One recognised text fragment with its location and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub polygon: Quad,
    pub text: String,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Detection {
    /// Build a detection from an already-ordered polygon. The confidence is
    /// clamped into `[0, 1]`; NaN becomes 0.
    pub fn new(text: impl Into<String>, confidence: f32, polygon: Quad) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            polygon,
            text: text.into(),
            confidence,
        }
    }

    /// Build a detection from four corners in arbitrary order.
    pub fn from_corners(text: impl Into<String>, confidence: f32, corners: [[f32; 2]; 4]) -> Self {
        Self::new(text, confidence, order_quad(corners))
    }

    /// Y coordinate of the first vertex (the top edge).
    pub fn top_y(&self) -> f32 {
        self.polygon[0][1]
    }

    /// Axis-aligned bounds of the polygon as `(x1, y1, x2, y2)`.
    pub fn bounding_rect(&self) -> (f32, f32, f32, f32) {
        let mut x1 = f32::INFINITY;
        let mut y1 = f32::INFINITY;
        let mut x2 = f32::NEG_INFINITY;
        let mut y2 = f32::NEG_INFINITY;
        for [x, y] in self.polygon {
            x1 = x1.min(x);
            y1 = y1.min(y);
            x2 = x2.max(x);
            y2 = y2.max(y);
        }
        (x1, y1, x2, y2)
    }
}

/// Order four corners as top-left, top-right, bottom-right, bottom-left.
///
/// Corners are sorted clockwise (in y-down image space) around their centroid,
/// then rotated so the corner closest to the origin comes first.
pub fn order_quad(corners: [[f32; 2]; 4]) -> Quad {
    let cx = corners.iter().map(|p| p[0]).sum::<f32>() / 4.0;
    let cy = corners.iter().map(|p| p[1]).sum::<f32>() / 4.0;

    let mut sorted = corners;
    sorted.sort_by(|a, b| {
        let angle_a = (a[1] - cy).atan2(a[0] - cx);
        let angle_b = (b[1] - cy).atan2(b[0] - cx);
        angle_a.total_cmp(&angle_b)
    });

    let start = sorted
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a[0] + a[1]).total_cmp(&(b[0] + b[1])))
        .map(|(i, _)| i)
        .unwrap_or(0);
    sorted.rotate_left(start);
    sorted
}

/// Detections for one page plus the reading-order lines derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page number.
    pub page_number: u32,
    /// Detections exactly as the detector returned them.
    pub detections: Vec<Detection>,
    /// Reconstructed text lines, top to bottom.
    pub lines: Vec<String>,
}

impl PageResult {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Supported output encodings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Xml,
}

impl OutputFormat {
    /// File extension for artifacts in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }

    /// Parse a user-supplied format name (`text`, `txt`, `json`, `xml`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Xml => "xml",
        })
    }
}

/// Whether artifacts are written per page or once per document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    PerPage,
    PerDocument,
}

/// Raster image formats accepted as single-page documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Png,
    Jpeg,
    Tiff,
    Bmp,
}

/// Kind of input document, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    Pdf,
    Image(ImageKind),
}

impl DocumentKind {
    /// Infer the document kind from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Image(ImageKind::Png)),
            "jpg" | "jpeg" => Some(Self::Image(ImageKind::Jpeg)),
            "tif" | "tiff" => Some(Self::Image(ImageKind::Tiff)),
            "bmp" => Some(Self::Image(ImageKind::Bmp)),
            _ => None,
        }
    }

    /// Infer the document kind from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}
