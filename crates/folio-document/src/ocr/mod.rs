// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text detection — the detector seam and compute device selection.

#[cfg(feature = "ocr")]
pub mod engine;

use folio_core::config::DevicePreference;
use folio_core::error::Result;
use folio_core::types::Detection;
use image::DynamicImage;
use tracing::{info, warn};

#[cfg(feature = "ocr")]
pub use engine::{OcrConfig, OcrsDetector};

/// Finds and recognises text on a page image.
///
/// Implementations are loaded once and shared between pipeline workers, so
/// they must be usable through `&self` from several threads.
pub trait TextDetector: Send + Sync {
    /// Detections for one image, in no particular order.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>>;

    /// Detections for several images, one entry per image in input order.
    fn detect_batch(&self, images: &[DynamicImage]) -> Result<Vec<Vec<Detection>>> {
        images.iter().map(|image| self.detect(image)).collect()
    }

    /// Short name for logs.
    fn name(&self) -> &str {
        "detector"
    }
}

/// Where inference actually runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    Gpu,
}

/// Pick the compute device for a preference, falling back to the CPU when
/// no GPU is available.
pub fn resolve_device(preference: DevicePreference, gpu_available: bool) -> ComputeDevice {
    match (preference, gpu_available) {
        (DevicePreference::Cpu, _) => ComputeDevice::Cpu,
        (DevicePreference::Auto, true) | (DevicePreference::Gpu, true) => ComputeDevice::Gpu,
        (DevicePreference::Auto, false) => {
            info!("No GPU available; running text detection on the CPU");
            ComputeDevice::Cpu
        }
        (DevicePreference::Gpu, false) => {
            warn!("GPU requested but unavailable; falling back to the CPU");
            ComputeDevice::Cpu
        }
    }
}
