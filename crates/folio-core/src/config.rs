// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FolioError, Result};
use crate::types::{OutputFormat, OutputMode};

/// Settings for one extraction run. Missing fields in a config file fall
/// back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Rasterization resolution in dots per inch.
    pub dpi: u32,
    /// 1-based pages to process; `None` means every page.
    pub pages: Option<Vec<u32>>,
    pub raster: RasterConfig,
    pub preprocessing: PreprocessingConfig,
    pub detection: DetectionConfig,
    pub layout: LayoutConfig,
    pub output: OutputConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            pages: None,
            raster: RasterConfig::default(),
            preprocessing: PreprocessingConfig::default(),
            detection: DetectionConfig::default(),
            layout: LayoutConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Page batching and rasterization pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RasterConfig {
    /// Pages rasterized together; bounds peak memory.
    pub batch_size: usize,
    /// Worker threads in the rasterization pool.
    pub workers: usize,
    /// Fixed `[width, height]` applied to every page of a multi-page batch.
    pub batch_resize: Option<[u32; 2]>,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            workers: 4,
            batch_resize: None,
        }
    }
}

/// Which corrective transforms run, and their tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessingConfig {
    pub denoise: bool,
    pub deskew: bool,
    pub denoise_params: DenoiseConfig,
    pub deskew_params: DeskewConfig,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            denoise: true,
            deskew: true,
            denoise_params: DenoiseConfig::default(),
            deskew_params: DeskewConfig::default(),
        }
    }
}

/// Non-local-means filter strength and window sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DenoiseConfig {
    /// Filter strength for grayscale input.
    pub h: f32,
    /// Filter strength for colour input.
    pub h_color: f32,
    /// Side of the compared patch, in pixels (odd).
    pub template_window: u32,
    /// Side of the area searched for similar patches, in pixels (odd).
    pub search_window: u32,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            h: 10.0,
            h_color: 10.0,
            template_window: 7,
            search_window: 21,
        }
    }
}

/// Edge and line detection thresholds for skew estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeskewConfig {
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum Hough votes for a line to count.
    pub vote_threshold: u32,
    /// Non-maximum suppression radius in Hough space.
    pub suppression_radius: u32,
}

impl Default for DeskewConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 200.0,
            vote_threshold: 100,
            suppression_radius: 8,
        }
    }
}

/// Preferred compute device for the text detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// GPU when the backend has one, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

/// Detection pool and model location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    /// Worker threads running preprocess → detect → format per page.
    pub workers: usize,
    /// Send each raster batch to the detector in one call.
    pub batch_inference: bool,
    pub device: DevicePreference,
    /// Directory holding the detection and recognition models.
    pub model_dir: Option<PathBuf>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            batch_inference: false,
            device: DevicePreference::Auto,
            model_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Maximum vertical distance, in pixels, within one text line.
    pub line_tolerance: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            line_tolerance: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub mode: OutputMode,
    /// Precede each page of text output with a delimited header.
    pub page_headers: bool,
}

impl PipelineConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                FolioError::NotFound(format!("config file {}", path.display()))
            } else {
                FolioError::Io(err)
            }
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|err| {
            FolioError::Config(format!("{}: {}", path.display(), err))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.dpi == 0 {
            return Err(FolioError::Config("dpi must be greater than zero".into()));
        }
        if self.raster.batch_size == 0 {
            return Err(FolioError::Config("raster.batch_size must be at least 1".into()));
        }
        if self.raster.workers == 0 || self.detection.workers == 0 {
            return Err(FolioError::Config("worker counts must be at least 1".into()));
        }
        if let Some([w, h]) = self.raster.batch_resize {
            if w == 0 || h == 0 {
                return Err(FolioError::Config("raster.batch_resize must be non-zero".into()));
            }
        }
        if !(self.layout.line_tolerance.is_finite() && self.layout.line_tolerance >= 0.0) {
            return Err(FolioError::Config(
                "layout.line_tolerance must be a non-negative number".into(),
            ));
        }
        let denoise = &self.preprocessing.denoise_params;
        for (name, size) in [
            ("template_window", denoise.template_window),
            ("search_window", denoise.search_window),
        ] {
            if size == 0 || size % 2 == 0 {
                return Err(FolioError::Config(format!(
                    "preprocessing.denoise_params.{name} must be odd, got {size}"
                )));
            }
        }
        let positive = |h: f32| h.is_finite() && h > 0.0;
        if !(positive(denoise.h) && positive(denoise.h_color)) {
            return Err(FolioError::Config("denoise strength must be positive".into()));
        }
        if let Some(pages) = &self.pages {
            if pages.contains(&0) {
                return Err(FolioError::Config("page numbers are 1-based".into()));
            }
        }
        Ok(())
    }
}
