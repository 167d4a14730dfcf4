// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text detector backed by `ocrs`, a pure-Rust OCR engine running neural
// network models through `rten`.
//
// # Feature Gate
//
// Only available with the `ocr` feature:
//
// ```toml
// folio-document = { path = "crates/folio-document", features = ["ocr"] }
// ```
//
// # Model Setup
//
// Two model files are required:
//
// - **Detection model** (`text-detection.rten`) — locates words on the page.
// - **Recognition model** (`text-recognition.rten`) — decodes the characters.
//
// Running `ocrs-cli` once downloads both into `$XDG_CACHE_HOME/ocrs`
// (typically `~/.cache/ocrs`), which is where they are looked for by default.

use std::path::{Path, PathBuf};

use folio_core::config::DevicePreference;
use folio_core::error::{FolioError, Result};
use folio_core::types::Detection;
use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use tracing::{debug, info, instrument};

use super::{ComputeDevice, TextDetector, resolve_device};

/// `ocrs` reports no recognition score, so every detection gets this.
const OCRS_CONFIDENCE: f32 = 1.0;

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// Default directory for cached model files: `$XDG_CACHE_HOME/ocrs`, then
/// `~/.cache/ocrs`.
fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Where to load the detection and recognition models from.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
    pub device: DevicePreference,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrConfig {
    /// Expect `text-detection.rten` and `text-recognition.rten` in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
            device: DevicePreference::Auto,
        }
    }

    /// Use the configured directory, or the default cache when unset.
    pub fn from_option(dir: Option<&Path>, device: DevicePreference) -> Self {
        let mut config = match dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::default(),
        };
        config.device = device;
        config
    }

    /// Both model files must exist before anything is loaded.
    pub fn validate(&self) -> Result<()> {
        for (kind, path) in [
            ("detection", &self.detection_model_path),
            ("recognition", &self.recognition_model_path),
        ] {
            if !path.exists() {
                return Err(FolioError::Model(format!(
                    "{} model not found at {}; run `ocrs-cli` once to download models",
                    kind,
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// [`TextDetector`] producing one detection per recognised word.
///
/// Models are loaded once at construction; the engine is then shared by all
/// pipeline workers.
pub struct OcrsDetector {
    engine: OcrEngine,
    device: ComputeDevice,
}

impl OcrsDetector {
    /// Load both models. Fails with [`FolioError::Model`] when either is
    /// missing or corrupt.
    ///
    /// `ocrs` and `rten` are very slow without optimisation; the workspace
    /// builds dependencies at `opt-level = 2` even in debug.
    #[instrument(skip_all, fields(
        detection = %config.detection_model_path.display(),
        recognition = %config.recognition_model_path.display(),
    ))]
    pub fn new(config: OcrConfig) -> Result<Self> {
        config.validate()?;
        // rten runs on the CPU only.
        let device = resolve_device(config.device, false);

        info!("Loading text detection model");
        let detection_model = Model::load_file(&config.detection_model_path).map_err(|err| {
            FolioError::Model(format!(
                "failed to load detection model from {}: {}",
                config.detection_model_path.display(),
                err
            ))
        })?;

        info!("Loading text recognition model");
        let recognition_model = Model::load_file(&config.recognition_model_path).map_err(|err| {
            FolioError::Model(format!(
                "failed to load recognition model from {}: {}",
                config.recognition_model_path.display(),
                err
            ))
        })?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| FolioError::Model(format!("failed to initialise OCR engine: {}", err)))?;

        info!(?device, "OCR engine ready");
        Ok(Self { engine, device })
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }
}

impl TextDetector for OcrsDetector {
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            FolioError::Detection(format!(
                "failed to create image source ({}x{}): {}",
                width, height, err
            ))
        })?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| FolioError::Detection(format!("input preparation failed: {}", err)))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|err| FolioError::Detection(format!("word detection failed: {}", err)))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| FolioError::Detection(format!("recognition failed: {}", err)))?;

        let mut detections = Vec::with_capacity(word_rects.len());
        for line in lines.iter().flatten() {
            for word in line.words() {
                let text = word.to_string();
                if text.trim().is_empty() {
                    continue;
                }
                let corners = word.rotated_rect().corners().map(|p| [p.x, p.y]);
                detections.push(Detection::from_corners(text, OCRS_CONFIDENCE, corners));
            }
        }

        debug!(words = detections.len(), lines = line_rects.len(), "Text detected");
        Ok(detections)
    }

    fn name(&self) -> &str {
        "ocrs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_to_model_files() {
        let config = OcrConfig::default();
        assert!(config.detection_model_path.ends_with(DETECTION_MODEL_FILENAME));
        assert!(config.recognition_model_path.ends_with(RECOGNITION_MODEL_FILENAME));
        assert_eq!(config.device, DevicePreference::Auto);
    }

    #[test]
    fn config_from_dir() {
        let config = OcrConfig::from_dir("/tmp/my-models");
        assert_eq!(
            config.detection_model_path,
            PathBuf::from("/tmp/my-models/text-detection.rten")
        );
        assert_eq!(
            config.recognition_model_path,
            PathBuf::from("/tmp/my-models/text-recognition.rten")
        );
    }

    #[test]
    fn config_from_option_keeps_device() {
        let config = OcrConfig::from_option(Some(Path::new("/models")), DevicePreference::Gpu);
        assert_eq!(config.device, DevicePreference::Gpu);
        assert!(config.detection_model_path.starts_with("/models"));
    }

    #[test]
    fn missing_models_are_a_model_error() {
        let config = OcrConfig::from_dir("/nonexistent/path/ocr-models");
        assert!(matches!(config.validate(), Err(FolioError::Model(_))));
        assert!(matches!(OcrsDetector::new(config), Err(FolioError::Model(_))));
    }
}
