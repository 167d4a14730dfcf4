// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Folio — scanned-document text extraction
//
// Entry point. Initialises logging, resolves the configuration, loads the
// text detector once and runs every input through the pipeline.

mod args;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use folio_core::config::PipelineConfig;
use folio_core::error::Result;
use folio_document::{OcrConfig, OcrsDetector};
use folio_pipeline::{DocumentReport, Pipeline};
use tracing_subscriber::EnvFilter;

use args::Cli;

/// Every page of every document succeeded (or was already done).
const EXIT_OK: u8 = 0;
/// At least one page failed.
const EXIT_PAGE_FAILURES: u8 = 1;
/// A document failed as a whole, or startup failed.
const EXIT_FATAL: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Folio starting");

    let config = match cli.pipeline_config() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Invalid configuration");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if let Some(path) = &cli.write_config {
        return match config.save(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Configuration written");
                ExitCode::from(EXIT_OK)
            }
            Err(err) => {
                tracing::error!(error = %err, "Could not write configuration");
                ExitCode::from(EXIT_FATAL)
            }
        };
    }

    let pipeline = match build_pipeline(config) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            tracing::error!(error = %err, "Startup failed");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let mut outcomes = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let outcome = pipeline.process_document(input, &cli.output_dir);
        print_summary(input, &outcome);
        outcomes.push(outcome);
    }
    ExitCode::from(exit_code(&outcomes))
}

fn init_tracing(cli: &Cli) {
    let filter = match cli.log_directive() {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the OCR models once and hand them to the pipeline.
fn build_pipeline(config: PipelineConfig) -> Result<Pipeline> {
    let ocr = OcrConfig::from_option(config.detection.model_dir.as_deref(), config.detection.device);
    let detector = OcrsDetector::new(ocr)?;
    tracing::info!(device = ?detector.device(), "Text detector loaded");
    Pipeline::new(config, Arc::new(detector))
}

/// One line per document on stdout.
fn print_summary(input: &Path, outcome: &Result<DocumentReport>) {
    let name = input.display();
    match outcome {
        Ok(report) if report.skipped => {
            println!("{name}: already extracted ({} pages)", report.pages.len());
        }
        Ok(report) => {
            println!(
                "{name}: {} of {} pages extracted, {} failed",
                report.succeeded(),
                report.pages.len(),
                report.failed()
            );
        }
        Err(err) => {
            tracing::error!(input = %name, error = %err, "Document failed");
            println!("{name}: failed: {err}");
        }
    }
}

fn exit_code(outcomes: &[Result<DocumentReport>]) -> u8 {
    if outcomes.iter().any(|o| o.is_err()) {
        EXIT_FATAL
    } else if outcomes
        .iter()
        .flatten()
        .any(DocumentReport::has_failures)
    {
        EXIT_PAGE_FAILURES
    } else {
        EXIT_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::error::FolioError;
    use folio_pipeline::{PageReport, PageState, Stage};
    use std::path::PathBuf;

    fn report(states: Vec<PageState>) -> DocumentReport {
        DocumentReport {
            source: PathBuf::from("scan.pdf"),
            skipped: false,
            pages: states
                .into_iter()
                .enumerate()
                .map(|(i, state)| PageReport {
                    page: i as u32 + 1,
                    state,
                })
                .collect(),
        }
    }

    fn ok_page() -> PageState {
        PageState::Persisted(PathBuf::from("out/scan_page_0001.txt"))
    }

    fn failed_page() -> PageState {
        PageState::Failed {
            stage: Stage::Detecting,
            reason: "boom".into(),
        }
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(&[]), EXIT_OK);
        assert_eq!(exit_code(&[Ok(report(vec![ok_page(), ok_page()]))]), EXIT_OK);
        assert_eq!(
            exit_code(&[
                Ok(report(vec![ok_page()])),
                Ok(report(vec![ok_page(), failed_page()])),
            ]),
            EXIT_PAGE_FAILURES
        );
        assert_eq!(
            exit_code(&[
                Ok(report(vec![failed_page()])),
                Err(FolioError::NotFound("missing.pdf".into())),
            ]),
            EXIT_FATAL
        );
    }

    #[test]
    fn missing_models_fail_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.detection.model_dir = Some(dir.path().to_path_buf());
        assert!(matches!(build_pipeline(config), Err(FolioError::Model(_))));
    }
}
