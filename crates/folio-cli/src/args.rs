// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments and how they fold into a PipelineConfig.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use folio_core::config::PipelineConfig;
use folio_core::error::Result;
use folio_core::types::{OutputFormat, OutputMode};

/// Extract text from scanned PDFs and images.
#[derive(Debug, Parser)]
#[command(name = "folio", version, about)]
pub struct Cli {
    /// Documents to process, in order.
    #[arg(required_unless_present = "write_config")]
    pub inputs: Vec<PathBuf>,

    /// Directory receiving the artifacts and manifests.
    #[arg(short, long, default_value = "folio-output")]
    pub output_dir: PathBuf,

    /// Output format: text, json or xml.
    #[arg(short, long, value_parser = parse_format)]
    pub format: Option<OutputFormat>,

    /// Rasterization resolution.
    #[arg(long)]
    pub dpi: Option<u32>,

    /// 1-based pages to process, e.g. `1,3,5-7`. Default: all.
    #[arg(short, long, value_parser = parse_page_list)]
    pub pages: Option<PageList>,

    /// JSON configuration file; flags override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write one artifact per document instead of one per page.
    #[arg(long)]
    pub per_document: bool,

    /// Put a `Page N` header before each page of text output.
    #[arg(long)]
    pub page_headers: bool,

    /// Vertical distance (pixels) within which detections share a line.
    #[arg(long)]
    pub line_tolerance: Option<f32>,

    #[arg(long)]
    pub no_denoise: bool,

    #[arg(long)]
    pub no_deskew: bool,

    /// Threads rasterizing pages.
    #[arg(long)]
    pub raster_workers: Option<usize>,

    /// Threads running preprocessing and detection.
    #[arg(long)]
    pub detect_workers: Option<usize>,

    /// Directory holding `text-detection.rten` and `text-recognition.rten`.
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Save the effective configuration to this file and exit.
    #[arg(long, value_name = "PATH")]
    pub write_config: Option<PathBuf>,

    /// More logging (repeatable).
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Less logging (repeatable).
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    /// Start from the config file (or defaults), apply flags, validate.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(dpi) = self.dpi {
            config.dpi = dpi;
        }
        if let Some(PageList(pages)) = &self.pages {
            config.pages = Some(pages.clone());
        }
        if self.per_document {
            config.output.mode = OutputMode::PerDocument;
        }
        if self.page_headers {
            config.output.page_headers = true;
        }
        if let Some(tolerance) = self.line_tolerance {
            config.layout.line_tolerance = tolerance;
        }
        if self.no_denoise {
            config.preprocessing.denoise = false;
        }
        if self.no_deskew {
            config.preprocessing.deskew = false;
        }
        if let Some(workers) = self.raster_workers {
            config.raster.workers = workers;
        }
        if let Some(workers) = self.detect_workers {
            config.detection.workers = workers;
        }
        if let Some(dir) = &self.model_dir {
            config.detection.model_dir = Some(dir.clone());
        }

        config.validate()?;
        Ok(config)
    }

    /// Log filter implied by `-v`/`-q`, or `None` to defer to `RUST_LOG`.
    pub fn log_directive(&self) -> Option<&'static str> {
        match (self.verbose, self.quiet) {
            (0, 0) => None,
            (1, _) => Some("debug"),
            (v, _) if v > 1 => Some("trace"),
            (_, 1) => Some("warn"),
            _ => Some("error"),
        }
    }
}

fn parse_format(value: &str) -> std::result::Result<OutputFormat, String> {
    OutputFormat::from_name(value)
        .ok_or_else(|| format!("unknown format '{value}' (expected text, json or xml)"))
}

/// Widest range a single `a-b` entry may span.
const MAX_RANGE_PAGES: u32 = 100_000;

/// Parsed `--pages` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageList(pub Vec<u32>);

fn parse_page_list(value: &str) -> std::result::Result<PageList, String> {
    parse_pages(value).map(PageList)
}

/// Parse a page list such as `1,3,5-7` into ascending, distinct page numbers.
pub fn parse_pages(value: &str) -> std::result::Result<Vec<u32>, String> {
    let mut pages = Vec::new();
    for part in value.split(',').map(str::trim) {
        if part.is_empty() {
            return Err(format!("empty entry in page list '{value}'"));
        }
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_page(start)?;
                let end = parse_page(end)?;
                if start > end {
                    return Err(format!("descending page range '{part}'"));
                }
                if end - start >= MAX_RANGE_PAGES {
                    return Err(format!(
                        "page range '{part}' spans more than {MAX_RANGE_PAGES} pages"
                    ));
                }
                pages.extend(start..=end);
            }
            None => pages.push(parse_page(part)?),
        }
    }
    pages.sort_unstable();
    pages.dedup();
    Ok(pages)
}

fn parse_page(value: &str) -> std::result::Result<u32, String> {
    match value.trim().parse::<u32>() {
        Ok(0) => Err("pages are numbered from 1".to_string()),
        Ok(page) => Ok(page),
        Err(_) => Err(format!("'{}' is not a page number", value.trim())),
    }
}
