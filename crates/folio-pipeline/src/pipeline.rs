// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline orchestrator — batches pages through the rasterizer, fans them out
// over the page worker pool and persists the results.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use folio_core::config::PipelineConfig;
use folio_core::error::{FolioError, Result};
use folio_core::types::{Detection, OutputFormat, OutputMode, PageResult};
use folio_document::{
    FormatOptions, LayoutReconstructor, PageImage, Preprocessor, ProcessedImage, RasterBackend,
    Rasterizer, TextDetector, format_page, format_pages,
};
use rayon::prelude::*;
use tracing::{debug, error, info, instrument, warn};

use crate::artifact::{
    document_artifact_name, document_stem, manifest_name, page_artifact_name, sha256_file,
    write_atomic,
};
use crate::manifest::Manifest;
use crate::state::{DocumentReport, PageReport, PageState, Stage};

/// Runs documents end to end.
///
/// Holds two independent worker pools: the rasterizer's, and one for the
/// per-page work that follows (preprocess, detect, reconstruct, format,
/// persist). The detector is shared read-only between page workers.
pub struct Pipeline {
    config: PipelineConfig,
    rasterizer: Rasterizer,
    preprocessor: Preprocessor,
    layout: LayoutReconstructor,
    detector: Arc<dyn TextDetector>,
    pool: rayon::ThreadPool,
}

/// What one page worker hands back.
struct PageOutcome {
    page: u32,
    state: PageState,
    result: Option<PageResult>,
}

impl PageOutcome {
    fn failed(page: u32, mut state: PageState, err: &FolioError) -> Self {
        state.fail(err.to_string());
        Self {
            page,
            state,
            result: None,
        }
    }
}

/// Settings shared by every page of one document run.
struct RunContext<'a> {
    output_dir: &'a Path,
    stem: &'a str,
    format: OutputFormat,
    mode: OutputMode,
    options: FormatOptions,
}

impl Pipeline {
    /// Validate `config` and build both pools.
    pub fn new(config: PipelineConfig, detector: Arc<dyn TextDetector>) -> Result<Self> {
        config.validate()?;
        let rasterizer = Rasterizer::new(&config)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.detection.workers)
            .thread_name(|i| format!("folio-page-{i}"))
            .build()
            .map_err(|err| FolioError::Config(format!("page pool: {}", err)))?;

        info!(
            detector = detector.name(),
            raster_workers = config.raster.workers,
            page_workers = config.detection.workers,
            batch_size = config.raster.batch_size,
            "Pipeline ready"
        );

        Ok(Self {
            preprocessor: Preprocessor::new(config.preprocessing.clone()),
            layout: LayoutReconstructor::new(config.layout.line_tolerance),
            rasterizer,
            detector,
            pool,
            config,
        })
    }

    /// Replace the backend used to render PDF pages.
    pub fn with_pdf_backend(mut self, backend: Arc<dyn RasterBackend>) -> Self {
        self.rasterizer = self.rasterizer.with_pdf_backend(backend);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract `input` into `output_dir`.
    ///
    /// Returns `Err` only for failures that concern the whole document
    /// (missing or unsupported input, unreadable PDF, unwritable output
    /// directory). Page failures are reported in the [`DocumentReport`] and
    /// leave the other pages untouched.
    #[instrument(skip(self), fields(input = %input.display()))]
    pub fn process_document(&self, input: &Path, output_dir: &Path) -> Result<DocumentReport> {
        let plan = self.rasterizer.plan(input, self.config.pages.as_deref())?;
        std::fs::create_dir_all(output_dir)?;

        let format = self.config.output.format;
        let mode = self.config.output.mode;
        let stem = document_stem(input);
        let manifest_path = output_dir.join(manifest_name(&stem));
        let source_sha256 = sha256_file(input)?;

        let stored = match Manifest::load(&manifest_path) {
            Ok(found) => found,
            Err(err) => {
                warn!(path = %manifest_path.display(), error = %err, "Ignoring unreadable manifest");
                None
            }
        };
        let (previous, superseded) = match stored {
            Some(m) if m.matches(&source_sha256, format, mode, &plan.pages) => (Some(m), None),
            other => (None, other),
        };

        if let Some(manifest) = &previous {
            if manifest.is_complete(output_dir) {
                info!(run_id = %manifest.run_id, "Document already extracted; skipping");
                return Ok(DocumentReport {
                    source: input.to_path_buf(),
                    skipped: true,
                    pages: skipped_pages(manifest, &plan.pages, output_dir),
                });
            }
        }

        let (mut manifest, mut states, pending) = match (previous, mode) {
            // Per-page artifacts are independent, so only the missing ones
            // need redoing.
            (Some(mut manifest), OutputMode::PerPage) => {
                manifest.renew();
                let pending = manifest.pending_pages(output_dir);
                let states = skipped_pages(&manifest, &plan.pages, output_dir)
                    .into_iter()
                    .filter(|p| !pending.contains(&p.page))
                    .map(|p| (p.page, p.state))
                    .collect::<BTreeMap<_, _>>();
                info!(
                    pending = pending.len(),
                    reused = states.len(),
                    "Resuming partially extracted document"
                );
                (manifest, states, pending)
            }
            (previous, _) => {
                // Output of an earlier run must not outlive it.
                if let Some(old) = previous.as_ref().or(superseded.as_ref()) {
                    remove_artifacts(old, output_dir)?;
                }
                let source = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| stem.clone());
                let manifest =
                    Manifest::new(source, source_sha256, format, mode, plan.pages.clone());
                (manifest, BTreeMap::new(), plan.pages.clone())
            }
        };

        let ctx = RunContext {
            output_dir,
            stem: &stem,
            format,
            mode,
            options: FormatOptions {
                page_headers: self.config.output.page_headers,
            },
        };

        let mut results: Vec<PageResult> = Vec::new();
        let batch_size = self.config.raster.batch_size.max(1);
        for (index, batch) in pending.chunks(batch_size).enumerate() {
            debug!(batch = index + 1, pages = ?batch, "Starting batch");
            let rasterized = self.rasterizer.rasterize_batch(&plan, batch);

            let mut images = Vec::with_capacity(rasterized.len());
            let mut outcomes = Vec::new();
            for (page, rendered) in rasterized {
                match rendered {
                    Ok(image) => images.push(image),
                    Err(err) => outcomes.push(PageOutcome::failed(
                        page,
                        PageState::Running(Stage::Rasterizing),
                        &err,
                    )),
                }
            }
            outcomes.extend(self.process_batch(images, &ctx));

            for outcome in outcomes {
                match &outcome.state {
                    PageState::Persisted(path) => {
                        manifest.record_success(outcome.page, file_name(path));
                    }
                    PageState::Failed { reason, .. } => {
                        if mode == OutputMode::PerPage {
                            let name = page_artifact_name(&stem, outcome.page, format);
                            remove_artifact(&output_dir.join(name))?;
                        }
                        manifest.record_failure(outcome.page, reason.clone());
                    }
                    _ => {}
                }
                // Per-page results are done with once their artifact exists.
                if mode == OutputMode::PerDocument {
                    if let Some(result) = outcome.result {
                        results.push(result);
                    }
                }
                states.insert(outcome.page, outcome.state);
            }

            if mode == OutputMode::PerPage {
                manifest.save(&manifest_path)?;
            }
        }

        if mode == OutputMode::PerDocument {
            self.persist_document(&ctx, &mut results, &mut states, &mut manifest)?;
            manifest.save(&manifest_path)?;
        }

        let report = DocumentReport {
            source: input.to_path_buf(),
            skipped: false,
            pages: states
                .into_iter()
                .map(|(page, state)| PageReport { page, state })
                .collect(),
        };
        log_summary(&report);
        Ok(report)
    }

    /// Run the post-raster stages for one batch on the page pool.
    fn process_batch(&self, images: Vec<PageImage>, ctx: &RunContext<'_>) -> Vec<PageOutcome> {
        if images.is_empty() {
            return Vec::new();
        }
        if self.config.detection.batch_inference {
            return self.process_batch_jointly(images, ctx);
        }

        self.pool.install(|| {
            images
                .into_par_iter()
                .map(|image| {
                    let page = image.page_number;
                    let mut state = PageState::Running(Stage::Rasterizing);
                    let processed = match self.preprocess(&mut state, image) {
                        Ok(processed) => processed,
                        Err(err) => return PageOutcome::failed(page, state, &err),
                    };
                    state.enter(Stage::Detecting);
                    match self.detector.detect(&processed.image) {
                        Ok(detections) => self.complete_page(page, state, detections, ctx),
                        Err(err) => PageOutcome::failed(page, state, &err),
                    }
                })
                .collect()
        })
    }

    /// Preprocess every page, then send all images to the detector in one
    /// call.
    fn process_batch_jointly(
        &self,
        images: Vec<PageImage>,
        ctx: &RunContext<'_>,
    ) -> Vec<PageOutcome> {
        let prepared: Vec<(u32, PageState, Result<ProcessedImage>)> = self.pool.install(|| {
            images
                .into_par_iter()
                .map(|image| {
                    let page = image.page_number;
                    let mut state = PageState::Running(Stage::Rasterizing);
                    let processed = self.preprocess(&mut state, image);
                    (page, state, processed)
                })
                .collect()
        });

        let mut outcomes = Vec::new();
        let mut ready: Vec<(u32, PageState)> = Vec::new();
        let mut pixels = Vec::new();
        for (page, mut state, processed) in prepared {
            match processed {
                Ok(processed) => {
                    state.enter(Stage::Detecting);
                    ready.push((page, state));
                    pixels.push(processed.image);
                }
                Err(err) => outcomes.push(PageOutcome::failed(page, state, &err)),
            }
        }
        if ready.is_empty() {
            return outcomes;
        }

        let detected = match self.detector.detect_batch(&pixels) {
            Ok(detected) if detected.len() == ready.len() => detected,
            Ok(detected) => {
                let err = FolioError::Detection(format!(
                    "detector returned {} results for {} images",
                    detected.len(),
                    ready.len()
                ));
                outcomes.extend(
                    ready
                        .into_iter()
                        .map(|(page, state)| PageOutcome::failed(page, state, &err)),
                );
                return outcomes;
            }
            Err(err) => {
                outcomes.extend(
                    ready
                        .into_iter()
                        .map(|(page, state)| PageOutcome::failed(page, state, &err)),
                );
                return outcomes;
            }
        };
        drop(pixels);

        let completed: Vec<PageOutcome> = self.pool.install(|| {
            ready
                .into_par_iter()
                .zip(detected.into_par_iter())
                .map(|((page, state), detections)| self.complete_page(page, state, detections, ctx))
                .collect()
        });
        outcomes.extend(completed);
        outcomes
    }

    fn preprocess(&self, state: &mut PageState, image: PageImage) -> Result<ProcessedImage> {
        state.enter(Stage::Preprocessing);
        self.preprocessor.apply(image.image)
    }

    /// Reconstruct lines and, in per-page mode, format and persist the page.
    fn complete_page(
        &self,
        page: u32,
        mut state: PageState,
        detections: Vec<Detection>,
        ctx: &RunContext<'_>,
    ) -> PageOutcome {
        state.enter(Stage::Reconstructing);
        let lines = self.layout.lines(&detections);
        let result = PageResult {
            page_number: page,
            detections,
            lines,
        };

        // Per-document output is written once every batch is done.
        if ctx.mode == OutputMode::PerDocument {
            return PageOutcome {
                page,
                state,
                result: Some(result),
            };
        }

        state.enter(Stage::Formatting);
        let body = match format_page(&result, ctx.format, &ctx.options) {
            Ok(body) => body,
            Err(err) => return PageOutcome::failed(page, state, &err),
        };

        state.enter(Stage::Persisting);
        let path = ctx
            .output_dir
            .join(page_artifact_name(ctx.stem, page, ctx.format));
        if let Err(err) = write_atomic(&path, body.as_bytes()) {
            return PageOutcome::failed(page, state, &err);
        }

        state.persist(path);
        PageOutcome {
            page,
            state,
            result: Some(result),
        }
    }

    /// Write the single per-document artifact from every successful page.
    fn persist_document(
        &self,
        ctx: &RunContext<'_>,
        results: &mut Vec<PageResult>,
        states: &mut BTreeMap<u32, PageState>,
        manifest: &mut Manifest,
    ) -> Result<()> {
        let name = document_artifact_name(ctx.stem, ctx.format);
        let path = ctx.output_dir.join(&name);
        if results.is_empty() {
            remove_artifact(&path)?;
            warn!("No page succeeded; no document artifact written");
            return Ok(());
        }
        results.sort_by_key(|r| r.page_number);

        for result in results.iter() {
            if let Some(state) = states.get_mut(&result.page_number) {
                state.enter(Stage::Formatting);
            }
        }
        let body = format_pages(results, ctx.format, &ctx.options)?;
        write_atomic(&path, body.as_bytes())?;

        for result in results.iter() {
            if let Some(state) = states.get_mut(&result.page_number) {
                state.enter(Stage::Persisting);
                state.persist(path.clone());
            }
            manifest.record_success(result.page_number, name.clone());
        }
        info!(artifact = %path.display(), pages = results.len(), "Document artifact written");
        Ok(())
    }
}

/// Reports for pages a previous run already produced.
fn skipped_pages(manifest: &Manifest, pages: &[u32], output_dir: &Path) -> Vec<PageReport> {
    pages
        .iter()
        .filter_map(|&page| {
            manifest.completed.get(&page).map(|name| PageReport {
                page,
                state: PageState::Skipped {
                    artifact: output_dir.join(name),
                },
            })
        })
        .collect()
}

/// Delete every artifact `manifest` recorded as completed.
fn remove_artifacts(manifest: &Manifest, output_dir: &Path) -> Result<()> {
    let mut names: Vec<&String> = manifest.completed.values().collect();
    names.sort();
    names.dedup();
    for name in names {
        remove_artifact(&output_dir.join(name))?;
    }
    Ok(())
}

/// Delete `path` if it exists.
fn remove_artifact(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(artifact = %path.display(), "Stale artifact removed");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(FolioError::Io(err)),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One log line per page, then one for the document.
fn log_summary(report: &DocumentReport) {
    for page in &report.pages {
        match &page.state {
            PageState::Persisted(path) => {
                info!(page = page.page, artifact = %path.display(), "Page extracted");
            }
            PageState::Skipped { artifact } => {
                info!(page = page.page, artifact = %artifact.display(), "Page already extracted");
            }
            PageState::Failed { stage, reason } => {
                error!(page = page.page, %stage, reason = %reason, "Page failed");
            }
            other => {
                warn!(page = page.page, state = ?other, "Page did not finish");
            }
        }
    }
    info!(
        source = %report.source.display(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Document finished"
    );
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("detector", &self.detector.name())
            .finish()
    }
}
