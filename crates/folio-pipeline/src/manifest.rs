// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-document run manifest — records what a run was asked to produce and
// what it actually produced, so a later run can skip finished work.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use folio_core::error::{FolioError, Result};
use folio_core::types::{OutputFormat, OutputMode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::artifact::write_atomic;

/// Stored next to the artifacts as `<stem>.manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// File name of the source document.
    pub source: String,
    pub source_sha256: String,
    pub format: OutputFormat,
    pub mode: OutputMode,
    /// Pages the run was asked for.
    pub expected_pages: Vec<u32>,
    /// Page → artifact file name (relative to the output directory).
    pub completed: BTreeMap<u32, String>,
    /// Page → failure reason.
    pub failed: BTreeMap<u32, String>,
    pub run_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl Manifest {
    pub fn new(
        source: impl Into<String>,
        source_sha256: impl Into<String>,
        format: OutputFormat,
        mode: OutputMode,
        expected_pages: Vec<u32>,
    ) -> Self {
        Self {
            source: source.into(),
            source_sha256: source_sha256.into(),
            format,
            mode,
            expected_pages,
            completed: BTreeMap::new(),
            failed: BTreeMap::new(),
            run_id: Uuid::new_v4(),
            updated_at: Utc::now(),
        }
    }

    /// Read a manifest; `Ok(None)` when there is none yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(FolioError::Io(err)),
        };
        let manifest = serde_json::from_str(&data)?;
        debug!(path = %path.display(), "Manifest loaded");
        Ok(Some(manifest))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    /// Whether this manifest describes the same request: identical source
    /// bytes, output format, mode and page selection.
    pub fn matches(
        &self,
        source_sha256: &str,
        format: OutputFormat,
        mode: OutputMode,
        expected_pages: &[u32],
    ) -> bool {
        self.source_sha256 == source_sha256
            && self.format == format
            && self.mode == mode
            && self.expected_pages == expected_pages
    }

    /// Every expected page completed, nothing failed, and every recorded
    /// artifact still present in `output_dir`.
    pub fn is_complete(&self, output_dir: &Path) -> bool {
        self.failed.is_empty()
            && self
                .expected_pages
                .iter()
                .all(|page| self.artifact_exists(*page, output_dir))
    }

    /// Expected pages without an artifact on disk, ascending.
    pub fn pending_pages(&self, output_dir: &Path) -> Vec<u32> {
        self.expected_pages
            .iter()
            .copied()
            .filter(|page| !self.artifact_exists(*page, output_dir))
            .collect()
    }

    fn artifact_exists(&self, page: u32, output_dir: &Path) -> bool {
        self.completed
            .get(&page)
            .is_some_and(|name| output_dir.join(name).is_file())
    }

    pub fn record_success(&mut self, page: u32, artifact: impl Into<String>) {
        self.failed.remove(&page);
        self.completed.insert(page, artifact.into());
        self.updated_at = Utc::now();
    }

    pub fn record_failure(&mut self, page: u32, reason: impl Into<String>) {
        self.completed.remove(&page);
        self.failed.insert(page, reason.into());
        self.updated_at = Utc::now();
    }

    /// Start a new run over this manifest.
    pub fn renew(&mut self) {
        self.run_id = Uuid::new_v4();
        self.updated_at = Utc::now();
    }
}
