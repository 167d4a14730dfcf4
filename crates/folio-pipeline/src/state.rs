// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-page lifecycle and the reports handed back to callers.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Processing stages a page moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Rasterizing,
    Preprocessing,
    Detecting,
    Reconstructing,
    Formatting,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rasterizing => "rasterizing",
            Self::Preprocessing => "preprocessing",
            Self::Detecting => "detecting",
            Self::Reconstructing => "reconstructing",
            Self::Formatting => "formatting",
            Self::Persisting => "persisting",
        })
    }
}

/// Lifecycle state of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    NotStarted,
    Running(Stage),
    /// Output written to the given artifact.
    Persisted(PathBuf),
    /// Terminal for this page only.
    Failed { stage: Stage, reason: String },
    /// An earlier run already produced this artifact.
    Skipped { artifact: PathBuf },
}

impl PageState {
    /// Whether the page may move into `stage`: from `NotStarted` only into
    /// rasterizing, from a running stage only forward.
    pub fn can_enter(&self, stage: Stage) -> bool {
        match self {
            Self::NotStarted => stage == Stage::Rasterizing,
            Self::Running(current) => stage > *current,
            _ => false,
        }
    }

    /// Move into `stage`. Out-of-order transitions are ignored.
    pub fn enter(&mut self, stage: Stage) {
        debug_assert!(self.can_enter(stage), "{self:?} cannot enter {stage}");
        if self.can_enter(stage) {
            *self = Self::Running(stage);
        }
    }

    /// Fail at the current stage.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let stage = self.stage().unwrap_or(Stage::Rasterizing);
        *self = Self::Failed {
            stage,
            reason: reason.into(),
        };
    }

    pub fn persist(&mut self, artifact: PathBuf) {
        *self = Self::Persisted(artifact);
    }

    /// The stage the page is in or failed at.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Running(stage) | Self::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Persisted(_) | Self::Failed { .. } | Self::Skipped { .. }
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Artifact holding this page's output, if there is one.
    pub fn artifact(&self) -> Option<&PathBuf> {
        match self {
            Self::Persisted(path) | Self::Skipped { artifact: path } => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub page: u32,
    pub state: PageState,
}

/// Outcome of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub source: PathBuf,
    /// Nothing was done because a previous run already completed the document.
    pub skipped: bool,
    /// One entry per selected page, ascending.
    pub pages: Vec<PageReport>,
}

impl DocumentReport {
    pub fn succeeded(&self) -> usize {
        self.pages.iter().filter(|p| p.state.artifact().is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.pages.iter().filter(|p| p.state.is_failed()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Distinct artifacts behind the successful pages, in page order.
    pub fn artifacts(&self) -> Vec<&PathBuf> {
        let mut out: Vec<&PathBuf> = Vec::new();
        for path in self.pages.iter().filter_map(|p| p.state.artifact()) {
            if !out.contains(&path) {
                out.push(path);
            }
        }
        out
    }
}
