// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// folio-pipeline — drives documents through rasterize → preprocess → detect →
// reconstruct → format → persist, tracking every page and skipping work a
// previous run already finished.

pub mod artifact;
pub mod manifest;
pub mod pipeline;
pub mod state;

pub use manifest::Manifest;
pub use pipeline::Pipeline;
pub use state::{DocumentReport, PageReport, PageState, Stage};
