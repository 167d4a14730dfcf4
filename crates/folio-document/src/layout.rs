// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reading-order reconstruction — groups detections into text lines by their
// vertical position.

use folio_core::types::Detection;
use tracing::{debug, instrument};

/// Default vertical tolerance, in pixels, for two detections to share a line.
pub const DEFAULT_LINE_TOLERANCE: f32 = 10.0;

/// Turns unordered detections into top-to-bottom text lines.
///
/// Detections are stably sorted by the y of their first vertex. Each line is
/// anchored at the y of its first member; a detection joins the current line
/// when it lies within `line_tolerance` of that anchor, otherwise it starts a
/// new one. Within a line, detections keep their sorted order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutReconstructor {
    pub line_tolerance: f32,
}

impl Default for LayoutReconstructor {
    fn default() -> Self {
        Self {
            line_tolerance: DEFAULT_LINE_TOLERANCE,
        }
    }
}

impl LayoutReconstructor {
    pub fn new(line_tolerance: f32) -> Self {
        Self { line_tolerance }
    }

    /// Reconstructed lines, each the member texts joined by single spaces.
    #[instrument(skip_all, fields(detections = detections.len()))]
    pub fn lines(&self, detections: &[Detection]) -> Vec<String> {
        let mut ordered: Vec<&Detection> = detections.iter().collect();
        ordered.sort_by(|a, b| a.top_y().total_cmp(&b.top_y()));

        let mut lines = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut anchor = 0.0f32;

        for detection in ordered {
            let y = detection.top_y();
            if current.is_empty() || (y - anchor).abs() > self.line_tolerance {
                if !current.is_empty() {
                    lines.push(current.join(" "));
                    current.clear();
                }
                anchor = y;
            }
            current.push(&detection.text);
        }
        if !current.is_empty() {
            lines.push(current.join(" "));
        }

        debug!(lines = lines.len(), "Lines reconstructed");
        lines
    }

    /// The whole page as one string, lines separated by `\n`.
    pub fn reconstruct(&self, detections: &[Detection]) -> String {
        self.lines(detections).join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(text: &str, x: f32, y: f32) -> Detection {
        Detection::new(
            text,
            0.9,
            [[x, y], [x + 20.0, y], [x + 20.0, y + 12.0], [x, y + 12.0]],
        )
    }

    #[test]
    fn clusters_by_vertical_tolerance() {
        let detections = vec![
            at("a", 0.0, 10.0),
            at("b", 30.0, 12.0),
            at("c", 60.0, 9.0),
            at("d", 0.0, 50.0),
            at("e", 30.0, 52.0),
        ];
        let lines = LayoutReconstructor::default().lines(&detections);
        assert_eq!(lines, vec!["c a b", "d e"]);
    }

    #[test]
    fn no_detections_no_lines() {
        let r = LayoutReconstructor::default();
        assert!(r.lines(&[]).is_empty());
        assert_eq!(r.reconstruct(&[]), "");
    }

    #[test]
    fn anchor_does_not_drift() {
        // Each step is within tolerance of the previous detection but the
        // third is too far from the line's first member.
        let detections = vec![at("x", 0.0, 0.0), at("y", 0.0, 8.0), at("z", 0.0, 16.0)];
        let lines = LayoutReconstructor::new(10.0).lines(&detections);
        assert_eq!(lines, vec!["x y", "z"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let detections = vec![at("first", 50.0, 5.0), at("second", 0.0, 5.0)];
        assert_eq!(
            LayoutReconstructor::default().reconstruct(&detections),
            "first second"
        );
    }

    #[test]
    fn zero_tolerance_splits_every_distinct_y() {
        let detections = vec![at("a", 0.0, 1.0), at("b", 0.0, 1.0), at("c", 0.0, 2.0)];
        let text = LayoutReconstructor::new(0.0).reconstruct(&detections);
        assert_eq!(text, "a b\nc");
    }

    #[test]
    fn output_is_reproducible() {
        let detections = vec![at("q", 0.0, 30.0), at("p", 0.0, 31.0), at("r", 0.0, 90.0)];
        let r = LayoutReconstructor::default();
        assert_eq!(r.reconstruct(&detections), r.reconstruct(&detections));
    }
}
