// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output formatting — plain text, JSON and XML renderings of page results.

use std::io::Cursor;

use folio_core::error::{FolioError, Result};
use folio_core::types::{OutputFormat, PageResult, Quad};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Width of the `=` rules around a text page header.
const HEADER_RULE_WIDTH: usize = 40;

/// Presentation switches that do not change the data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// Precede each page of text output with a delimited `Page N` header.
    pub page_headers: bool,
}

/// Top-level JSON artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDocument {
    pub pages: Vec<JsonPage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPage {
    pub page_number: u32,
    pub content: Vec<JsonContent>,
}

/// One detection as it appears in JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonContent {
    pub text: String,
    pub confidence: f32,
    /// Polygon vertices, top-left first, clockwise.
    pub bounding_box: Quad,
}

/// Render `pages` in `format`, ascending by page number.
///
/// The input is not reordered in place. Text output uses the reconstructed
/// lines; JSON and XML list every raw detection.
#[instrument(skip(pages, options), fields(pages = pages.len()))]
pub fn format_pages(
    pages: &[PageResult],
    format: OutputFormat,
    options: &FormatOptions,
) -> Result<String> {
    let mut ordered: Vec<&PageResult> = pages.iter().collect();
    ordered.sort_by_key(|page| page.page_number);

    let output = match format {
        OutputFormat::Text => to_text(&ordered, options),
        OutputFormat::Json => to_json(&ordered)?,
        OutputFormat::Xml => to_xml(&ordered)?,
    };
    debug!(bytes = output.len(), "Pages formatted");
    Ok(output)
}

/// Convenience for a single page.
pub fn format_page(page: &PageResult, format: OutputFormat, options: &FormatOptions) -> Result<String> {
    format_pages(std::slice::from_ref(page), format, options)
}

/// The delimited header placed before a page in text output.
pub fn page_header(page_number: u32) -> String {
    let rule = "=".repeat(HEADER_RULE_WIDTH);
    format!("\n{rule}\nPage {page_number}\n{rule}\n")
}

fn to_text(pages: &[&PageResult], options: &FormatOptions) -> String {
    let mut out = String::new();
    for page in pages {
        if options.page_headers {
            out.push_str(&page_header(page.page_number));
        }
        if !page.lines.is_empty() {
            out.push_str(&page.lines.join("\n"));
            out.push('\n');
        }
    }
    out
}

fn to_json(pages: &[&PageResult]) -> Result<String> {
    let document = JsonDocument {
        pages: pages
            .iter()
            .map(|page| JsonPage {
                page_number: page.page_number,
                content: page
                    .detections
                    .iter()
                    .map(|d| JsonContent {
                        text: d.text.clone(),
                        confidence: d.confidence,
                        bounding_box: d.polygon,
                    })
                    .collect(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&document)
        .map_err(|err| FolioError::Formatting(format!("JSON serialization failed: {}", err)))
}

fn to_xml(pages: &[&PageResult]) -> Result<String> {
    let xml_err = |err: quick_xml::Error| FolioError::Formatting(format!("XML writer failed: {}", err));
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Start(BytesStart::new("document")))
        .map_err(xml_err)?;
    for page in pages {
        let number = page.page_number.to_string();
        let mut page_elem = BytesStart::new("page");
        page_elem.push_attribute(("number", number.as_str()));
        writer.write_event(Event::Start(page_elem)).map_err(xml_err)?;

        for detection in &page.detections {
            let (x1, y1, x2, y2) = detection.bounding_rect();
            let confidence = detection.confidence.to_string();
            let bbox = format!("{x1},{y1},{x2},{y2}");
            let mut text_elem = BytesStart::new("text");
            text_elem.push_attribute(("confidence", confidence.as_str()));
            text_elem.push_attribute(("bbox", bbox.as_str()));
            writer.write_event(Event::Start(text_elem)).map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(&detection.text)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("text")))
                .map_err(xml_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("page")))
            .map_err(xml_err)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("document")))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|err| FolioError::Formatting(format!("XML output is not UTF-8: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutReconstructor;
    use folio_core::types::Detection;

    fn det(text: &str, confidence: f32, x: f32, y: f32) -> Detection {
        Detection::new(
            text,
            confidence,
            [[x, y], [x + 10.0, y], [x + 10.0, y + 5.0], [x, y + 5.0]],
        )
    }

    fn page(number: u32, detections: Vec<Detection>) -> PageResult {
        let lines = LayoutReconstructor::default().lines(&detections);
        PageResult {
            page_number: number,
            detections,
            lines,
        }
    }

    fn sample() -> Vec<PageResult> {
        vec![
            page(2, vec![det("second", 0.5, 0.0, 0.0)]),
            page(
                1,
                vec![
                    det("world", 0.9, 40.0, 11.0),
                    det("hello", 0.95, 0.0, 10.0),
                    det("bye", 0.7, 0.0, 60.0),
                ],
            ),
        ]
    }

    #[test]
    fn text_orders_pages_and_lines() {
        let out = format_pages(&sample(), OutputFormat::Text, &FormatOptions::default()).unwrap();
        assert_eq!(out, "hello world\nbye\nsecond\n");
    }

    #[test]
    fn text_line_count_matches_reconstruction() {
        let pages = sample();
        let out = format_pages(&pages, OutputFormat::Text, &FormatOptions::default()).unwrap();
        let expected: usize = pages.iter().map(|p| p.lines.len()).sum();
        assert_eq!(out.lines().count(), expected);
    }

    #[test]
    fn text_headers() {
        let options = FormatOptions { page_headers: true };
        let out = format_pages(&sample()[..1], OutputFormat::Text, &options).unwrap();
        let rule = "=".repeat(40);
        assert_eq!(out, format!("\n{rule}\nPage 2\n{rule}\nsecond\n"));
    }

    #[test]
    fn json_round_trip() {
        let pages = vec![page(
            3,
            vec![det("alpha", 0.25, 1.0, 2.0), det("beta", 0.75, 5.0, 40.0)],
        )];
        let out = format_pages(&pages, OutputFormat::Json, &FormatOptions::default()).unwrap();
        let parsed: JsonDocument = serde_json::from_str(&out).unwrap();

        assert_eq!(parsed.pages.len(), 1);
        assert_eq!(parsed.pages[0].page_number, 3);
        let content = &parsed.pages[0].content;
        assert_eq!(content[0].text, "alpha");
        assert_eq!(content[0].confidence, 0.25);
        assert_eq!(content[1].text, "beta");
        assert_eq!(content[1].confidence, 0.75);
        assert_eq!(content[0].bounding_box[0], [1.0, 2.0]);
        // Pretty-printed with two-space indentation.
        assert!(out.contains("\n  \"pages\""));
    }

    #[test]
    fn xml_structure_and_escaping() {
        let pages = vec![page(1, vec![det("a < b & c", 0.5, 1.0, 2.0)])];
        let out = format_pages(&pages, OutputFormat::Xml, &FormatOptions::default()).unwrap();

        assert!(out.starts_with("<document>"));
        assert!(out.contains(r#"<page number="1">"#));
        assert!(out.contains(r#"<text confidence="0.5" bbox="1,2,11,7">"#));
        assert!(out.contains("a &lt; b &amp; c"));
        assert!(out.trim_end().ends_with("</document>"));
    }

    #[test]
    fn empty_pages_produce_valid_artifacts() {
        let pages = vec![page(1, Vec::new())];
        let options = FormatOptions::default();

        assert_eq!(format_pages(&pages, OutputFormat::Text, &options).unwrap(), "");

        let json = format_pages(&pages, OutputFormat::Json, &options).unwrap();
        let parsed: JsonDocument = serde_json::from_str(&json).unwrap();
        assert!(parsed.pages[0].content.is_empty());

        let xml = format_pages(&pages, OutputFormat::Xml, &options).unwrap();
        assert!(xml.contains(r#"<page number="1">"#));
        assert!(!xml.contains("<text"));
    }

    #[test]
    fn no_pages_at_all() {
        let options = FormatOptions::default();
        assert_eq!(format_pages(&[], OutputFormat::Text, &options).unwrap(), "");
        let json = format_pages(&[], OutputFormat::Json, &options).unwrap();
        assert_eq!(serde_json::from_str::<JsonDocument>(&json).unwrap().pages.len(), 0);
        let xml = format_pages(&[], OutputFormat::Xml, &options).unwrap();
        assert!(xml.contains("<document>"));
    }

    #[test]
    fn input_is_not_reordered() {
        let pages = sample();
        let _ = format_pages(&pages, OutputFormat::Json, &FormatOptions::default()).unwrap();
        assert_eq!(pages[0].page_number, 2);
    }
}
