// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Artifact naming, source fingerprinting and atomic writes.

use std::fs::File;
use std::io;
use std::path::Path;

use folio_core::error::Result;
use folio_core::types::OutputFormat;
use sha2::{Digest, Sha256};

/// File stem used for artifacts of `input`.
pub fn document_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// `<stem>_page_<NNNN>.<ext>`
pub fn page_artifact_name(stem: &str, page: u32, format: OutputFormat) -> String {
    format!("{stem}_page_{page:04}.{}", format.extension())
}

/// `<stem>.<ext>`
pub fn document_artifact_name(stem: &str, format: OutputFormat) -> String {
    format!("{stem}.{}", format.extension())
}

/// `<stem>.manifest.json`
pub fn manifest_name(stem: &str) -> String {
    format!("{stem}.manifest.json")
}

/// SHA-256 of a file's contents as lowercase hex, read in a streaming pass.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Write `contents` to a sibling temporary file, then rename it over `path`,
/// so readers never observe a half-written artifact.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names() {
        assert_eq!(page_artifact_name("scan", 7, OutputFormat::Text), "scan_page_0007.txt");
        assert_eq!(page_artifact_name("scan", 12345, OutputFormat::Xml), "scan_page_12345.xml");
        assert_eq!(document_artifact_name("scan", OutputFormat::Json), "scan.json");
        assert_eq!(manifest_name("scan"), "scan.manifest.json");
    }

    #[test]
    fn stem_of_input() {
        assert_eq!(document_stem(Path::new("/in/report.v2.pdf")), "report.v2");
        assert_eq!(document_stem(Path::new("/")), "document");
    }

    #[test]
    fn sha256_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("out.txt.tmp").exists());
    }
}
