//! File text extraction. Only text-bearing formats are read; scanned or
//! binary formats yield nothing and are left for a later content backfill.

use casefile_core::{Error, Result};
use std::path::Path;
use tracing::warn;

/// File types the ingester recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    PlainText,
    Markdown,
    Csv,
    Json,
    Html,
    Email,
    Pdf,
    Image,
    Unknown,
}

impl FileType {
    /// Detect file type from extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "txt" | "text" | "log" => Self::PlainText,
            "md" | "markdown" => Self::Markdown,
            "csv" | "tsv" => Self::Csv,
            "json" => Self::Json,
            "html" | "htm" | "xml" => Self::Html,
            "eml" | "mbox" => Self::Email,
            "pdf" => Self::Pdf,
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "gif" | "bmp" => Self::Image,
            _ => Self::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::from_extension(path.extension().and_then(|e| e.to_str()).unwrap_or(""))
    }

    /// Check if this is a text-based file type.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            Self::PlainText | Self::Markdown | Self::Csv | Self::Json | Self::Html | Self::Email
        )
    }
}

/// Extract text content from a file. `Ok(None)` means the file holds no
/// readable text.
pub fn extract_text(path: &Path) -> Result<Option<String>> {
    match FileType::from_path(path) {
        FileType::Json => extract_json(path),
        t if t.is_text() => Ok(Some(std::fs::read_to_string(path).map_err(Error::Io)?)),
        FileType::Pdf | FileType::Image => {
            warn!("No text layer extracted from {}; backfill content later", path.display());
            Ok(None)
        }
        _ => match std::fs::read(path) {
            Ok(bytes) => Ok(decode_if_text(&bytes)),
            Err(e) => Err(Error::Io(e)),
        },
    }
}

/// Decode bytes as UTF-8 text unless they look binary.
pub fn decode_if_text(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    let control = text
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        .count();
    if control > text.len() / 10 {
        None
    } else {
        Some(text.to_string())
    }
}

/// JSON is flattened to its string values so that keys and punctuation do
/// not show up as entities.
fn extract_json(path: &Path) -> Result<Option<String>> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) else {
        return Ok(Some(content));
    };
    let mut texts = Vec::new();
    collect_strings(&value, &mut texts);
    if texts.is_empty() {
        Ok(Some(content))
    } else {
        Ok(Some(texts.join("\n")))
    }
}

fn collect_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_types() {
        assert_eq!(FileType::from_extension("TXT"), FileType::PlainText);
        assert_eq!(FileType::from_extension("eml"), FileType::Email);
        assert!(!FileType::Pdf.is_text());
        assert!(FileType::Csv.is_text());
    }

    #[test]
    fn test_extract_text_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("memo.txt");
        std::fs::write(&txt, "Meeting with Alice Smith").unwrap();
        assert_eq!(extract_text(&txt).unwrap().as_deref(), Some("Meeting with Alice Smith"));

        let json = dir.path().join("export.json");
        std::fs::write(&json, r#"{"from": "Bob Jones", "items": [{"note": "Paid Acme Holdings"}, 3]}"#).unwrap();
        let text = extract_text(&json).unwrap().unwrap();
        assert!(text.contains("Bob Jones"));
        assert!(text.contains("Paid Acme Holdings"));
        assert!(!text.contains("items"));
    }

    #[test]
    fn test_pdf_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("scan.pdf");
        std::fs::write(&pdf, b"%PDF-1.4 binary").unwrap();
        assert!(extract_text(&pdf).unwrap().is_none());
    }

    #[test]
    fn test_binary_detection() {
        assert!(decode_if_text(&[0u8, 1, 2, 3, 4, 5]).is_none());
        assert!(decode_if_text(&[0xff, 0xfe]).is_none());
        assert_eq!(decode_if_text(b"plain").as_deref(), Some("plain"));
    }
}
