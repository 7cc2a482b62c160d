//! Tesseract OCR bridge.
//!
//! Text extraction is delegated wholesale to the `tesseract` executable; this
//! module only spawns it and joins its output lines. English model by default.

use crate::backend::{OcrError, TextExtractor};
use std::path::Path;
use std::process::Command;

pub struct TesseractOcr {
    binary: String,
    lang: String,
}

impl TesseractOcr {
    pub fn new(lang: impl Into<String>) -> Self {
        Self {
            binary: "tesseract".into(),
            lang: lang.into(),
        }
    }

    /// Override the executable name (used by tests and non-standard installs).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl TextExtractor for TesseractOcr {
    fn extract_text(&self, image: &Path) -> Result<String, OcrError> {
        tracing::info!(image = %image.display(), lang = %self.lang, "running OCR");

        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.lang])
            .output()
            .map_err(|e| OcrError::ServiceFailed(format!("failed to launch {}: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(OcrError::ServiceFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(join_segments(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Join recognized lines into a single space-separated string, dropping
/// blank lines. Text within a line is left untouched.
fn join_segments(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
