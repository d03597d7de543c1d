//! Error types for the Telchar extraction engine.
//!
//! This module provides structured error handling using thiserror. Every
//! per-stage failure in the pipeline is absorbed locally; nothing in this
//! crate propagates a panic across a public boundary.

use thiserror::Error;

/// Main error type for Telchar operations.
#[derive(Debug, Error)]
pub enum TelcharError {
    /// The input file does not exist. Fatal for that extraction call.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// No extractor matches the detected format; downstream stages are skipped.
    #[error("No suitable extractor for: {0}")]
    NoSuitableExtractor(String),

    /// The extractor exists but cannot handle this particular file.
    #[error("Unsupported format or platform: {0}")]
    Unsupported(String),

    /// Truncated or invalid binary content.
    #[error("Malformed binary: {0}")]
    MalformedBinary(String),

    /// Parse error with location information
    #[error("Parse error at offset {offset:#x}: {message}")]
    ParseError { offset: u64, message: String },

    /// DWARF decoding errors from the full (gimli-backed) decoder.
    #[error("DWARF error: {0}")]
    Dwarf(#[from] gimli::Error),

    /// Object-container parsing errors.
    #[error("Object parse error: {0}")]
    Object(#[from] object::Error),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors on the SBOM hand-off surface.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Telchar operations
pub type Result<T> = std::result::Result<T, TelcharError>;

impl TelcharError {
    /// Whether this error means "format/platform unsupported" rather than
    /// "parsed correctly, found nothing" or "input is broken". Callers use
    /// this to decide whether trying a fallback extractor is worthwhile.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            TelcharError::Unsupported(_) | TelcharError::NoSuitableExtractor(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelcharError::MalformedBinary("truncated section header".to_string());
        assert_eq!(err.to_string(), "Malformed binary: truncated section header");

        let err = TelcharError::ParseError {
            offset: 0x1234,
            message: "invalid load command size".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Parse error at offset 0x1234: invalid load command size"
        );
    }

    #[test]
    fn unsupported_is_distinguishable() {
        assert!(TelcharError::Unsupported("PE on this path".into()).is_unsupported());
        assert!(TelcharError::NoSuitableExtractor("x".into()).is_unsupported());
        assert!(!TelcharError::MalformedBinary("y".into()).is_unsupported());
    }
}
