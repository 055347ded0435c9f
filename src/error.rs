//! Error types for the PDF reader.
//!
//! Document-level failures (no trailer, bad `/Encrypt`, unreadable file) are
//! returned to the caller of `open`/`unlock`. Per-object failures are logged
//! and degraded to `Object::Null` at the point of use, so most of these
//! variants never reach a caller of the value accessors.

/// Result type alias for PDF reader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading a PDF.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)] // "Invalid" prefix is intentional for clarity
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: u64,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table: {0}")]
    InvalidXref(String),

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Unexpected end of file
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported feature (JBIG2, 1-bit TIFF predictor, ...)
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Invalid or unusable `/Encrypt` dictionary
    #[error("Invalid encryption: {0}")]
    InvalidEncryption(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),
}

impl Error {
    /// Shorthand for a [`Error::ParseError`] at `offset`.
    pub(crate) fn parse(offset: u64, reason: impl Into<String>) -> Self {
        Error::ParseError {
            offset,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;

    #[test]
    fn test_invalid_header_error() {
        let err = Error::InvalidHeader("NotAPDF".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid PDF header"));
        assert!(msg.contains("NotAPDF"));
    }

    #[test]
    fn test_parse_error_helper() {
        let err = Error::parse(1234, "invalid token");
        let msg = format!("{}", err);
        assert!(msg.contains("1234"));
        assert!(msg.contains("invalid token"));
    }

    #[test]
    fn test_object_not_found_error() {
        let err = Error::ObjectNotFound(10, 0);
        assert!(err.to_string().contains("10 0 R"));
    }

    #[test]
    fn test_invalid_xref_error() {
        let err = Error::InvalidXref("startxref not found".to_string());
        assert!(err.to_string().contains("startxref not found"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        let msg = format!("{}", err);
        assert!(msg.contains("IO error"));
    }

    #[test]
    fn test_circular_reference_error() {
        let err = Error::CircularReference(ObjectRef::new(7, 0));
        assert!(err.to_string().contains("7 0 R"));
    }

    #[test]
    fn test_unsupported_filter_error() {
        let err = Error::UnsupportedFilter("Crypt/StdCF".to_string());
        assert!(err.to_string().contains("StdCF"));
    }
}
