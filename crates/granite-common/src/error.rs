//! Error types for granite.

use thiserror::Error;

/// Result type alias using GraniteError.
pub type Result<T> = std::result::Result<T, GraniteError>;

/// Errors that can occur in granite operations.
#[derive(Debug, Error)]
pub enum GraniteError {
    // I/O and file store errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Page not found: {page_no}")]
    PageNotFound { page_no: u32 },

    #[error("Page {page_no} is not pinned")]
    PageNotPinned { page_no: u32 },

    #[error("Page {page_no} is still pinned")]
    PagePinned { page_no: u32 },

    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    // Relation errors
    #[error("Page full, unable to insert record")]
    PageFull,

    #[error("Record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("End of file reached")]
    EndOfFile,

    // Index errors
    #[error("Index metadata mismatch: {0}")]
    BadIndexInfo(String),

    #[error("Scan comparator out of the allowed set")]
    BadOpcodes,

    #[error("Bad scan range: low {low} > high {high}")]
    BadScanrange { low: i32, high: i32 },

    #[error("No key in the index satisfies the scan criteria")]
    NoSuchKeyFound,

    #[error("No scan has been initialized")]
    ScanNotInitialized,

    #[error("Index scan completed")]
    IndexScanCompleted,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: GraniteError = io_err.into();
        assert!(matches!(err, GraniteError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_pin_errors_display() {
        let err = GraniteError::PageNotPinned { page_no: 7 };
        assert_eq!(err.to_string(), "Page 7 is not pinned");

        let err = GraniteError::PagePinned { page_no: 3 };
        assert_eq!(err.to_string(), "Page 3 is still pinned");
    }

    #[test]
    fn test_buffer_pool_full_display() {
        let err = GraniteError::BufferPoolFull;
        assert_eq!(
            err.to_string(),
            "Buffer pool full, unable to allocate frame"
        );
    }

    #[test]
    fn test_record_errors_display() {
        let err = GraniteError::RecordTooLarge {
            size: 20000,
            max: 16352,
        };
        assert_eq!(err.to_string(), "Record too large: 20000 bytes (max 16352)");

        let err = GraniteError::PageFull;
        assert_eq!(err.to_string(), "Page full, unable to insert record");
    }

    #[test]
    fn test_index_errors_display() {
        let err = GraniteError::BadIndexInfo("attribute offset 4 != 0".to_string());
        assert_eq!(
            err.to_string(),
            "Index metadata mismatch: attribute offset 4 != 0"
        );

        let err = GraniteError::BadScanrange { low: 10, high: 5 };
        assert_eq!(err.to_string(), "Bad scan range: low 10 > high 5");

        assert_eq!(
            GraniteError::BadOpcodes.to_string(),
            "Scan comparator out of the allowed set"
        );
        assert_eq!(
            GraniteError::ScanNotInitialized.to_string(),
            "No scan has been initialized"
        );
        assert_eq!(
            GraniteError::IndexScanCompleted.to_string(),
            "Index scan completed"
        );
        assert_eq!(
            GraniteError::NoSuchKeyFound.to_string(),
            "No key in the index satisfies the scan criteria"
        );
    }

    #[test]
    fn test_file_not_found_display() {
        let err = GraniteError::FileNotFound("rel.0".to_string());
        assert_eq!(err.to_string(), "File not found: rel.0");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(GraniteError::EndOfFile)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GraniteError>();
    }
}
