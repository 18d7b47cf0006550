//! Error type shared by every recording and flushing operation.
//!
//! All fallible operations in this crate return [`Result`], so a flush
//! orchestrator can treat a failure from any part the same way: abort the
//! chunk, retry with freshly computed headers, or report it.
//!
//! # Example
//!
//! ```rust
//! use tracciato::error::{Result, TraceError};
//!
//! fn check(expected: usize, actual: usize) -> Result<()> {
//!     if expected != actual {
//!         return Err(TraceError::StringTableMismatch { expected, actual });
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(4, 4).is_ok());
//! assert!(check(4, 6).unwrap_err().is_size_mismatch());
//! ```

use thiserror::Error;

/// Unified error type for recording, serialization and decoding.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The string table no longer matches the length committed to its part header.
    #[error("string table size mismatch: committed {expected} bytes, table holds {actual}")]
    StringTableMismatch {
        /// Length recorded by `populate_header`.
        expected: usize,
        /// Length the table produced (or would have produced) at write time.
        actual: usize,
    },

    /// The event chain ran out of published words before the committed length.
    #[error("event log size mismatch: committed {expected} words, only {available} reachable")]
    EventLogMismatch {
        /// Word count derived from the part header.
        expected: usize,
        /// Words actually reachable through the chunk chain.
        available: usize,
    },

    /// A part payload does not fit the 32-bit length field of the wire format.
    #[error("part payload of {length} bytes exceeds the u32 length field")]
    PartTooLarge {
        /// Raw payload length in bytes.
        length: usize,
    },

    /// A single record asked for more slots than one chunk can hold.
    #[error("record of {requested} words exceeds chunk capacity of {capacity} words")]
    RecordTooLarge {
        /// Words requested by the producer.
        requested: usize,
        /// Fixed chunk capacity in words.
        capacity: usize,
    },

    /// A string passed for interning contains a NUL byte.
    #[error("string {value:?} contains a NUL byte at index {position}")]
    InteriorNul {
        /// The rejected string.
        value: String,
        /// Byte index of the first NUL.
        position: usize,
    },

    /// A trace byte stream could not be decoded.
    #[error("malformed trace: {0}")]
    Malformed(String),

    /// Error from the underlying output sink.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Error rendering a summary as JSON.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error moving a finished temporary trace file into place.
    #[error("persist error: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl TraceError {
    /// Returns `true` for the size-mismatch family of errors.
    ///
    /// These are the errors a flush may recover from by recomputing headers
    /// and writing the chunk again.
    pub fn is_size_mismatch(&self) -> bool {
        matches!(
            self,
            TraceError::StringTableMismatch { .. } | TraceError::EventLogMismatch { .. }
        )
    }
}

/// Result type for trace operations.
pub type Result<T> = std::result::Result<T, TraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_size_mismatch() {
        let err = TraceError::EventLogMismatch {
            expected: 10,
            available: 4,
        };
        assert!(err.is_size_mismatch());
        assert!(!TraceError::Malformed("short".into()).is_size_mismatch());
        assert!(!TraceError::PartTooLarge { length: 1 }.is_size_mismatch());
    }

    #[test]
    fn test_display() {
        let err = TraceError::RecordTooLarge {
            requested: 300,
            capacity: 256,
        };
        assert_eq!(
            err.to_string(),
            "record of 300 words exceeds chunk capacity of 256 words"
        );
    }

    #[test]
    fn test_interior_nul_display() {
        let err = TraceError::InteriorNul {
            value: "a\0b".into(),
            position: 1,
        };
        assert_eq!(
            err.to_string(),
            "string \"a\\0b\" contains a NUL byte at index 1"
        );
        assert!(!err.is_size_mismatch());
    }

    #[test]
    fn test_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::WriteZero, "full");
        let err: TraceError = io.into();
        assert!(matches!(err, TraceError::Io(_)));
    }
}
