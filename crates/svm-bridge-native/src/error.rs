//! Error types for native library calls.

use std::path::PathBuf;

use svm_bridge_core::BufferError;
use thiserror::Error;

/// Errors from loading or calling the runtime library.
#[derive(Debug, Error)]
pub enum NativeError {
    /// The shared library could not be opened.
    #[error("Failed to load native library {}: {source}", .path.display())]
    Load {
        /// Library path.
        path: PathBuf,
        /// Loader error.
        source: libloading::Error,
    },

    /// The library lacks an entry point.
    #[error("Missing native symbol '{symbol}': {source}")]
    MissingSymbol {
        /// Symbol name.
        symbol: &'static str,
        /// Loader error.
        source: libloading::Error,
    },

    /// An entry point returned a failure status.
    #[error("{operation} failed: {message}")]
    Status {
        /// The entry point.
        operation: &'static str,
        /// Message taken from the error slot.
        message: String,
    },

    /// An entry point reported success without producing a handle.
    #[error("{operation} returned a null handle")]
    NullHandle {
        /// The entry point.
        operation: &'static str,
    },

    /// A message field is longer than its one-byte length prefix allows.
    #[error("Message field '{field}' is {length} bytes (max 255)")]
    MessageTooLong {
        /// The field.
        field: &'static str,
        /// Its length.
        length: usize,
    },

    /// Buffer allocation or adoption failed.
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
}

/// Result type alias for native operations.
pub type NativeResult<T> = std::result::Result<T, NativeError>;
