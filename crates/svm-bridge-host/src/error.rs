//! Error types for host functions.

use svm_bridge_core::{BufferError, ValueError};
use svm_bridge_native::NativeError;
use thiserror::Error;

use crate::registry::Handle;

/// Errors related to host functions.
#[derive(Debug, Error)]
pub enum HostError {
    /// No function is registered under the handle.
    #[error("Host function handle not found: {0}")]
    HandleNotFound(Handle),

    /// Arguments or results do not match the declared signature.
    #[error("Signature mismatch for {direction} of '{function}': expected ({expected}), got ({found})")]
    SignatureMismatch {
        /// Qualified function name.
        function: String,
        /// `arguments` or `results`.
        direction: &'static str,
        /// Declared types.
        expected: String,
        /// Actual types.
        found: String,
    },

    /// Function already registered.
    #[error("Function already registered: {namespace}::{name}")]
    AlreadyRegistered {
        /// The import namespace.
        namespace: String,
        /// The function name.
        name: String,
    },

    /// The host function returned an error.
    #[error("Host function '{function}' failed: {error:#}")]
    Callback {
        /// Qualified function name.
        function: String,
        /// The closure's error.
        error: anyhow::Error,
    },

    /// The host function panicked.
    #[error("Host function panicked: {0}")]
    Panic(String),

    /// A guest passed a value type host functions do not accept.
    #[error("Unsupported value type: {0}")]
    UnsupportedType(String),

    /// More imports than the native library can address.
    #[error("Too many imports: {0} does not fit in a u32")]
    TooManyImports(usize),

    /// A result buffer could not be allocated.
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Native library call failed.
    #[error("Native error: {0}")]
    Native(#[from] NativeError),

    /// Argument or result encoding failed.
    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    /// Underlying Wasmtime error.
    #[error("Wasmtime error: {0}")]
    Wasmtime(#[from] wasmtime::Error),
}

/// Result type for host operations.
pub type HostResult<T> = std::result::Result<T, HostError>;
