//! Error types for the codec crate.
//!
//! Protocol violations by the guest (a lying allocator, out-of-bounds
//! buffers, bad markers, payloads of the wrong shape) are fatal: the guest
//! can no longer be trusted. Domain errors and traps are recoverable.

use svm_bridge_core::{ReceiptError, ReceiptKind};
use thiserror::Error;

/// Top-level error type for codec operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Error creating the engine.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Error loading or validating the codec module.
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    /// Error during a guest call.
    #[error("Guest error: {0}")]
    Guest(#[from] GuestError),

    /// The decoded receipt reports a failed operation.
    #[error("Receipt error: {0}")]
    Receipt(#[from] ReceiptError),

    /// The receipt decoded to a different kind than the caller asked for.
    #[error("Unexpected receipt: expected {expected}, found {found}")]
    UnexpectedReceipt {
        /// The kind the caller asked for.
        expected: ReceiptKind,
        /// The kind that was decoded.
        found: ReceiptKind,
    },
}

impl CodecError {
    /// Whether this error is a guest protocol violation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Guest(err) if err.is_fatal())
    }
}

/// Errors during engine creation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid engine configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Underlying Wasmtime error.
    #[error("Wasmtime error: {0}")]
    Wasmtime(#[from] wasmtime::Error),
}

/// Errors loading and validating the codec module.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The WASM module is invalid or malformed.
    #[error("Invalid WASM module: {0}")]
    Invalid(String),

    /// IO error reading the module.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A required export is missing.
    #[error("Missing required export '{0}'")]
    MissingExport(String),

    /// A required export has the wrong type.
    #[error("Export '{name}' has the wrong type: expected {expected}")]
    InvalidExport {
        /// Export name.
        name: String,
        /// Expected type.
        expected: &'static str,
    },

    /// Underlying Wasmtime error.
    #[error("Wasmtime error: {0}")]
    Wasmtime(#[from] wasmtime::Error),
}

/// Errors in the guest buffer protocol.
#[derive(Debug, Error)]
pub enum GuestError {
    /// `wasm_alloc` returned a buffer of a different length than requested.
    #[error("Allocated buffer size mismatch: requested {requested}, allocated {allocated}")]
    AllocationSizeMismatch {
        /// Bytes requested.
        requested: u32,
        /// Length reported by the guest.
        allocated: u32,
    },

    /// A guest buffer lies outside linear memory.
    #[error("Guest buffer out of bounds: offset {offset}, length {length}, memory size {memory_size}")]
    MemoryOutOfBounds {
        /// Data offset reported by the guest.
        offset: u32,
        /// Buffer length.
        length: u32,
        /// Current linear memory size in bytes.
        memory_size: usize,
    },

    /// The response marker byte is neither Ok nor Err.
    #[error("Invalid response marker: {0}")]
    InvalidMarker(u8),

    /// The response has no marker byte.
    #[error("Empty response from guest")]
    EmptyResponse,

    /// The request does not fit a guest buffer.
    #[error("Request of {0} bytes is too large for the guest")]
    RequestTooLarge(usize),

    /// The request could not be serialized.
    #[error("Failed to serialize request: {0}")]
    MalformedRequest(String),

    /// The guest trapped.
    #[error("Guest trap: {0}")]
    Trap(TrapInfo),

    /// The guest answered with an error marker.
    #[error("{0}")]
    Domain(String),

    /// The response payload does not have the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// An export the call needs is missing.
    #[error("Missing export '{0}'")]
    MissingExport(String),

    /// Underlying Wasmtime error.
    #[error("Wasmtime error: {0}")]
    Wasmtime(#[from] wasmtime::Error),
}

impl GuestError {
    /// Whether the guest violated the buffer protocol or answered with a
    /// payload that cannot be decoded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AllocationSizeMismatch { .. }
                | Self::MemoryOutOfBounds { .. }
                | Self::InvalidMarker(_)
                | Self::EmptyResponse
                | Self::MalformedResponse(_)
        )
    }
}

/// Information about a guest trap.
#[derive(Debug, Clone)]
pub struct TrapInfo {
    /// The trap code name, if available.
    pub code: Option<String>,
    /// Human-readable trap message.
    pub message: String,
}

impl std::fmt::Display for TrapInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "[{}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl From<wasmtime::Trap> for TrapInfo {
    fn from(trap: wasmtime::Trap) -> Self {
        Self {
            code: Some(format!("{trap:?}")),
            message: trap.to_string(),
        }
    }
}

/// Result type alias for codec operations.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Result type alias for engine creation.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Result type alias for module loading.
pub type ModuleResult<T> = std::result::Result<T, ModuleError>;

/// Result type alias for guest calls.
pub type GuestResult<T> = std::result::Result<T, GuestError>;
