//! Core error types for the SVM bridge.
//!
//! Every boundary crossing funnels its failures through a handful of
//! primitives defined here. Higher-level crates wrap these with `#[from]`.

use thiserror::Error;

use crate::buffer::AllocatorKind;

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Buffer allocation or ownership error.
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Value encoding or decoding error.
    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    /// Address parsing error.
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from allocating or adopting buffers.
#[derive(Debug, Error)]
pub enum BufferError {
    /// The allocator rejected the request.
    #[error("{allocator} allocator failed to allocate {size} bytes")]
    AllocationFailed {
        /// The allocator that was asked.
        allocator: AllocatorKind,
        /// Requested size in bytes.
        size: usize,
    },

    /// A foreign buffer declared more bytes than it has room for.
    #[error("Buffer length {length} exceeds capacity {capacity}")]
    LengthExceedsCapacity {
        /// Declared length.
        length: u32,
        /// Allocated capacity.
        capacity: u32,
    },
}

/// Errors in the host-import value wire format.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    /// Unknown value type tag.
    #[error("Unknown value type tag: {0:#04x}")]
    UnknownType(u8),

    /// Input ended before the declared data.
    #[error("Truncated value data: needed {needed} more bytes")]
    Truncated {
        /// Bytes missing.
        needed: usize,
    },

    /// Bytes left over after the declared values.
    #[error("{0} trailing bytes after values")]
    TrailingBytes(usize),

    /// Too many values to fit the one-byte count.
    #[error("Too many values: {0} (max 255)")]
    TooMany(usize),
}

/// Errors constructing an [`Address`](crate::Address).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// Wrong number of bytes.
    #[error("Invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),

    /// Not a hex string.
    #[error("Invalid hex address: {0}")]
    InvalidHex(String),
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading the configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML document could not be parsed.
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Result type alias for buffer operations.
pub type BufferResult<T> = std::result::Result<T, BufferError>;

/// Result type alias for value codec operations.
pub type ValueResult<T> = std::result::Result<T, ValueError>;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
