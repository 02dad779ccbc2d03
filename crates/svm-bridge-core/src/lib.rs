//! SVM Bridge Core
//!
//! Leaf crate of the SVM bridge. It defines the pieces every boundary
//! crossing is built from:
//!
//! - [`Buffer`]: an owned byte region tagged with the [`Allocator`] that
//!   produced it, so it is always released by the right one
//! - [`Value`] / [`ValueType`]: host import arguments, results and their wire
//!   format
//! - [`Address`] and the receipt types decoded by the codec
//! - [`BridgeConfig`]: configuration shared by the other crates
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            svm-bridge (facade)          │
//! ├─────────────────────────────────────────┤
//! │              svm-bridge-host            │
//! ├────────────────────┬────────────────────┤
//! │  svm-bridge-codec  │  svm-bridge-native │
//! ├────────────────────┴────────────────────┤
//! │              svm-bridge-core            │
//! └─────────────────────────────────────────┘
//! ```

pub mod address;
pub mod buffer;
pub mod config;
pub mod error;
pub mod receipt;
pub mod value;

// Re-export main types at crate root
pub use address::{ADDRESS_LEN, Address, hex_bytes};
pub use buffer::{Allocator, AllocatorKind, Buffer, CALLER_ALLOCATOR, CallerAllocator, RawBuffer};
pub use config::{BridgeConfig, EngineConfig, GasConfig, GuestLimits, WASM_PAGE_SIZE};
pub use error::{
    AddressError, BufferError, BufferResult, ConfigError, ConfigResult, CoreError, Result,
    ValueError, ValueResult,
};
pub use receipt::{
    DeployTemplateReceipt, ExecAppReceipt, Receipt, ReceiptError, ReceiptErrorKind, ReceiptKind,
    SpawnAppReceipt,
};
pub use value::{Value, ValueType};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::address::Address;
    pub use crate::buffer::{Allocator, AllocatorKind, Buffer, CALLER_ALLOCATOR};
    pub use crate::config::{BridgeConfig, EngineConfig, GasConfig, GuestLimits};
    pub use crate::error::{BufferError, CoreError, Result};
    pub use crate::receipt::{Receipt, ReceiptError};
    pub use crate::value::{Value, ValueType};
}
