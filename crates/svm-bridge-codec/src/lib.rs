//! SVM Bridge Codec
//!
//! Drives the SVM codec, a WebAssembly module that encodes transactions and
//! decodes receipts, through its buffer protocol.
//!
//! - [`CodecEngine`]: Wasmtime engine configured for the codec
//! - [`ModuleLoader`] / [`CodecModule`]: loading and export validation
//! - [`GuestInstance`]: one instantiation and the raw buffer protocol
//! - [`Codec`]: the typed operations, each run in a fresh instance
//!
//! # Example
//!
//! ```ignore
//! use svm_bridge_codec::Codec;
//! use svm_bridge_core::BridgeConfig;
//!
//! let codec = Codec::from_file("svm_codec.wasm", &BridgeConfig::default())?;
//! let receipt = codec.decode_deploy_template_receipt(&raw_receipt)?;
//! println!("template deployed at {}", receipt.template_addr);
//! ```

pub mod codec;
pub mod engine;
pub mod error;
pub mod guest;
pub mod module;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use codec::{CallData, Codec};
pub use engine::{CodecEngine, IntoShared, SharedEngine};
pub use error::{
    CodecError, CodecResult, EngineError, EngineResult, GuestError, GuestResult, ModuleError,
    ModuleResult, TrapInfo,
};
pub use guest::{ERR_MARKER, GuestBuffer, GuestInstance, GuestPtr, OK_MARKER, parse_response};
pub use module::{CodecModule, ExportInfo, ExportKind, ModuleLoader};
