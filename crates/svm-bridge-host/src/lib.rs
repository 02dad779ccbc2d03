//! SVM Bridge Host
//!
//! Lets host functions written as Rust closures be called as imports, both
//! by the native runtime and by Wasmtime guests.
//!
//! - [`Registry`]: process-wide, handle-keyed table of [`HostFunction`]s
//! - [`svm_trampoline`]: the C callback every native import points at
//! - [`ImportsBuilder`] / [`ImportTable`]: declaring imports and owning
//!   their registrations
//!
//! # Example
//!
//! ```ignore
//! use svm_bridge_core::{Value, ValueType};
//! use svm_bridge_host::ImportsBuilder;
//!
//! let mut imports = ImportsBuilder::new();
//! imports.register_function("add", &[ValueType::I32, ValueType::I32], &[ValueType::I32], |args| {
//!     match args {
//!         [Value::I32(a), Value::I32(b)] => Ok(vec![Value::I32(a + b)]),
//!         _ => anyhow::bail!("add expects two i32"),
//!     }
//! })?;
//! let table = imports.build_native(&library)?;
//! ```

pub mod error;
pub mod imports;
pub mod registry;
pub mod trampoline;

// Re-export main types
pub use error::{HostError, HostResult};
pub use imports::{DEFAULT_NAMESPACE, ImportEntry, ImportTable, ImportsBuilder};
pub use registry::{Handle, HostFunction, Registry, registry};
pub use trampoline::{FunctionEnv, svm_trampoline};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{HostError, HostResult};
    pub use crate::imports::{ImportTable, ImportsBuilder};
    pub use crate::registry::{Handle, registry};
}
