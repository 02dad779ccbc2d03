//! SVM Bridge Native
//!
//! Calls into the SVM runtime library through its C ABI.
//!
//! - [`NativeLibrary`]: the loaded library, its entry points and its
//!   allocator
//! - [`ffi`]: the raw C types and function signatures
//! - [`CallMessage`], [`SpawnMessage`]: the binary message encoding
//! - [`ImportsHandle`], [`StateKvHandle`], [`RuntimeHandle`]: native objects,
//!   destroyed by handing them back to the library
//!
//! Every input is copied into a caller-owned buffer for the duration of the
//! call. Outputs and error messages are copied out into `Vec`/`String` and
//! their native buffers destroyed before the call returns, on success and on
//! failure alike.
//!
//! # Example
//!
//! ```ignore
//! use svm_bridge_native::{DataLayout, NativeLibrary};
//!
//! let library = NativeLibrary::load("libsvm_runtime_c_api.so")?;
//! let template = library.encode_app_template(0, "counter", &wasm, &DataLayout::new(vec![4]))?;
//! ```

pub mod error;
pub mod ffi;
pub mod library;
pub mod message;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{NativeError, NativeResult};
pub use ffi::{NativeApi, SVM_FAILURE, SVM_SUCCESS, Status, SvmCallback, SvmEnv};
pub use message::{CallMessage, MAX_FIELD_LEN, SpawnMessage};
pub use library::{DataLayout, GasOptions, ImportsHandle, NativeLibrary, RuntimeHandle, StateKvHandle};
