//! Native runtimes and the state stores behind them.

use std::sync::Arc;

use svm_bridge_host::ImportTable;
use svm_bridge_native::{GasOptions, NativeError, NativeLibrary, RuntimeHandle, StateKvHandle};
use tracing::info;
use uuid::Uuid;

use crate::error::{SvmError, SvmResult};

/// Unique identifier for a runtime instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(Uuid);

impl RuntimeId {
    /// Create a new random runtime ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuntimeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The library's in-memory state store.
#[derive(Debug)]
pub struct MemKvStore {
    library: Arc<NativeLibrary>,
    handle: Option<StateKvHandle>,
}

impl MemKvStore {
    pub(crate) fn new(library: &Arc<NativeLibrary>) -> SvmResult<Self> {
        let handle = library.memory_state_kv_create()?;
        Ok(Self {
            library: Arc::clone(library),
            handle: Some(handle),
        })
    }

    fn handle(&self) -> SvmResult<&StateKvHandle> {
        self.handle.as_ref().ok_or(SvmError::Native(NativeError::NullHandle {
            operation: "memory_state_kv_create",
        }))
    }
}

impl Drop for MemKvStore {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.library.state_kv_destroy(handle);
        }
    }
}

/// A native runtime together with everything it points at.
///
/// Owns its import table and state store. On drop the runtime is destroyed
/// first, then the imports, then the store. Operations take `&mut Runtime`,
/// so one runtime is never driven from two threads at once.
#[derive(Debug)]
pub struct Runtime {
    id: RuntimeId,
    gas: GasOptions,
    library: Arc<NativeLibrary>,
    handle: Option<RuntimeHandle>,
    // Field order is drop order.
    imports: ImportTable,
    kv: MemKvStore,
}

impl Runtime {
    pub(crate) fn new(
        library: &Arc<NativeLibrary>,
        imports: ImportTable,
        kv: MemKvStore,
        gas: GasOptions,
    ) -> SvmResult<Self> {
        let native_imports = imports.native_handle().ok_or(SvmError::NotNative)?;
        // SAFETY: the runtime owns `imports` and `kv` and destroys its handle
        // before either of them.
        let handle = unsafe { library.memory_runtime_create(kv.handle()?, native_imports) }?;

        let id = RuntimeId::new();
        info!(runtime_id = %id, imports = imports.len(), "Created runtime");

        Ok(Self {
            id,
            gas,
            library: Arc::clone(library),
            handle: Some(handle),
            imports,
            kv,
        })
    }

    /// The runtime's identifier.
    pub fn id(&self) -> RuntimeId {
        self.id
    }

    /// Gas options applied to deploy, spawn and exec.
    pub fn gas(&self) -> GasOptions {
        self.gas
    }

    /// Override the gas options.
    pub fn with_gas(mut self, gas: GasOptions) -> Self {
        self.gas = gas;
        self
    }

    /// The imports this runtime was created with.
    pub fn imports(&self) -> &ImportTable {
        &self.imports
    }

    /// The state store this runtime reads and writes.
    pub fn kv(&self) -> &MemKvStore {
        &self.kv
    }

    /// Destroy the runtime, then its imports, then its state store.
    pub fn destroy(self) {
        drop(self);
    }

    pub(crate) fn handle(&self) -> SvmResult<&RuntimeHandle> {
        self.handle.as_ref().ok_or(SvmError::Native(NativeError::NullHandle {
            operation: "memory_runtime_create",
        }))
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.library.runtime_destroy(handle);
        }
        info!(runtime_id = %self.id, "Destroyed runtime");
    }
}
