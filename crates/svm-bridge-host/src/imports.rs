//! Declaring host imports and handing them to a runtime.
//!
//! [`ImportsBuilder`] collects host functions. Building registers each one
//! in the process-wide [`registry`](crate::registry()) and yields an
//! [`ImportTable`] that owns the registrations: dropping the table
//! unregisters them, after which their handles fail with
//! [`HostError::HandleNotFound`].

use std::sync::Arc;

use svm_bridge_core::{Value, ValueType};
use svm_bridge_native::{ImportsHandle, NativeLibrary};
use tracing::{debug, info};
use wasmtime::{FuncType, Linker, Val, ValType};

use crate::error::{HostError, HostResult};
use crate::registry::{Handle, HostFunction, registry};
use crate::trampoline::{FunctionEnv, svm_trampoline};

/// Namespace used until [`ImportsBuilder::namespace`] is called.
pub const DEFAULT_NAMESPACE: &str = "host";

/// Builder for an [`ImportTable`].
#[derive(Debug)]
pub struct ImportsBuilder {
    namespace: String,
    functions: Vec<HostFunction>,
}

impl ImportsBuilder {
    /// Create an empty builder in the default namespace.
    pub fn new() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            functions: Vec::new(),
        }
    }

    /// Set the namespace for functions registered after this call.
    pub fn namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
        self.namespace = namespace.into();
        self
    }

    /// Declare a host function.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::AlreadyRegistered`] if `namespace::name` was
    /// already declared on this builder.
    pub fn register_function<F>(
        &mut self,
        name: &str,
        params: &[ValueType],
        returns: &[ValueType],
        func: F,
    ) -> HostResult<&mut Self>
    where
        F: Fn(&[Value]) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        if self.is_registered(&self.namespace, name) {
            return Err(HostError::AlreadyRegistered {
                namespace: self.namespace.clone(),
                name: name.to_string(),
            });
        }

        self.functions.push(HostFunction::new(
            self.namespace.clone(),
            name,
            params.to_vec(),
            returns.to_vec(),
            func,
        ));
        Ok(self)
    }

    /// Check if a function is already declared.
    pub fn is_registered(&self, namespace: &str, name: &str) -> bool {
        self.functions
            .iter()
            .any(|f| f.namespace() == namespace && f.name() == name)
    }

    /// Number of declared functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether nothing has been declared.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Register every function and create the native imports object.
    ///
    /// Each native import points at [`svm_trampoline`] with a boxed
    /// [`FunctionEnv`] as its host environment.
    pub fn build_native(self, library: &Arc<NativeLibrary>) -> HostResult<ImportTable> {
        let imports = library.imports_alloc(import_count(self.functions.len())?)?;
        let mut native = NativeImports {
            library: Arc::clone(library),
            imports: Some(imports),
            envs: Vec::with_capacity(self.functions.len()),
        };
        let mut table = ImportTable::with_capacity(self.functions.len());

        for function in self.functions {
            let entry = table.register(function);
            native.link(entry)?;
        }

        table.native = Some(native);
        info!(functions = table.len(), "Built native import table");
        Ok(table)
    }

    /// Register every function for linking into a guest.
    pub fn build_guest(self) -> ImportTable {
        let mut table = ImportTable::with_capacity(self.functions.len());
        for function in self.functions {
            table.register(function);
        }

        info!(functions = table.len(), "Built guest import table");
        table
    }
}

impl Default for ImportsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered import.
#[derive(Debug, Clone)]
pub struct ImportEntry {
    /// The import namespace.
    pub namespace: String,
    /// The function name.
    pub name: String,
    /// Registry handle.
    pub handle: Handle,
    /// Parameter types.
    pub params: Vec<ValueType>,
    /// Result types.
    pub returns: Vec<ValueType>,
}

impl ImportEntry {
    fn new(function: &HostFunction, handle: Handle) -> Self {
        Self {
            namespace: function.namespace().to_string(),
            name: function.name().to_string(),
            handle,
            params: function.params().to_vec(),
            returns: function.returns().to_vec(),
        }
    }
}

/// The native side of a table: the imports object and the environments
/// the trampoline reads.
#[derive(Debug)]
struct NativeImports {
    library: Arc<NativeLibrary>,
    imports: Option<ImportsHandle>,
    envs: Vec<Box<FunctionEnv>>,
}

impl NativeImports {
    fn link(&mut self, entry: &ImportEntry) -> HostResult<()> {
        let env = Box::new(FunctionEnv::new(entry.handle, Arc::clone(&self.library)));
        let host_env = env.as_host_env();
        self.envs.push(env);

        if let Some(imports) = self.imports.as_ref() {
            // SAFETY: the env is boxed and owned by `self`, which outlives
            // every runtime created from these imports.
            unsafe {
                self.library.import_func_new(
                    imports,
                    &entry.namespace,
                    &entry.name,
                    svm_trampoline,
                    host_env,
                    &entry.params,
                    &entry.returns,
                )?;
            }
        }
        Ok(())
    }
}

impl Drop for NativeImports {
    fn drop(&mut self) {
        // The environments are dropped after the imports that point at them.
        if let Some(imports) = self.imports.take() {
            self.library.imports_destroy(imports);
        }
    }
}

/// Registered host imports, unregistered on drop.
///
/// A table built with [`ImportsBuilder::build_native`] also owns the native
/// imports object and the environments the trampoline reads; any runtime
/// created from it must be destroyed first.
#[derive(Debug)]
pub struct ImportTable {
    entries: Vec<ImportEntry>,
    native: Option<NativeImports>,
}

impl ImportTable {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            native: None,
        }
    }

    fn register(&mut self, function: HostFunction) -> &ImportEntry {
        let function = Arc::new(function);
        let handle = registry().register_shared(Arc::clone(&function));
        self.entries.push(ImportEntry::new(&function, handle));
        &self.entries[self.entries.len() - 1]
    }

    /// The registered imports.
    pub fn entries(&self) -> &[ImportEntry] {
        &self.entries
    }

    /// Registry handles, in declaration order.
    pub fn handles(&self) -> Vec<Handle> {
        self.entries.iter().map(|entry| entry.handle).collect()
    }

    /// Number of imports.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The native imports object, for tables built with
    /// [`ImportsBuilder::build_native`].
    pub fn native_handle(&self) -> Option<&ImportsHandle> {
        self.native.as_ref().and_then(|native| native.imports.as_ref())
    }

    /// Define every import on a Wasmtime linker.
    ///
    /// Calls dispatch through the registry; a failing host function traps
    /// the guest.
    pub fn link_guest<T: 'static>(&self, linker: &mut Linker<T>) -> HostResult<()> {
        for entry in &self.entries {
            let ty = FuncType::new(
                linker.engine(),
                entry.params.iter().map(|ty| val_type(*ty)),
                entry.returns.iter().map(|ty| val_type(*ty)),
            );
            let handle = entry.handle;

            linker.func_new(&entry.namespace, &entry.name, ty, move |_caller, params, results| {
                let args = params
                    .iter()
                    .map(from_val)
                    .collect::<HostResult<Vec<_>>>()?;
                let values = registry().invoke(handle, &args)?;
                for (slot, value) in results.iter_mut().zip(values) {
                    *slot = to_val(value);
                }
                Ok(())
            })?;

            debug!(namespace = %entry.namespace, name = %entry.name, handle = %handle, "Linked guest import");
        }
        Ok(())
    }
}

impl Drop for ImportTable {
    fn drop(&mut self) {
        // Native imports go first so nothing can dispatch to a stale handle.
        drop(self.native.take());
        for entry in &self.entries {
            registry().unregister(entry.handle);
        }
        debug!(functions = self.entries.len(), "Dropped import table");
    }
}

fn import_count(len: usize) -> HostResult<u32> {
    u32::try_from(len).map_err(|_| HostError::TooManyImports(len))
}

fn val_type(ty: ValueType) -> ValType {
    match ty {
        ValueType::I32 => ValType::I32,
        ValueType::I64 => ValType::I64,
    }
}

fn from_val(val: &Val) -> HostResult<Value> {
    match val {
        Val::I32(v) => Ok(Value::I32(*v)),
        Val::I64(v) => Ok(Value::I64(*v)),
        other => Err(HostError::UnsupportedType(format!("{other:?}"))),
    }
}

fn to_val(value: Value) -> Val {
    match value {
        Value::I32(v) => Val::I32(v),
        Value::I64(v) => Val::I64(v),
    }
}
