//! The runtime library and its entry points.
//!
//! Every call follows the same discipline: inputs are cloned into
//! caller-allocated [`Buffer`]s that live for the call only, output and
//! error slots are adopted as library-allocated [`Buffer`]s, and every one
//! of them is released by scope on every exit path.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use libloading::Library;
use svm_bridge_core::{
    Address, Allocator, AllocatorKind, Buffer, BufferError, BufferResult, CALLER_ALLOCATOR,
    GasConfig, RawBuffer, ValueType, value,
};
use tracing::{debug, info, warn};

use crate::error::{NativeError, NativeResult};
use crate::ffi::{NativeApi, SVM_SUCCESS, Status, SvmCallback};

/// Gas inputs for deploy, spawn and exec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasOptions {
    /// Whether the runtime meters gas.
    pub metering: bool,
    /// Gas limit when metering.
    pub limit: u64,
}

impl From<GasConfig> for GasOptions {
    fn from(gas: GasConfig) -> Self {
        Self {
            metering: gas.metering,
            limit: gas.limit,
        }
    }
}

/// Sizes of a template's storage variables, in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataLayout(Vec<u32>);

impl DataLayout {
    /// Create a layout from variable sizes.
    pub fn new(sizes: Vec<u32>) -> Self {
        Self(sizes)
    }

    /// Variable sizes.
    pub fn sizes(&self) -> &[u32] {
        &self.0
    }

    /// Wire form: each size as a big-endian `u32`.
    pub fn encode(&self) -> Vec<u8> {
        self.0.iter().flat_map(|size| size.to_be_bytes()).collect()
    }
}

/// A native imports object.
#[derive(Debug)]
pub struct ImportsHandle(NonNull<c_void>);

/// A native in-memory state store.
#[derive(Debug)]
pub struct StateKvHandle(NonNull<c_void>);

/// A native runtime.
#[derive(Debug)]
pub struct RuntimeHandle(NonNull<c_void>);

// The library does not tie handles to the thread that created them.
unsafe impl Send for ImportsHandle {}
unsafe impl Send for StateKvHandle {}
unsafe impl Send for RuntimeHandle {}

impl ImportsHandle {
    /// The raw pointer.
    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl StateKvHandle {
    /// The raw pointer.
    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl RuntimeHandle {
    /// The raw pointer.
    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// The SVM runtime library.
///
/// Also the allocator for every buffer the library hands out: buffers it
/// produces are released through `svm_byte_array_destroy`.
pub struct NativeLibrary {
    api: NativeApi,
    path: Option<PathBuf>,
    // Keeps the symbols in `api` mapped.
    _library: Option<Library>,
}

impl NativeLibrary {
    /// Load the runtime library from `path` and resolve every entry point.
    ///
    /// # Errors
    ///
    /// Fails if the library cannot be opened or lacks an entry point.
    pub fn load(path: impl AsRef<Path>) -> NativeResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading native library");

        // SAFETY: loading runs the library's initializers; the runtime
        // library has none with preconditions.
        let library = unsafe { Library::new(path) }.map_err(|source| NativeError::Load {
            path: path.to_path_buf(),
            source,
        })?;

        let api = NativeApi {
            byte_array_new: symbol(&library, "svm_byte_array_new")?,
            byte_array_destroy: symbol(&library, "svm_byte_array_destroy")?,
            imports_alloc: symbol(&library, "svm_imports_alloc")?,
            imports_destroy: symbol(&library, "svm_imports_destroy")?,
            import_func_new: symbol(&library, "svm_import_func_new")?,
            memory_state_kv_create: symbol(&library, "svm_memory_state_kv_create")?,
            state_kv_destroy: symbol(&library, "svm_state_kv_destroy")?,
            memory_runtime_create: symbol(&library, "svm_memory_runtime_create")?,
            runtime_destroy: symbol(&library, "svm_runtime_destroy")?,
            encode_app_template: symbol(&library, "svm_encode_app_template")?,
            validate_template: symbol(&library, "svm_validate_template")?,
            deploy_template: symbol(&library, "svm_deploy_template")?,
            encode_spawn_app: symbol(&library, "svm_encode_spawn_app")?,
            validate_app: symbol(&library, "svm_validate_app")?,
            spawn_app: symbol(&library, "svm_spawn_app")?,
            encode_app_tx: symbol(&library, "svm_encode_app_tx")?,
            validate_tx: symbol(&library, "svm_validate_tx")?,
            exec_app: symbol(&library, "svm_exec_app")?,
            wasm_error_create: symbol(&library, "svm_wasm_error_create")?,
        };

        info!(path = %path.display(), "Loaded native library");

        Ok(Self {
            api,
            path: Some(path.to_path_buf()),
            _library: Some(library),
        })
    }

    /// Build a library from entry points already present in the process.
    pub fn from_api(api: NativeApi) -> Self {
        Self {
            api,
            path: None,
            _library: None,
        }
    }

    /// The path the library was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The resolved entry points.
    pub fn api(&self) -> &NativeApi {
        &self.api
    }

    /// Allocate an imports object with room for `count` functions.
    pub fn imports_alloc(&self, count: u32) -> NativeResult<ImportsHandle> {
        debug!(operation = "imports_alloc", count, "Native call");

        let mut imports: *mut c_void = ptr::null_mut();
        // SAFETY: `imports` is a valid out slot.
        let status = unsafe { (self.api.imports_alloc)(&mut imports, count) };
        if status != SVM_SUCCESS {
            return Err(self.status_error("imports_alloc", None));
        }

        NonNull::new(imports)
            .map(ImportsHandle)
            .ok_or(NativeError::NullHandle {
                operation: "imports_alloc",
            })
    }

    /// Destroy an imports object.
    pub fn imports_destroy(&self, imports: ImportsHandle) {
        debug!(operation = "imports_destroy", "Native call");
        // SAFETY: the handle is consumed, so it is destroyed once.
        unsafe { (self.api.imports_destroy)(imports.as_ptr()) };
    }

    /// Register a host import on an imports object.
    ///
    /// # Safety
    ///
    /// `host_env` is handed back to `callback` whenever the import is
    /// invoked; it must stay valid until every runtime built from `imports`
    /// is destroyed.
    pub unsafe fn import_func_new(
        &self,
        imports: &ImportsHandle,
        namespace: &str,
        name: &str,
        callback: SvmCallback,
        host_env: *mut c_void,
        params: &[ValueType],
        returns: &[ValueType],
    ) -> NativeResult<()> {
        debug!(operation = "import_func_new", namespace, name, "Native call");

        let namespace = self.input(namespace.as_bytes())?;
        let import_name = self.input(name.as_bytes())?;
        let params = self.input(&value::encode_types(params))?;
        let returns = self.input(&value::encode_types(returns))?;
        let mut error = RawBuffer::empty();

        // SAFETY: inputs outlive the call, `error` is a valid out slot and
        // the caller upholds the `host_env` contract.
        let status = unsafe {
            (self.api.import_func_new)(
                imports.as_ptr(),
                namespace.as_raw(),
                import_name.as_raw(),
                callback,
                host_env,
                params.as_raw(),
                returns.as_raw(),
                &mut error,
            )
        };
        self.finish("import_func_new", status, RawBuffer::empty(), error)
            .map(drop)
    }

    /// Create an in-memory state store.
    pub fn memory_state_kv_create(&self) -> NativeResult<StateKvHandle> {
        debug!(operation = "memory_state_kv_create", "Native call");

        let mut kv: *mut c_void = ptr::null_mut();
        // SAFETY: `kv` is a valid out slot.
        let status = unsafe { (self.api.memory_state_kv_create)(&mut kv) };
        if status != SVM_SUCCESS {
            return Err(self.status_error("memory_state_kv_create", None));
        }

        NonNull::new(kv)
            .map(StateKvHandle)
            .ok_or(NativeError::NullHandle {
                operation: "memory_state_kv_create",
            })
    }

    /// Destroy a state store.
    pub fn state_kv_destroy(&self, kv: StateKvHandle) {
        debug!(operation = "state_kv_destroy", "Native call");
        // SAFETY: the handle is consumed, so it is destroyed once.
        unsafe { (self.api.state_kv_destroy)(kv.as_ptr()) };
    }

    /// Create a runtime over a state store and an imports object.
    ///
    /// # Safety
    ///
    /// `kv` and `imports` must outlive the returned runtime.
    pub unsafe fn memory_runtime_create(
        &self,
        kv: &StateKvHandle,
        imports: &ImportsHandle,
    ) -> NativeResult<RuntimeHandle> {
        debug!(operation = "memory_runtime_create", "Native call");

        let mut runtime: *mut c_void = ptr::null_mut();
        let mut error = RawBuffer::empty();
        // SAFETY: out slots are valid; lifetimes are upheld by the caller.
        let status = unsafe {
            (self.api.memory_runtime_create)(&mut runtime, kv.as_ptr(), imports.as_ptr(), &mut error)
        };
        self.finish("memory_runtime_create", status, RawBuffer::empty(), error)?;

        NonNull::new(runtime)
            .map(RuntimeHandle)
            .ok_or(NativeError::NullHandle {
                operation: "memory_runtime_create",
            })
    }

    /// Destroy a runtime.
    pub fn runtime_destroy(&self, runtime: RuntimeHandle) {
        debug!(operation = "runtime_destroy", "Native call");
        // SAFETY: the handle is consumed, so it is destroyed once.
        unsafe { (self.api.runtime_destroy)(runtime.as_ptr()) };
    }

    /// Encode an app template.
    pub fn encode_app_template(
        &self,
        version: u32,
        name: &str,
        code: &[u8],
        data_layout: &DataLayout,
    ) -> NativeResult<Vec<u8>> {
        debug!(operation = "encode_app_template", version, name, len = code.len(), "Native call");

        let name = self.input(name.as_bytes())?;
        let code = self.input(code)?;
        let data_layout = self.input(&data_layout.encode())?;
        let mut template = RawBuffer::empty();
        let mut error = RawBuffer::empty();

        // SAFETY: inputs outlive the call, out slots are valid.
        let status = unsafe {
            (self.api.encode_app_template)(
                &mut template,
                version,
                name.as_raw(),
                code.as_raw(),
                data_layout.as_raw(),
                &mut error,
            )
        };
        self.finish("encode_app_template", status, template, error)
    }

    /// Validate an encoded template.
    pub fn validate_template(&self, runtime: &RuntimeHandle, template: &[u8]) -> NativeResult<()> {
        debug!(operation = "validate_template", len = template.len(), "Native call");

        let template = self.input(template)?;
        let mut error = RawBuffer::empty();

        // SAFETY: the runtime handle is live, inputs outlive the call.
        let status = unsafe {
            (self.api.validate_template)(runtime.as_ptr(), template.as_raw(), &mut error)
        };
        self.finish("validate_template", status, RawBuffer::empty(), error)
            .map(drop)
    }

    /// Deploy a template and return the raw receipt.
    pub fn deploy_template(
        &self,
        runtime: &RuntimeHandle,
        template: &[u8],
        author: &Address,
        gas: GasOptions,
    ) -> NativeResult<Vec<u8>> {
        debug!(operation = "deploy_template", %author, gas_limit = gas.limit, "Native call");

        let template = self.input(template)?;
        let author = self.input(author.as_bytes())?;
        let mut receipt = RawBuffer::empty();
        let mut error = RawBuffer::empty();

        // SAFETY: the runtime handle is live, inputs outlive the call.
        let status = unsafe {
            (self.api.deploy_template)(
                &mut receipt,
                runtime.as_ptr(),
                template.as_raw(),
                author.as_raw(),
                gas.metering,
                gas.limit,
                &mut error,
            )
        };
        self.finish("deploy_template", status, receipt, error)
    }

    /// Encode a spawn-app transaction.
    pub fn encode_spawn_app(
        &self,
        version: u32,
        template_addr: &Address,
        name: &str,
        ctor_name: &str,
        calldata: &[u8],
    ) -> NativeResult<Vec<u8>> {
        debug!(operation = "encode_spawn_app", %template_addr, name, ctor_name, "Native call");

        let template_addr = self.input(template_addr.as_bytes())?;
        let name = self.input(name.as_bytes())?;
        let ctor_name = self.input(ctor_name.as_bytes())?;
        let calldata = self.input(calldata)?;
        let mut spawn_app = RawBuffer::empty();
        let mut error = RawBuffer::empty();

        // SAFETY: inputs outlive the call, out slots are valid.
        let status = unsafe {
            (self.api.encode_spawn_app)(
                &mut spawn_app,
                version,
                template_addr.as_raw(),
                name.as_raw(),
                ctor_name.as_raw(),
                calldata.as_raw(),
                &mut error,
            )
        };
        self.finish("encode_spawn_app", status, spawn_app, error)
    }

    /// Validate an encoded spawn-app transaction.
    pub fn validate_app(&self, runtime: &RuntimeHandle, app: &[u8]) -> NativeResult<()> {
        debug!(operation = "validate_app", len = app.len(), "Native call");

        let app = self.input(app)?;
        let mut error = RawBuffer::empty();

        // SAFETY: the runtime handle is live, inputs outlive the call.
        let status =
            unsafe { (self.api.validate_app)(runtime.as_ptr(), app.as_raw(), &mut error) };
        self.finish("validate_app", status, RawBuffer::empty(), error)
            .map(drop)
    }

    /// Spawn an app and return the raw receipt.
    pub fn spawn_app(
        &self,
        runtime: &RuntimeHandle,
        app: &[u8],
        creator: &Address,
        gas: GasOptions,
    ) -> NativeResult<Vec<u8>> {
        debug!(operation = "spawn_app", %creator, gas_limit = gas.limit, "Native call");

        let app = self.input(app)?;
        let creator = self.input(creator.as_bytes())?;
        let mut receipt = RawBuffer::empty();
        let mut error = RawBuffer::empty();

        // SAFETY: the runtime handle is live, inputs outlive the call.
        let status = unsafe {
            (self.api.spawn_app)(
                &mut receipt,
                runtime.as_ptr(),
                app.as_raw(),
                creator.as_raw(),
                gas.metering,
                gas.limit,
                &mut error,
            )
        };
        self.finish("spawn_app", status, receipt, error)
    }

    /// Encode an app transaction.
    pub fn encode_app_tx(
        &self,
        version: u32,
        app_addr: &Address,
        func_name: &str,
        calldata: &[u8],
    ) -> NativeResult<Vec<u8>> {
        debug!(operation = "encode_app_tx", %app_addr, func_name, "Native call");

        let app_addr = self.input(app_addr.as_bytes())?;
        let func_name = self.input(func_name.as_bytes())?;
        let calldata = self.input(calldata)?;
        let mut app_tx = RawBuffer::empty();
        let mut error = RawBuffer::empty();

        // SAFETY: inputs outlive the call, out slots are valid.
        let status = unsafe {
            (self.api.encode_app_tx)(
                &mut app_tx,
                version,
                app_addr.as_raw(),
                func_name.as_raw(),
                calldata.as_raw(),
                &mut error,
            )
        };
        self.finish("encode_app_tx", status, app_tx, error)
    }

    /// Validate an app transaction and return the target app's address.
    pub fn validate_tx(&self, runtime: &RuntimeHandle, tx: &[u8]) -> NativeResult<Address> {
        debug!(operation = "validate_tx", len = tx.len(), "Native call");

        let tx = self.input(tx)?;
        let mut app_addr = RawBuffer::empty();
        let mut error = RawBuffer::empty();

        // SAFETY: the runtime handle is live, inputs outlive the call.
        let status = unsafe {
            (self.api.validate_tx)(&mut app_addr, runtime.as_ptr(), tx.as_raw(), &mut error)
        };
        let bytes = self.finish("validate_tx", status, app_addr, error)?;
        Ok(Address::from_bytes(&bytes))
    }

    /// Execute an app transaction and return the raw receipt.
    pub fn exec_app(
        &self,
        runtime: &RuntimeHandle,
        tx: &[u8],
        state: &[u8],
        gas: GasOptions,
    ) -> NativeResult<Vec<u8>> {
        debug!(operation = "exec_app", len = tx.len(), gas_limit = gas.limit, "Native call");

        let tx = self.input(tx)?;
        let state = self.input(state)?;
        let mut receipt = RawBuffer::empty();
        let mut error = RawBuffer::empty();

        // SAFETY: the runtime handle is live, inputs outlive the call.
        let status = unsafe {
            (self.api.exec_app)(
                &mut receipt,
                runtime.as_ptr(),
                tx.as_raw(),
                state.as_raw(),
                gas.metering,
                gas.limit,
                &mut error,
            )
        };
        self.finish("exec_app", status, receipt, error)
    }

    /// Re-create `message` as an error owned by the library.
    ///
    /// The returned pointer is handed back to the library (the return value
    /// of an import callback), which destroys it.
    pub fn wasm_error_create(&self, message: &[u8]) -> NativeResult<NonNull<RawBuffer>> {
        let message = self.input(message)?;
        // SAFETY: the library copies `message` before we release it.
        let error = unsafe { (self.api.wasm_error_create)(message.as_raw()) };
        NonNull::new(error).ok_or(NativeError::NullHandle {
            operation: "wasm_error_create",
        })
    }

    fn input(&self, bytes: &[u8]) -> BufferResult<Buffer<'static>> {
        Buffer::clone_into(&CALLER_ALLOCATOR, bytes)
    }

    /// Take ownership of a buffer the library produced.
    ///
    /// # Safety
    ///
    /// `raw` must come from this library and be owned by nobody else.
    unsafe fn adopt(&self, raw: RawBuffer) -> BufferResult<Option<Buffer<'_>>> {
        if raw.is_null() {
            return Ok(None);
        }
        // SAFETY: upheld by the caller.
        unsafe { Buffer::adopt(self, raw) }.map(Some)
    }

    /// Release the output and error slots and turn the status into a result.
    fn finish(
        &self,
        operation: &'static str,
        status: Status,
        output: RawBuffer,
        error: RawBuffer,
    ) -> NativeResult<Vec<u8>> {
        // Both slots are adopted before anything can return early.
        // SAFETY: the library just filled both slots for us.
        let output = unsafe { self.adopt(output) };
        let error = unsafe { self.adopt(error) };

        if status != SVM_SUCCESS {
            let error = error?;
            return Err(self.status_error(operation, error.as_ref()));
        }

        let output = output?;
        Ok(output.map(|buffer| buffer.to_vec()).unwrap_or_default())
    }

    fn status_error(&self, operation: &'static str, error: Option<&Buffer<'_>>) -> NativeError {
        let message = error
            .map(|buffer| String::from_utf8_lossy(buffer.view()).into_owned())
            .unwrap_or_default();
        warn!(operation, %message, "Native call failed");
        NativeError::Status { operation, message }
    }
}

unsafe impl Allocator for NativeLibrary {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::NativeLibrary
    }

    fn allocate(&self, size: usize) -> BufferResult<RawBuffer> {
        let failed = || BufferError::AllocationFailed {
            allocator: AllocatorKind::NativeLibrary,
            size,
        };

        let length = u32::try_from(size).map_err(|_| failed())?;
        // SAFETY: plain allocation call.
        let raw = unsafe { (self.api.byte_array_new)(length) };
        if length > 0 && raw.is_null() {
            return Err(failed());
        }
        Ok(raw)
    }

    unsafe fn release(&self, raw: RawBuffer) {
        if raw.is_null() {
            return;
        }
        // SAFETY: `raw` came from this library.
        unsafe { (self.api.byte_array_destroy)(raw) };
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish()
    }
}

fn symbol<T: Copy>(library: &Library, name: &'static str) -> NativeResult<T> {
    // SAFETY: `T` is the entry point's declared C signature.
    unsafe { library.get::<T>(name.as_bytes()) }
        .map(|symbol| *symbol)
        .map_err(|source| NativeError::MissingSymbol {
            symbol: name,
            source,
        })
}
