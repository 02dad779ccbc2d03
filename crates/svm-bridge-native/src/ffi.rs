//! C ABI of the SVM runtime library.
//!
//! Buffers cross as `svm_byte_array` by value ([`RawBuffer`]), outputs and
//! error slots by pointer. Every fallible entry point returns a status code
//! and, on failure, leaves a message in its error slot that the caller must
//! destroy with `svm_byte_array_destroy`.

use std::ffi::c_void;

use svm_bridge_core::RawBuffer;

/// `svm_result_t`
pub type Status = u32;

/// The call succeeded.
pub const SVM_SUCCESS: Status = 0;
/// The call failed; the error slot holds a message.
pub const SVM_FAILURE: Status = 1;

/// Environment handed to a host import callback (`svm_env_t`).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SvmEnv {
    /// Runtime-private environment.
    pub inner_env: *const c_void,
    /// The host environment registered with `svm_import_func_new`.
    pub host_env: *const c_void,
}

/// `svm_func_callback_t`
///
/// Returns null on success with `results` filled in, or an error created by
/// `svm_wasm_error_create` that the library takes ownership of.
pub type SvmCallback = unsafe extern "C" fn(
    env: *mut SvmEnv,
    args: *const RawBuffer,
    results: *mut RawBuffer,
) -> *mut RawBuffer;

/// `svm_byte_array svm_byte_array_new(uint32_t length)`
pub type ByteArrayNewFn = unsafe extern "C" fn(length: u32) -> RawBuffer;

/// `void svm_byte_array_destroy(svm_byte_array)`
pub type ByteArrayDestroyFn = unsafe extern "C" fn(buffer: RawBuffer);

/// `svm_imports_alloc`
pub type ImportsAllocFn = unsafe extern "C" fn(imports: *mut *mut c_void, count: u32) -> Status;

/// `svm_imports_destroy`
pub type ImportsDestroyFn = unsafe extern "C" fn(imports: *mut c_void);

/// `svm_import_func_new`
pub type ImportFuncNewFn = unsafe extern "C" fn(
    imports: *mut c_void,
    namespace: RawBuffer,
    import_name: RawBuffer,
    func: SvmCallback,
    host_env: *mut c_void,
    params: RawBuffer,
    returns: RawBuffer,
    error: *mut RawBuffer,
) -> Status;

/// `svm_memory_state_kv_create`
pub type MemoryStateKvCreateFn = unsafe extern "C" fn(kv: *mut *mut c_void) -> Status;

/// `svm_state_kv_destroy`
pub type StateKvDestroyFn = unsafe extern "C" fn(kv: *mut c_void);

/// `svm_memory_runtime_create`
pub type MemoryRuntimeCreateFn = unsafe extern "C" fn(
    runtime: *mut *mut c_void,
    kv: *mut c_void,
    imports: *mut c_void,
    error: *mut RawBuffer,
) -> Status;

/// `svm_runtime_destroy`
pub type RuntimeDestroyFn = unsafe extern "C" fn(runtime: *mut c_void);

/// `svm_encode_app_template`
pub type EncodeAppTemplateFn = unsafe extern "C" fn(
    app_template: *mut RawBuffer,
    version: u32,
    name: RawBuffer,
    code: RawBuffer,
    data_layout: RawBuffer,
    error: *mut RawBuffer,
) -> Status;

/// `svm_validate_template`
pub type ValidateTemplateFn = unsafe extern "C" fn(
    runtime: *mut c_void,
    app_template: RawBuffer,
    error: *mut RawBuffer,
) -> Status;

/// `svm_deploy_template`
pub type DeployTemplateFn = unsafe extern "C" fn(
    receipt: *mut RawBuffer,
    runtime: *mut c_void,
    app_template: RawBuffer,
    author: RawBuffer,
    gas_metering: bool,
    gas_limit: u64,
    error: *mut RawBuffer,
) -> Status;

/// `svm_encode_spawn_app`
pub type EncodeSpawnAppFn = unsafe extern "C" fn(
    spawn_app: *mut RawBuffer,
    version: u32,
    template_addr: RawBuffer,
    name: RawBuffer,
    ctor_name: RawBuffer,
    calldata: RawBuffer,
    error: *mut RawBuffer,
) -> Status;

/// `svm_validate_app`
pub type ValidateAppFn =
    unsafe extern "C" fn(runtime: *mut c_void, app: RawBuffer, error: *mut RawBuffer) -> Status;

/// `svm_spawn_app`
pub type SpawnAppFn = unsafe extern "C" fn(
    receipt: *mut RawBuffer,
    runtime: *mut c_void,
    app: RawBuffer,
    creator: RawBuffer,
    gas_metering: bool,
    gas_limit: u64,
    error: *mut RawBuffer,
) -> Status;

/// `svm_encode_app_tx`
pub type EncodeAppTxFn = unsafe extern "C" fn(
    app_tx: *mut RawBuffer,
    version: u32,
    app_addr: RawBuffer,
    func_name: RawBuffer,
    calldata: RawBuffer,
    error: *mut RawBuffer,
) -> Status;

/// `svm_validate_tx`
pub type ValidateTxFn = unsafe extern "C" fn(
    app_addr: *mut RawBuffer,
    runtime: *mut c_void,
    app_tx: RawBuffer,
    error: *mut RawBuffer,
) -> Status;

/// `svm_exec_app`
pub type ExecAppFn = unsafe extern "C" fn(
    receipt: *mut RawBuffer,
    runtime: *mut c_void,
    app_tx: RawBuffer,
    app_state: RawBuffer,
    gas_metering: bool,
    gas_limit: u64,
    error: *mut RawBuffer,
) -> Status;

/// `svm_wasm_error_create`
pub type WasmErrorCreateFn = unsafe extern "C" fn(message: RawBuffer) -> *mut RawBuffer;

/// Every entry point of the runtime library.
#[derive(Debug, Clone, Copy)]
pub struct NativeApi {
    pub byte_array_new: ByteArrayNewFn,
    pub byte_array_destroy: ByteArrayDestroyFn,
    pub imports_alloc: ImportsAllocFn,
    pub imports_destroy: ImportsDestroyFn,
    pub import_func_new: ImportFuncNewFn,
    pub memory_state_kv_create: MemoryStateKvCreateFn,
    pub state_kv_destroy: StateKvDestroyFn,
    pub memory_runtime_create: MemoryRuntimeCreateFn,
    pub runtime_destroy: RuntimeDestroyFn,
    pub encode_app_template: EncodeAppTemplateFn,
    pub validate_template: ValidateTemplateFn,
    pub deploy_template: DeployTemplateFn,
    pub encode_spawn_app: EncodeSpawnAppFn,
    pub validate_app: ValidateAppFn,
    pub spawn_app: SpawnAppFn,
    pub encode_app_tx: EncodeAppTxFn,
    pub validate_tx: ValidateTxFn,
    pub exec_app: ExecAppFn,
    pub wasm_error_create: WasmErrorCreateFn,
}
