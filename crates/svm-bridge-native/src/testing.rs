//! In-process fake of the runtime library.
//!
//! [`fake_library`] returns a [`NativeLibrary`] whose entry points are plain
//! Rust functions with the C ABI. The fake speaks JSON instead of the real
//! binary formats, keeps templates and apps in memory, and executes an app
//! transaction by invoking the host import named by the transaction's
//! `func_name` with the transaction's calldata as arguments.
//!
//! Every buffer the fake hands out is counted per thread; tests assert that
//! [`live_allocations`] returns to zero once they are done.

use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr;

use parking_lot::Mutex;
use serde_json::{Value as Json, json};
use svm_bridge_core::{Address, RawBuffer};

use crate::ffi::{NativeApi, SVM_FAILURE, SVM_SUCCESS, Status, SvmCallback, SvmEnv};
use crate::library::NativeLibrary;

/// Gas every deploy, spawn and exec consumes in the fake.
pub const FAKE_GAS_USED: u64 = 10;

thread_local! {
    static LIVE: Cell<isize> = const { Cell::new(0) };
}

/// Buffers handed out by the fake on this thread and not yet destroyed.
pub fn live_allocations() -> isize {
    LIVE.with(Cell::get)
}

/// A [`NativeLibrary`] backed by the fake.
pub fn fake_library() -> NativeLibrary {
    NativeLibrary::from_api(NativeApi {
        byte_array_new: fake_byte_array_new,
        byte_array_destroy: fake_byte_array_destroy,
        imports_alloc: fake_imports_alloc,
        imports_destroy: fake_imports_destroy,
        import_func_new: fake_import_func_new,
        memory_state_kv_create: fake_memory_state_kv_create,
        state_kv_destroy: fake_state_kv_destroy,
        memory_runtime_create: fake_memory_runtime_create,
        runtime_destroy: fake_runtime_destroy,
        encode_app_template: fake_encode_app_template,
        validate_template: fake_validate_template,
        deploy_template: fake_deploy_template,
        encode_spawn_app: fake_encode_spawn_app,
        validate_app: fake_validate_app,
        spawn_app: fake_spawn_app,
        encode_app_tx: fake_encode_app_tx,
        validate_tx: fake_validate_tx,
        exec_app: fake_exec_app,
        wasm_error_create: fake_wasm_error_create,
    })
}

/// Destroy an error created by the fake's `svm_wasm_error_create`.
///
/// # Safety
///
/// `error` must come from the fake and not have been destroyed.
pub unsafe fn destroy_wasm_error(error: *mut RawBuffer) -> String {
    if error.is_null() {
        return String::new();
    }
    // SAFETY: the fake boxed it.
    let boxed = unsafe { Box::from_raw(error) };
    let message = String::from_utf8_lossy(unsafe { boxed.as_slice() }).into_owned();
    unsafe { fake_byte_array_destroy(*boxed) };
    message
}

struct FakeImport {
    name: String,
    callback: SvmCallback,
    host_env: *mut c_void,
}

struct FakeImports {
    capacity: usize,
    funcs: Mutex<Vec<FakeImport>>,
}

#[derive(Default)]
struct FakeKv {
    templates: Mutex<HashMap<Address, String>>,
    apps: Mutex<HashMap<Address, Address>>,
}

struct FakeRuntime {
    kv: *mut FakeKv,
    imports: *mut FakeImports,
}

fn alloc_copy(bytes: &[u8]) -> RawBuffer {
    if bytes.is_empty() {
        return RawBuffer::empty();
    }
    let boxed: Box<[u8]> = bytes.into();
    let length = boxed.len() as u32;
    LIVE.with(|live| live.set(live.get() + 1));
    RawBuffer {
        bytes: Box::into_raw(boxed) as *const u8,
        length,
        capacity: length,
    }
}

unsafe fn input<'a>(raw: RawBuffer) -> &'a [u8] {
    // SAFETY: the caller keeps inputs alive for the call.
    unsafe { raw.as_slice() }
}

unsafe fn succeed(out: *mut RawBuffer, bytes: &[u8]) -> Status {
    if !out.is_null() {
        // SAFETY: out slots are valid for writes.
        unsafe { *out = alloc_copy(bytes) };
    }
    SVM_SUCCESS
}

unsafe fn fail(error: *mut RawBuffer, message: &str) -> Status {
    if !error.is_null() {
        // SAFETY: error slots are valid for writes.
        unsafe { *error = alloc_copy(message.as_bytes()) };
    }
    SVM_FAILURE
}

fn parse(bytes: &[u8], required: &[&str]) -> Option<Json> {
    let value: Json = serde_json::from_slice(bytes).ok()?;
    required
        .iter()
        .all(|key| value.get(key).is_some())
        .then_some(value)
}

fn str_field<'v>(value: &'v Json, key: &str) -> &'v str {
    value.get(key).and_then(Json::as_str).unwrap_or_default()
}

fn address_field(value: &Json, key: &str) -> Option<Address> {
    str_field(value, key).parse().ok()
}

fn hex_field(value: &Json, key: &str) -> Vec<u8> {
    hex::decode(str_field(value, key)).unwrap_or_default()
}

fn out_of_gas(metering: bool, limit: u64) -> bool {
    metering && limit < FAKE_GAS_USED
}

unsafe extern "C" fn fake_byte_array_new(length: u32) -> RawBuffer {
    alloc_copy(&vec![0u8; length as usize])
}

unsafe extern "C" fn fake_byte_array_destroy(buffer: RawBuffer) {
    if buffer.bytes.is_null() || buffer.capacity == 0 {
        return;
    }
    let slice = ptr::slice_from_raw_parts_mut(buffer.bytes as *mut u8, buffer.capacity as usize);
    // SAFETY: every non-empty fake buffer is a leaked boxed slice.
    drop(unsafe { Box::from_raw(slice) });
    LIVE.with(|live| live.set(live.get() - 1));
}

unsafe extern "C" fn fake_imports_alloc(imports: *mut *mut c_void, count: u32) -> Status {
    if imports.is_null() {
        return SVM_FAILURE;
    }
    let table = Box::new(FakeImports {
        capacity: count as usize,
        funcs: Mutex::new(Vec::new()),
    });
    unsafe { *imports = Box::into_raw(table).cast() };
    SVM_SUCCESS
}

unsafe extern "C" fn fake_imports_destroy(imports: *mut c_void) {
    if !imports.is_null() {
        drop(unsafe { Box::from_raw(imports.cast::<FakeImports>()) });
    }
}

unsafe extern "C" fn fake_import_func_new(
    imports: *mut c_void,
    _namespace: RawBuffer,
    import_name: RawBuffer,
    func: SvmCallback,
    host_env: *mut c_void,
    _params: RawBuffer,
    _returns: RawBuffer,
    error: *mut RawBuffer,
) -> Status {
    let Some(table) = (unsafe { imports.cast::<FakeImports>().as_ref() }) else {
        return unsafe { fail(error, "imports is null") };
    };
    let Ok(name) = std::str::from_utf8(unsafe { input(import_name) }) else {
        return unsafe { fail(error, "import name is not utf-8") };
    };

    let mut funcs = table.funcs.lock();
    if funcs.len() >= table.capacity {
        return unsafe { fail(error, "imports table is full") };
    }
    funcs.push(FakeImport {
        name: name.to_owned(),
        callback: func,
        host_env,
    });
    SVM_SUCCESS
}

unsafe extern "C" fn fake_memory_state_kv_create(kv: *mut *mut c_void) -> Status {
    if kv.is_null() {
        return SVM_FAILURE;
    }
    unsafe { *kv = Box::into_raw(Box::<FakeKv>::default()).cast() };
    SVM_SUCCESS
}

unsafe extern "C" fn fake_state_kv_destroy(kv: *mut c_void) {
    if !kv.is_null() {
        drop(unsafe { Box::from_raw(kv.cast::<FakeKv>()) });
    }
}

unsafe extern "C" fn fake_memory_runtime_create(
    runtime: *mut *mut c_void,
    kv: *mut c_void,
    imports: *mut c_void,
    error: *mut RawBuffer,
) -> Status {
    if runtime.is_null() || kv.is_null() || imports.is_null() {
        return unsafe { fail(error, "runtime requires a state kv and imports") };
    }
    let fake = Box::new(FakeRuntime {
        kv: kv.cast(),
        imports: imports.cast(),
    });
    unsafe { *runtime = Box::into_raw(fake).cast() };
    SVM_SUCCESS
}

unsafe extern "C" fn fake_runtime_destroy(runtime: *mut c_void) {
    if !runtime.is_null() {
        drop(unsafe { Box::from_raw(runtime.cast::<FakeRuntime>()) });
    }
}

unsafe extern "C" fn fake_encode_app_template(
    app_template: *mut RawBuffer,
    version: u32,
    name: RawBuffer,
    code: RawBuffer,
    data_layout: RawBuffer,
    error: *mut RawBuffer,
) -> Status {
    let Ok(name) = std::str::from_utf8(unsafe { input(name) }) else {
        return unsafe { fail(error, "template name is not utf-8") };
    };
    let template = json!({
        "version": version,
        "name": name,
        "code": hex::encode(unsafe { input(code) }),
        "data_layout": hex::encode(unsafe { input(data_layout) }),
    });
    unsafe { succeed(app_template, template.to_string().as_bytes()) }
}

unsafe extern "C" fn fake_validate_template(
    _runtime: *mut c_void,
    app_template: RawBuffer,
    error: *mut RawBuffer,
) -> Status {
    match parse(unsafe { input(app_template) }, &["name", "code"]) {
        Some(_) => SVM_SUCCESS,
        None => unsafe { fail(error, "invalid template") },
    }
}

unsafe extern "C" fn fake_deploy_template(
    receipt: *mut RawBuffer,
    runtime: *mut c_void,
    app_template: RawBuffer,
    _author: RawBuffer,
    gas_metering: bool,
    gas_limit: u64,
    error: *mut RawBuffer,
) -> Status {
    let Some(runtime) = (unsafe { runtime.cast::<FakeRuntime>().as_ref() }) else {
        return unsafe { fail(error, "runtime is null") };
    };
    let Some(template) = parse(unsafe { input(app_template) }, &["name", "code"]) else {
        return unsafe { fail(error, "invalid template") };
    };

    let body = if out_of_gas(gas_metering, gas_limit) {
        json!({ "err_type": "oog" })
    } else {
        let name = str_field(&template, "name");
        let addr = Address::from_bytes(name.as_bytes());
        // SAFETY: the kv outlives the runtime.
        let kv = unsafe { &*runtime.kv };
        kv.templates.lock().insert(addr, name.to_owned());
        json!({
            "type": "deploy-template",
            "success": true,
            "addr": addr.to_hex(),
            "gas_used": FAKE_GAS_USED,
        })
    };
    unsafe { succeed(receipt, body.to_string().as_bytes()) }
}

unsafe extern "C" fn fake_encode_spawn_app(
    spawn_app: *mut RawBuffer,
    version: u32,
    template_addr: RawBuffer,
    name: RawBuffer,
    ctor_name: RawBuffer,
    calldata: RawBuffer,
    error: *mut RawBuffer,
) -> Status {
    let (Ok(name), Ok(ctor_name)) = (
        std::str::from_utf8(unsafe { input(name) }),
        std::str::from_utf8(unsafe { input(ctor_name) }),
    ) else {
        return unsafe { fail(error, "app name is not utf-8") };
    };
    let app = json!({
        "version": version,
        "template": Address::from_bytes(unsafe { input(template_addr) }).to_hex(),
        "name": name,
        "ctor_name": ctor_name,
        "calldata": hex::encode(unsafe { input(calldata) }),
    });
    unsafe { succeed(spawn_app, app.to_string().as_bytes()) }
}

unsafe extern "C" fn fake_validate_app(
    _runtime: *mut c_void,
    app: RawBuffer,
    error: *mut RawBuffer,
) -> Status {
    match parse(unsafe { input(app) }, &["template", "name"]) {
        Some(_) => SVM_SUCCESS,
        None => unsafe { fail(error, "invalid app") },
    }
}

unsafe extern "C" fn fake_spawn_app(
    receipt: *mut RawBuffer,
    runtime: *mut c_void,
    app: RawBuffer,
    _creator: RawBuffer,
    gas_metering: bool,
    gas_limit: u64,
    error: *mut RawBuffer,
) -> Status {
    let Some(runtime) = (unsafe { runtime.cast::<FakeRuntime>().as_ref() }) else {
        return unsafe { fail(error, "runtime is null") };
    };
    let Some(app) = parse(unsafe { input(app) }, &["template", "name"]) else {
        return unsafe { fail(error, "invalid app") };
    };
    let Some(template_addr) = address_field(&app, "template") else {
        return unsafe { fail(error, "invalid app") };
    };

    let kv = unsafe { &*runtime.kv };
    let body = if out_of_gas(gas_metering, gas_limit) {
        json!({ "err_type": "oog" })
    } else if !kv.templates.lock().contains_key(&template_addr) {
        json!({
            "err_type": "template-not-found",
            "template_addr": template_addr.to_hex(),
        })
    } else {
        let app_addr = Address::from_bytes(str_field(&app, "name").as_bytes());
        kv.apps.lock().insert(app_addr, template_addr);
        json!({
            "type": "spawn-app",
            "success": true,
            "addr": app_addr.to_hex(),
            "init_state": "00",
            "returndata": "",
            "gas_used": FAKE_GAS_USED,
            "logs": [],
        })
    };
    unsafe { succeed(receipt, body.to_string().as_bytes()) }
}

unsafe extern "C" fn fake_encode_app_tx(
    app_tx: *mut RawBuffer,
    version: u32,
    app_addr: RawBuffer,
    func_name: RawBuffer,
    calldata: RawBuffer,
    error: *mut RawBuffer,
) -> Status {
    let Ok(func_name) = std::str::from_utf8(unsafe { input(func_name) }) else {
        return unsafe { fail(error, "function name is not utf-8") };
    };
    let tx = json!({
        "version": version,
        "app": Address::from_bytes(unsafe { input(app_addr) }).to_hex(),
        "func_name": func_name,
        "calldata": hex::encode(unsafe { input(calldata) }),
    });
    unsafe { succeed(app_tx, tx.to_string().as_bytes()) }
}

unsafe extern "C" fn fake_validate_tx(
    app_addr: *mut RawBuffer,
    _runtime: *mut c_void,
    app_tx: RawBuffer,
    error: *mut RawBuffer,
) -> Status {
    let addr = parse(unsafe { input(app_tx) }, &["app", "func_name"])
        .and_then(|tx| address_field(&tx, "app"));
    match addr {
        Some(addr) => unsafe { succeed(app_addr, addr.as_bytes()) },
        None => unsafe { fail(error, "invalid transaction") },
    }
}

unsafe extern "C" fn fake_exec_app(
    receipt: *mut RawBuffer,
    runtime: *mut c_void,
    app_tx: RawBuffer,
    app_state: RawBuffer,
    gas_metering: bool,
    gas_limit: u64,
    error: *mut RawBuffer,
) -> Status {
    let Some(runtime) = (unsafe { runtime.cast::<FakeRuntime>().as_ref() }) else {
        return unsafe { fail(error, "runtime is null") };
    };
    let Some(tx) = parse(unsafe { input(app_tx) }, &["app", "func_name"]) else {
        return unsafe { fail(error, "invalid transaction") };
    };
    let Some(app_addr) = address_field(&tx, "app") else {
        return unsafe { fail(error, "invalid transaction") };
    };
    let func = str_field(&tx, "func_name");

    let kv = unsafe { &*runtime.kv };
    let template_addr = kv.apps.lock().get(&app_addr).copied();
    let body = match template_addr {
        _ if out_of_gas(gas_metering, gas_limit) => json!({ "err_type": "oog" }),
        None => json!({ "err_type": "app-not-found", "app_addr": app_addr.to_hex() }),
        Some(template_addr) => {
            let imports = unsafe { &*runtime.imports };
            let target = imports
                .funcs
                .lock()
                .iter()
                .find(|import| import.name == func)
                .map(|import| (import.callback, import.host_env));

            match target {
                None => json!({
                    "err_type": "function-not-found",
                    "template_addr": template_addr.to_hex(),
                    "app_addr": app_addr.to_hex(),
                    "func": func,
                }),
                Some((callback, host_env)) => {
                    let calldata = hex_field(&tx, "calldata");
                    match unsafe { invoke_import(callback, host_env, &calldata) } {
                        Ok(results) => json!({
                            "type": "exec-app",
                            "success": true,
                            "new_state": hex::encode(unsafe { input(app_state) }),
                            "returndata": hex::encode(results),
                            "gas_used": FAKE_GAS_USED,
                            "logs": [],
                        }),
                        Err(message) => json!({
                            "err_type": "function-failed",
                            "template_addr": template_addr.to_hex(),
                            "app_addr": app_addr.to_hex(),
                            "func": func,
                            "message": message,
                        }),
                    }
                }
            }
        }
    };
    unsafe { succeed(receipt, body.to_string().as_bytes()) }
}

/// Run a host import the way the runtime does and take back what it returns.
unsafe fn invoke_import(
    callback: SvmCallback,
    host_env: *mut c_void,
    args: &[u8],
) -> Result<Vec<u8>, String> {
    let mut env = SvmEnv {
        inner_env: ptr::null(),
        host_env,
    };
    let args = alloc_copy(args);
    let mut results = RawBuffer::empty();

    let error = unsafe { callback(&mut env, &args, &mut results) };
    unsafe { fake_byte_array_destroy(args) };

    if !error.is_null() {
        unsafe { fake_byte_array_destroy(results) };
        return Err(unsafe { destroy_wasm_error(error) });
    }

    let bytes = unsafe { results.as_slice() }.to_vec();
    unsafe { fake_byte_array_destroy(results) };
    Ok(bytes)
}

unsafe extern "C" fn fake_wasm_error_create(message: RawBuffer) -> *mut RawBuffer {
    Box::into_raw(Box::new(alloc_copy(unsafe { input(message) })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_allocations_are_counted() {
        let buffer = unsafe { fake_byte_array_new(8) };
        assert_eq!(live_allocations(), 1);
        assert_eq!(unsafe { buffer.as_slice() }, &[0; 8]);

        unsafe { fake_byte_array_destroy(buffer) };
        assert_eq!(live_allocations(), 0);
    }

    #[test]
    fn test_zero_length_is_not_counted() {
        let buffer = unsafe { fake_byte_array_new(0) };
        assert!(buffer.is_null());
        assert_eq!(live_allocations(), 0);
        unsafe { fake_byte_array_destroy(buffer) };
        assert_eq!(live_allocations(), 0);
    }

    #[test]
    fn test_imports_capacity_enforced() {
        unsafe extern "C" fn noop(
            _env: *mut SvmEnv,
            _args: *const RawBuffer,
            _results: *mut RawBuffer,
        ) -> *mut RawBuffer {
            ptr::null_mut()
        }

        let library = fake_library();
        let imports = library.imports_alloc(1).unwrap();
        unsafe {
            library
                .import_func_new(&imports, "host", "a", noop, ptr::null_mut(), &[], &[])
                .unwrap();
            let err = library
                .import_func_new(&imports, "host", "b", noop, ptr::null_mut(), &[], &[])
                .unwrap_err();
            assert!(err.to_string().contains("imports table is full"));
        }
        library.imports_destroy(imports);
        assert_eq!(live_allocations(), 0);
    }
}
