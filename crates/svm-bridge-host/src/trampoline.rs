//! The C callback every native host import points at.

use std::any::Any;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::{process, ptr};
use std::sync::Arc;

use svm_bridge_core::{Buffer, RawBuffer, value};
use svm_bridge_native::{NativeLibrary, SvmEnv};
use tracing::{error, warn};

use crate::error::{HostError, HostResult};
use crate::registry::{Handle, registry};

/// Host environment registered with each native import.
///
/// Boxed and owned by the import table, so its address stays fixed for as
/// long as the runtime can call the import.
#[derive(Debug)]
pub struct FunctionEnv {
    pub(crate) handle: Handle,
    pub(crate) library: Arc<NativeLibrary>,
}

impl FunctionEnv {
    pub(crate) fn new(handle: Handle, library: Arc<NativeLibrary>) -> Self {
        Self { handle, library }
    }

    /// The handle dispatched to.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The opaque pointer handed to the library.
    pub(crate) fn as_host_env(&self) -> *mut c_void {
        self as *const Self as *mut c_void
    }
}

/// Dispatch a native import call to the registered host function.
///
/// On success the encoded results are written to `*results` in a buffer
/// allocated by the native library, and null is returned. On failure,
/// including a panic in the host function, an error created with
/// `svm_wasm_error_create` is returned instead. Nothing unwinds out of this
/// function.
///
/// A call without a [`FunctionEnv`] has no library to report through and
/// would otherwise look like a successful call, so it aborts the process.
///
/// # Safety
///
/// `env` must be null or point to an `SvmEnv` whose `host_env` is null or a
/// live [`FunctionEnv`]. `args` must be null or point to a readable buffer,
/// and `results` must be null or writable.
pub unsafe extern "C" fn svm_trampoline(
    env: *mut SvmEnv,
    args: *const RawBuffer,
    results: *mut RawBuffer,
) -> *mut RawBuffer {
    // SAFETY: upheld by the caller.
    let function_env = unsafe {
        env.as_ref()
            .and_then(|env| env.host_env.cast::<FunctionEnv>().as_ref())
    };
    let Some(function_env) = function_env else {
        error!("Host import called without a function environment");
        process::abort();
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: upheld by the caller.
        let args = unsafe { args.as_ref().map(|raw| raw.as_slice()) }.unwrap_or_default();
        dispatch(function_env, args, results)
    }));

    let error = match outcome {
        Ok(Ok(())) => return ptr::null_mut(),
        Ok(Err(error)) => error,
        Err(payload) => HostError::Panic(panic_message(payload.as_ref())),
    };

    let message = format!("{error:#}");
    warn!(handle = %function_env.handle, error = %message, "Host import failed");

    match function_env.library.wasm_error_create(message.as_bytes()) {
        Ok(error) => error.as_ptr(),
        Err(err) => {
            warn!(handle = %function_env.handle, error = %err, "Failed to create native error");
            ptr::null_mut()
        }
    }
}

fn dispatch(function_env: &FunctionEnv, args: &[u8], results: *mut RawBuffer) -> HostResult<()> {
    let args = if args.is_empty() {
        Vec::new()
    } else {
        value::decode_values(args)?
    };

    let values = registry().invoke(function_env.handle, &args)?;
    let encoded = value::encode_values(&values)?;

    let buffer = Buffer::clone_into(function_env.library.as_ref(), &encoded)?;
    if !results.is_null() {
        // SAFETY: `results` is writable; the library now owns the buffer.
        unsafe { *results = buffer.into_raw() };
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HostFunction;
    use std::env;
    use std::process::Command;
    use svm_bridge_core::{Value, ValueType};
    use svm_bridge_native::NativeApi;
    use svm_bridge_native::testing::{destroy_wasm_error, fake_library, live_allocations};

    const NULL_ENV_CHILD: &str = "SVM_BRIDGE_TRAMPOLINE_NULL_ENV";

    fn env_for(function: HostFunction) -> (Box<FunctionEnv>, Arc<NativeLibrary>) {
        let library = Arc::new(fake_library());
        let handle = registry().register(function);
        (Box::new(FunctionEnv::new(handle, Arc::clone(&library))), library)
    }

    fn call(function_env: &FunctionEnv, args: &[u8]) -> Result<Vec<u8>, String> {
        let mut env = SvmEnv {
            inner_env: ptr::null(),
            host_env: function_env.as_host_env(),
        };
        let args = Buffer::clone_into(function_env.library.as_ref(), args).unwrap();
        let mut results = RawBuffer::empty();

        let error = unsafe { svm_trampoline(&mut env, &args.as_raw(), &mut results) };
        if !error.is_null() {
            return Err(unsafe { destroy_wasm_error(error) });
        }
        let results = unsafe { Buffer::adopt(function_env.library.as_ref(), results) }.unwrap();
        Ok(results.to_vec())
    }

    fn add() -> HostFunction {
        HostFunction::new(
            "host",
            "add",
            vec![ValueType::I32, ValueType::I32],
            vec![ValueType::I32],
            |args| match args {
                [Value::I32(a), Value::I32(b)] => Ok(vec![Value::I32(a + b)]),
                _ => anyhow::bail!("bad arguments"),
            },
        )
    }

    #[test]
    fn test_trampoline_dispatches() {
        let (function_env, _library) = env_for(add());

        let args = value::encode_values(&[Value::I32(3), Value::I32(5)]).unwrap();
        let results = call(&function_env, &args).unwrap();
        assert_eq!(value::decode_values(&results).unwrap(), vec![Value::I32(8)]);

        registry().unregister(function_env.handle);
        assert_eq!(live_allocations(), 0);
    }

    #[test]
    fn test_trampoline_stale_handle() {
        let (function_env, _library) = env_for(add());
        registry().unregister(function_env.handle);

        let args = value::encode_values(&[Value::I32(1), Value::I32(1)]).unwrap();
        let message = call(&function_env, &args).unwrap_err();
        assert!(message.starts_with("Host function handle not found"));
        assert_eq!(live_allocations(), 0);
    }

    #[test]
    fn test_trampoline_catches_panic() {
        let (function_env, _library) = env_for(HostFunction::new(
            "host",
            "explode",
            vec![],
            vec![],
            |_| panic!("kaboom"),
        ));

        let message = call(&function_env, &[]).unwrap_err();
        assert_eq!(message, "Host function panicked: kaboom");

        registry().unregister(function_env.handle);
        assert_eq!(live_allocations(), 0);
    }

    #[test]
    fn test_trampoline_reports_bad_args() {
        let (function_env, _library) = env_for(add());

        let message = call(&function_env, &[1, 0x7f]).unwrap_err();
        assert!(message.contains("Unknown value type tag"));

        registry().unregister(function_env.handle);
        assert_eq!(live_allocations(), 0);
    }

    unsafe extern "C" fn exhausted_byte_array_new(_length: u32) -> RawBuffer {
        RawBuffer::empty()
    }

    #[test]
    fn test_trampoline_results_allocation_fails() {
        let library = Arc::new(NativeLibrary::from_api(NativeApi {
            byte_array_new: exhausted_byte_array_new,
            ..*fake_library().api()
        }));
        let handle = registry().register(HostFunction::new(
            "host",
            "answer",
            vec![],
            vec![ValueType::I32],
            |_| Ok(vec![Value::I32(42)]),
        ));
        let function_env = FunctionEnv::new(handle, Arc::clone(&library));

        let mut env = SvmEnv {
            inner_env: ptr::null(),
            host_env: function_env.as_host_env(),
        };
        let mut results = RawBuffer::empty();
        let error = unsafe { svm_trampoline(&mut env, ptr::null(), &mut results) };

        assert!(!error.is_null());
        let message = unsafe { destroy_wasm_error(error) };
        assert!(message.starts_with("Buffer error:"));
        assert!(message.contains("native library allocator failed"));
        assert!(results.is_null());

        registry().unregister(handle);
        assert_eq!(live_allocations(), 0);
    }

    /// Runs the trampoline in a child test process selected by
    /// `NULL_ENV_CHILD` and expects the child to abort.
    fn assert_child_aborts(test: &str, mode: &str) {
        let output = Command::new(env::current_exe().unwrap())
            .args(["--exact", test, "--test-threads=1", "--nocapture"])
            .env(NULL_ENV_CHILD, mode)
            .output()
            .unwrap();
        assert!(!output.status.success());
        assert!(!String::from_utf8_lossy(&output.stdout).contains("test result: ok"));
    }

    #[test]
    fn test_trampoline_null_env_aborts() {
        if env::var(NULL_ENV_CHILD).as_deref() == Ok("env") {
            let mut results = RawBuffer::empty();
            unsafe { svm_trampoline(ptr::null_mut(), ptr::null(), &mut results) };
            return;
        }
        assert_child_aborts("trampoline::tests::test_trampoline_null_env_aborts", "env");
    }

    #[test]
    fn test_trampoline_null_host_env_aborts() {
        if env::var(NULL_ENV_CHILD).as_deref() == Ok("host_env") {
            let mut env = SvmEnv {
                inner_env: ptr::null(),
                host_env: ptr::null(),
            };
            let mut results = RawBuffer::empty();
            unsafe { svm_trampoline(&mut env, ptr::null(), &mut results) };
            return;
        }
        assert_child_aborts(
            "trampoline::tests::test_trampoline_null_host_env_aborts",
            "host_env",
        );
    }
}
