//! The guest buffer protocol.
//!
//! Payloads move into and out of guest linear memory through buffers the
//! guest allocates itself:
//!
//! ```text
//! host                                  guest
//!  │ wasm_alloc(n) ──────────────────────▶ ptr
//!  │ wasm_buffer_length(ptr) ────────────▶ n      (must match)
//!  │ wasm_buffer_data(ptr) ──────────────▶ offset (bounds-checked)
//!  │ memory[offset..offset+n] ◀── request bytes
//!  │ transform(ptr) ─────────────────────▶ result ptr
//!  │ memory[data..data+len] ──▶ [marker | payload]
//! ```
//!
//! Guest buffers belong to the guest. The host never frees them; the
//! instance and everything it allocated go away together.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use svm_bridge_core::{AllocatorKind, GuestLimits};
use tracing::{debug, trace, warn};
use wasmtime::{Instance, Memory, Store, StoreLimits, StoreLimitsBuilder, TypedFunc};

use crate::engine::CodecEngine;
use crate::error::{GuestError, GuestResult, TrapInfo};
use crate::module::{
    ALLOC_EXPORT, BUFFER_DATA_EXPORT, BUFFER_LENGTH_EXPORT, CodecModule, MEMORY_EXPORT,
};

/// Response marker for success.
pub const OK_MARKER: u8 = 1;
/// Response marker for a domain error.
pub const ERR_MARKER: u8 = 0;

/// An offset into guest linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuestPtr(pub u32);

impl fmt::Display for GuestPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A buffer allocated by the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestBuffer {
    /// Pointer returned by `wasm_alloc`.
    pub ptr: GuestPtr,
    /// Offset of the first data byte.
    pub data_offset: u32,
    /// Number of data bytes.
    pub length: u32,
}

impl GuestBuffer {
    /// Guest buffers are always owned by the guest.
    pub fn allocator_kind(&self) -> AllocatorKind {
        AllocatorKind::Guest
    }
}

struct GuestState {
    limits: StoreLimits,
}

/// One instantiation of a codec module.
pub struct GuestInstance {
    store: Store<GuestState>,
    instance: Instance,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    buffer_length: TypedFunc<i32, i32>,
    buffer_data: TypedFunc<i32, i32>,
}

impl GuestInstance {
    /// Instantiate `module` with the given limits.
    pub fn new(engine: &CodecEngine, module: &CodecModule, limits: &GuestLimits) -> GuestResult<Self> {
        let store_limits = StoreLimitsBuilder::new()
            .memory_size(limits.max_memory_bytes)
            .instances(1)
            .build();

        let mut store = Store::new(
            engine.inner(),
            GuestState {
                limits: store_limits,
            },
        );
        store.limiter(|state| &mut state.limits);

        if engine.fuel_enabled() {
            store.set_fuel(limits.initial_fuel.unwrap_or(u64::MAX))?;
        }

        let instance = Instance::new(&mut store, module.inner(), &[]).map_err(map_call_error)?;

        let memory = instance
            .get_memory(&mut store, MEMORY_EXPORT)
            .ok_or_else(|| GuestError::MissingExport(MEMORY_EXPORT.to_string()))?;
        let alloc = typed_export(&instance, &mut store, ALLOC_EXPORT)?;
        let buffer_length = typed_export(&instance, &mut store, BUFFER_LENGTH_EXPORT)?;
        let buffer_data = typed_export(&instance, &mut store, BUFFER_DATA_EXPORT)?;

        Ok(Self {
            store,
            instance,
            memory,
            alloc,
            buffer_length,
            buffer_data,
        })
    }

    /// Current linear memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    /// Ask the guest for a buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// [`GuestError::AllocationSizeMismatch`] if the guest reports a
    /// different length, [`GuestError::MemoryOutOfBounds`] if the buffer
    /// does not fit in linear memory.
    pub fn alloc(&mut self, size: u32) -> GuestResult<GuestBuffer> {
        let request = i32::try_from(size).map_err(|_| GuestError::RequestTooLarge(size as usize))?;
        let ptr = GuestPtr(call_primitive(&mut self.store, &self.alloc, request)? as u32);

        let allocated = call_primitive(&mut self.store, &self.buffer_length, ptr.0 as i32)? as u32;
        if allocated != size {
            warn!(requested = size, allocated, "Guest allocator size mismatch");
            return Err(GuestError::AllocationSizeMismatch {
                requested: size,
                allocated,
            });
        }

        let data_offset = call_primitive(&mut self.store, &self.buffer_data, ptr.0 as i32)? as u32;
        self.check_bounds(data_offset, size)?;

        trace!(%ptr, data_offset, len = size, "Allocated guest buffer");

        Ok(GuestBuffer {
            ptr,
            data_offset,
            length: size,
        })
    }

    /// Copy `bytes` into a fresh guest buffer.
    pub fn write_buffer(&mut self, bytes: &[u8]) -> GuestResult<GuestPtr> {
        let size = u32::try_from(bytes.len()).map_err(|_| GuestError::RequestTooLarge(bytes.len()))?;
        let buffer = self.alloc(size)?;

        let start = buffer.data_offset as usize;
        self.memory.data_mut(&mut self.store)[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(buffer.ptr)
    }

    /// Copy the contents of the guest buffer at `ptr` out of linear memory.
    pub fn read_buffer(&mut self, ptr: GuestPtr) -> GuestResult<Vec<u8>> {
        let length = call_primitive(&mut self.store, &self.buffer_length, ptr.0 as i32)? as u32;
        let data_offset = call_primitive(&mut self.store, &self.buffer_data, ptr.0 as i32)? as u32;
        self.check_bounds(data_offset, length)?;

        let start = data_offset as usize;
        let bytes = self.memory.data(&self.store)[start..start + length as usize].to_vec();
        Ok(bytes)
    }

    /// Invoke a transform export `(i32) -> i32` on a request buffer.
    pub fn call(&mut self, export: &str, ptr: GuestPtr) -> GuestResult<GuestPtr> {
        let func = typed_export(&self.instance, &mut self.store, export)?;
        let result = call_primitive(&mut self.store, &func, ptr.0 as i32)?;
        Ok(GuestPtr(result as u32))
    }

    /// Run one request/response cycle against `export`.
    ///
    /// The request is serialized to JSON, transferred in, transformed, and
    /// the response envelope is read back and deserialized.
    pub fn call_json<Req, Resp>(&mut self, export: &str, request: &Req) -> GuestResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let bytes =
            serde_json::to_vec(request).map_err(|e| GuestError::MalformedRequest(e.to_string()))?;
        let response = self.call_raw(export, &bytes)?;
        serde_json::from_slice(&response).map_err(|e| {
            warn!(export, error = %e, "Malformed codec response");
            GuestError::MalformedResponse(e.to_string())
        })
    }

    /// Run one request/response cycle with raw bytes and return the Ok
    /// payload.
    pub fn call_raw(&mut self, export: &str, request: &[u8]) -> GuestResult<Vec<u8>> {
        debug!(export, len = request.len(), "Calling codec export");

        let input = self.write_buffer(request)?;
        let output = self.call(export, input)?;
        let envelope = self.read_buffer(output)?;
        let payload = parse_response(&envelope)?;
        Ok(payload.to_vec())
    }

    /// Remaining fuel, when the engine meters fuel.
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }

    fn check_bounds(&self, offset: u32, length: u32) -> GuestResult<()> {
        let memory_size = self.memory_size();
        let in_bounds = (offset as usize)
            .checked_add(length as usize)
            .is_some_and(|end| end <= memory_size);

        if !in_bounds {
            warn!(offset, length, memory_size, "Guest buffer out of bounds");
            return Err(GuestError::MemoryOutOfBounds {
                offset,
                length,
                memory_size,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for GuestInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestInstance")
            .field("memory_size", &self.memory_size())
            .finish()
    }
}

/// Split a response envelope into its payload.
///
/// # Errors
///
/// [`GuestError::Domain`] carries the message of an Err envelope verbatim.
/// Empty envelopes and unknown markers are fatal protocol violations.
pub fn parse_response(envelope: &[u8]) -> GuestResult<&[u8]> {
    let (&marker, payload) = envelope.split_first().ok_or_else(|| {
        warn!("Empty codec response");
        GuestError::EmptyResponse
    })?;

    match marker {
        OK_MARKER => Ok(payload),
        ERR_MARKER => Err(GuestError::Domain(
            String::from_utf8_lossy(payload).into_owned(),
        )),
        other => {
            warn!(marker = other, "Invalid codec response marker");
            Err(GuestError::InvalidMarker(other))
        }
    }
}

fn typed_export(
    instance: &Instance,
    store: &mut Store<GuestState>,
    name: &str,
) -> GuestResult<TypedFunc<i32, i32>> {
    instance
        .get_typed_func::<i32, i32>(store, name)
        .map_err(|_| GuestError::MissingExport(name.to_string()))
}

fn call_primitive(
    store: &mut Store<GuestState>,
    func: &TypedFunc<i32, i32>,
    arg: i32,
) -> GuestResult<i32> {
    func.call(store, arg).map_err(map_call_error)
}

fn map_call_error(err: wasmtime::Error) -> GuestError {
    if let Some(trap) = err.downcast_ref::<wasmtime::Trap>() {
        warn!(trap = ?trap, "Codec guest trapped");
        return GuestError::Trap(TrapInfo::from(*trap));
    }
    GuestError::Wasmtime(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CodecEngine, IntoShared, SharedEngine};
    use crate::module::ModuleLoader;
    use crate::testing::{BAD_ALLOC_CODEC_WAT, CODEC_WAT};
    use svm_bridge_core::EngineConfig;

    fn instance_of(wat: &str) -> GuestInstance {
        let engine = CodecEngine::default_engine().unwrap().into_shared();
        instance_with(engine, wat, &GuestLimits::minimal())
    }

    fn instance_with(engine: SharedEngine, wat: &str, limits: &GuestLimits) -> GuestInstance {
        let module = ModuleLoader::new(engine.clone()).load_wat(wat).unwrap();
        GuestInstance::new(&engine, &module, limits).unwrap()
    }

    #[test]
    fn test_alloc_reports_requested_length() {
        let mut guest = instance_of(CODEC_WAT);

        for size in [0u32, 1, 17, 4096, 200_000] {
            let buffer = guest.alloc(size).unwrap();
            assert_eq!(buffer.length, size);
            assert_eq!(buffer.allocator_kind(), AllocatorKind::Guest);
            assert!(buffer.data_offset as usize + size as usize <= guest.memory_size());
        }
    }

    #[test]
    fn test_lying_allocator_is_fatal() {
        let mut guest = instance_of(BAD_ALLOC_CODEC_WAT);

        let err = guest.alloc(8).unwrap_err();
        assert!(matches!(
            err,
            GuestError::AllocationSizeMismatch {
                requested: 8,
                allocated: 9
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_write_then_read() {
        let mut guest = instance_of(CODEC_WAT);

        let ptr = guest.write_buffer(b"hello guest").unwrap();
        assert_eq!(guest.read_buffer(ptr).unwrap(), b"hello guest");
    }

    #[test]
    fn test_echo_round_trip() {
        let mut guest = instance_of(CODEC_WAT);

        let payload = guest.call_raw("wasm_echo", b"{\"x\":1}").unwrap();
        assert_eq!(payload, b"{\"x\":1}");
    }

    #[test]
    fn test_err_marker_is_domain_error() {
        let mut guest = instance_of(CODEC_WAT);

        let err = guest.call_raw("wasm_fail", b"{}").unwrap_err();
        assert!(matches!(&err, GuestError::Domain(msg) if msg == "boom"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_invalid_marker_is_fatal() {
        let mut guest = instance_of(CODEC_WAT);

        let err = guest.call_raw("wasm_bad_marker", b"{}").unwrap_err();
        assert!(matches!(err, GuestError::InvalidMarker(7)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_response_is_fatal() {
        let mut guest = instance_of(CODEC_WAT);

        let err = guest.call_raw("wasm_empty", b"{}").unwrap_err();
        assert!(matches!(err, GuestError::EmptyResponse));
    }

    #[test]
    fn test_out_of_bounds_response() {
        let mut guest = instance_of(CODEC_WAT);

        let err = guest.call_raw("wasm_oob", b"{}").unwrap_err();
        assert!(matches!(err, GuestError::MemoryOutOfBounds { length: 16, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_trap_is_reported() {
        let mut guest = instance_of(CODEC_WAT);

        let err = guest.call_raw("wasm_trap", b"{}").unwrap_err();
        let GuestError::Trap(info) = err else {
            panic!("Expected trap, got {err:?}");
        };
        assert_eq!(info.code.as_deref(), Some("UnreachableCodeReached"));
    }

    #[test]
    fn test_missing_transform_export() {
        let mut guest = instance_of(CODEC_WAT);

        let err = guest.call_raw("wasm_does_not_exist", b"{}").unwrap_err();
        assert!(matches!(err, GuestError::MissingExport(name) if name == "wasm_does_not_exist"));
    }

    #[test]
    fn test_malformed_json_response_is_fatal() {
        let mut guest = instance_of(CODEC_WAT);

        // Echo returns the request itself, which is not a `u64`.
        let err = guest.call_json::<_, u64>("wasm_echo", &["a"]).unwrap_err();
        assert!(matches!(err, GuestError::MalformedResponse(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_memory_limit_enforced() {
        let engine = CodecEngine::default_engine().unwrap().into_shared();
        let limits = GuestLimits::new().with_max_memory(2 * 64 * 1024);
        let mut guest = instance_with(engine, CODEC_WAT, &limits);

        // The guest cannot grow past two pages and traps instead.
        let err = guest.alloc(256 * 1024).unwrap_err();
        assert!(matches!(err, GuestError::Trap(_)));
    }

    #[test]
    fn test_fuel_applied() {
        let engine = CodecEngine::new(EngineConfig::default().with_fuel(true))
            .unwrap()
            .into_shared();
        let mut guest = instance_with(engine, CODEC_WAT, &GuestLimits::minimal());

        let before = guest.remaining_fuel().unwrap();
        guest.call_raw("wasm_echo", b"[1,2,3]").unwrap();
        assert!(guest.remaining_fuel().unwrap() < before);
    }

    #[test]
    fn test_parse_response() {
        assert_eq!(parse_response(&[OK_MARKER, b'h', b'i']).unwrap(), b"hi");
        assert_eq!(parse_response(&[OK_MARKER]).unwrap(), b"");
        assert!(matches!(
            parse_response(&[ERR_MARKER, 0xff, b'x']),
            Err(GuestError::Domain(msg)) if msg == "\u{fffd}x"
        ));
        assert!(matches!(parse_response(&[]), Err(GuestError::EmptyResponse)));
        assert!(matches!(parse_response(&[2]), Err(GuestError::InvalidMarker(2))));
    }
}
