//! Codec fixtures for tests.
//!
//! [`CODEC_WAT`] implements the buffer protocol with a bump allocator. Its
//! encoders wrap the request as hex inside the expected response object, and
//! its decoders unwrap that hex again, so every encode has a matching decode:
//!
//! - `wasm_encode_calldata`: request → `{"calldata":"<hex(request)>"}`
//! - `wasm_decode_calldata`: `{"calldata":"<hex>"}` → the decoded bytes
//! - `wasm_encode_{deploy_template,spawn_app,exec_app}`: request →
//!   `{"data":"<hex(request)>"}`
//! - `wasm_decode_receipt`: `{"data":"<hex>"}` → the decoded bytes, so a raw
//!   receipt given as JSON comes back as that JSON
//!
//! Fault exports exercise the error paths: `wasm_fail` (Err marker, message
//! `boom`), `wasm_bad_marker` (marker 7), `wasm_empty` (no marker byte),
//! `wasm_oob` (buffer outside memory) and `wasm_trap` (`unreachable`).
//! `wasm_echo` answers Ok with the request unchanged.
//!
//! Buffer layout: `ptr` holds `[data_offset: i32, length: i32]` followed by
//! the data.

/// A working codec module.
pub const CODEC_WAT: &str = r#"
(module
  (memory (export "memory") 2)
  (global $heap (mut i32) (i32.const 1024))

  (data (i32.const 0) "0123456789abcdef")
  (data (i32.const 16) "{\"data\":\"")
  (data (i32.const 32) "{\"calldata\":\"")
  (data (i32.const 48) "boom")

  (func $alloc (export "wasm_alloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local $end i32)
    (local $have i32)
    (local.set $ptr (global.get $heap))
    ;; header (8 bytes) + data, rounded up to 8
    (local.set $end
      (i32.and
        (i32.add (i32.add (local.get $ptr) (local.get $size)) (i32.const 15))
        (i32.const -8)))
    (local.set $have (i32.mul (memory.size) (i32.const 65536)))
    (if (i32.gt_u (local.get $end) (local.get $have))
      (then
        (if (i32.eq
              (memory.grow
                (i32.shr_u
                  (i32.add (i32.sub (local.get $end) (local.get $have)) (i32.const 65535))
                  (i32.const 16)))
              (i32.const -1))
          (then unreachable))))
    (i32.store (local.get $ptr) (i32.add (local.get $ptr) (i32.const 8)))
    (i32.store offset=4 (local.get $ptr) (local.get $size))
    (global.set $heap (local.get $end))
    (local.get $ptr))

  (func $length (export "wasm_buffer_length") (param $ptr i32) (result i32)
    (i32.load offset=4 (local.get $ptr)))

  (func $data (export "wasm_buffer_data") (param $ptr i32) (result i32)
    (i32.load (local.get $ptr)))

  (func $respond (param $marker i32) (param $src i32) (param $len i32) (result i32)
    (local $ptr i32)
    (local $dst i32)
    (local.set $ptr (call $alloc (i32.add (local.get $len) (i32.const 1))))
    (local.set $dst (call $data (local.get $ptr)))
    (i32.store8 (local.get $dst) (local.get $marker))
    (memory.copy (i32.add (local.get $dst) (i32.const 1)) (local.get $src) (local.get $len))
    (local.get $ptr))

  (func $hex_encode (param $src i32) (param $len i32) (param $dst i32)
    (local $i i32)
    (local $b i32)
    (block $encoded
      (loop $each
        (br_if $encoded (i32.ge_u (local.get $i) (local.get $len)))
        (local.set $b (i32.load8_u (i32.add (local.get $src) (local.get $i))))
        (i32.store8
          (i32.add (local.get $dst) (i32.shl (local.get $i) (i32.const 1)))
          (i32.load8_u (i32.shr_u (local.get $b) (i32.const 4))))
        (i32.store8 offset=1
          (i32.add (local.get $dst) (i32.shl (local.get $i) (i32.const 1)))
          (i32.load8_u (i32.and (local.get $b) (i32.const 15))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $each))))

  (func $unhex (param $c i32) (result i32)
    (if (result i32) (i32.ge_u (local.get $c) (i32.const 97))
      (then (i32.sub (local.get $c) (i32.const 87)))
      (else
        (if (result i32) (i32.ge_u (local.get $c) (i32.const 65))
          (then (i32.sub (local.get $c) (i32.const 55)))
          (else (i32.sub (local.get $c) (i32.const 48)))))))

  ;; Ok envelope holding prefix ++ hex(request) ++ "}
  (func $wrap (param $prefix i32) (param $prefix_len i32) (param $ptr i32) (result i32)
    (local $src i32)
    (local $len i32)
    (local $out i32)
    (local $dst i32)
    (local.set $src (call $data (local.get $ptr)))
    (local.set $len (call $length (local.get $ptr)))
    (local.set $out
      (call $alloc
        (i32.add
          (i32.add (local.get $prefix_len) (i32.shl (local.get $len) (i32.const 1)))
          (i32.const 3))))
    (local.set $dst (call $data (local.get $out)))
    (i32.store8 (local.get $dst) (i32.const 1))
    (local.set $dst (i32.add (local.get $dst) (i32.const 1)))
    (memory.copy (local.get $dst) (local.get $prefix) (local.get $prefix_len))
    (local.set $dst (i32.add (local.get $dst) (local.get $prefix_len)))
    (call $hex_encode (local.get $src) (local.get $len) (local.get $dst))
    (local.set $dst (i32.add (local.get $dst) (i32.shl (local.get $len) (i32.const 1))))
    (i32.store8 (local.get $dst) (i32.const 34))
    (i32.store8 offset=1 (local.get $dst) (i32.const 125))
    (local.get $out))

  ;; Ok envelope holding the bytes of the hex string that starts `skip`
  ;; bytes into the request and ends at the next quote
  (func $unwrap (param $skip i32) (param $ptr i32) (result i32)
    (local $src i32)
    (local $limit i32)
    (local $i i32)
    (local $n i32)
    (local $out i32)
    (local $dst i32)
    (local.set $src (i32.add (call $data (local.get $ptr)) (local.get $skip)))
    (local.set $limit (i32.sub (call $length (local.get $ptr)) (local.get $skip)))
    (block $scanned
      (loop $scan
        (br_if $scanned (i32.ge_s (local.get $i) (local.get $limit)))
        (br_if $scanned
          (i32.eq (i32.load8_u (i32.add (local.get $src) (local.get $i))) (i32.const 34)))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $scan)))
    (local.set $n (i32.shr_u (local.get $i) (i32.const 1)))
    (local.set $out (call $alloc (i32.add (local.get $n) (i32.const 1))))
    (local.set $dst (call $data (local.get $out)))
    (i32.store8 (local.get $dst) (i32.const 1))
    (local.set $dst (i32.add (local.get $dst) (i32.const 1)))
    (local.set $i (i32.const 0))
    (block $copied
      (loop $copy
        (br_if $copied (i32.ge_u (local.get $i) (local.get $n)))
        (i32.store8
          (i32.add (local.get $dst) (local.get $i))
          (i32.or
            (i32.shl
              (call $unhex
                (i32.load8_u
                  (i32.add (local.get $src) (i32.shl (local.get $i) (i32.const 1)))))
              (i32.const 4))
            (call $unhex
              (i32.load8_u offset=1
                (i32.add (local.get $src) (i32.shl (local.get $i) (i32.const 1)))))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $copy)))
    (local.get $out))

  (func (export "wasm_encode_calldata") (param i32) (result i32)
    (call $wrap (i32.const 32) (i32.const 13) (local.get 0)))

  (func (export "wasm_decode_calldata") (param i32) (result i32)
    (call $unwrap (i32.const 13) (local.get 0)))

  (func (export "wasm_encode_deploy_template") (param i32) (result i32)
    (call $wrap (i32.const 16) (i32.const 9) (local.get 0)))

  (func (export "wasm_encode_spawn_app") (param i32) (result i32)
    (call $wrap (i32.const 16) (i32.const 9) (local.get 0)))

  (func (export "wasm_encode_exec_app") (param i32) (result i32)
    (call $wrap (i32.const 16) (i32.const 9) (local.get 0)))

  (func (export "wasm_decode_receipt") (param i32) (result i32)
    (call $unwrap (i32.const 9) (local.get 0)))

  (func (export "wasm_echo") (param i32) (result i32)
    (call $respond
      (i32.const 1)
      (call $data (local.get 0))
      (call $length (local.get 0))))

  (func (export "wasm_fail") (param i32) (result i32)
    (call $respond (i32.const 0) (i32.const 48) (i32.const 4)))

  (func (export "wasm_bad_marker") (param i32) (result i32)
    (call $respond (i32.const 7) (i32.const 48) (i32.const 4)))

  (func (export "wasm_empty") (param i32) (result i32)
    (call $alloc (i32.const 0)))

  (func (export "wasm_oob") (param i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (call $alloc (i32.const 0)))
    (i32.store (local.get $ptr) (i32.const 0x7fff0000))
    (i32.store offset=4 (local.get $ptr) (i32.const 16))
    (local.get $ptr))

  (func (export "wasm_trap") (param i32) (result i32)
    unreachable)
)
"#;

/// A codec whose allocator reports one byte more than requested.
pub const BAD_ALLOC_CODEC_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))

  (func (export "wasm_alloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (i32.store (local.get $ptr) (i32.add (local.get $ptr) (i32.const 8)))
    (i32.store offset=4 (local.get $ptr) (i32.add (local.get $size) (i32.const 1)))
    (global.set $heap
      (i32.add (i32.add (local.get $ptr) (i32.const 16)) (local.get $size)))
    (local.get $ptr))

  (func (export "wasm_buffer_length") (param $ptr i32) (result i32)
    (i32.load offset=4 (local.get $ptr)))

  (func (export "wasm_buffer_data") (param $ptr i32) (result i32)
    (i32.load (local.get $ptr)))

  (func (export "wasm_decode_receipt") (param i32) (result i32)
    (local.get 0))
)
"#;
