//! Owned byte buffers tagged with the allocator that produced them.
//!
//! Every payload that crosses a boundary travels as a [`Buffer`]. A buffer
//! carries a reference to its [`Allocator`] and is released through exactly
//! that allocator, either explicitly via [`Buffer::release`] or when dropped.
//! Because release consumes the buffer, freeing the same memory twice or
//! through the wrong allocator cannot be expressed.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr;
use std::slice;

use tracing::trace;

use crate::error::{BufferError, BufferResult};

/// The allocator that owns a buffer's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
    /// The host's own heap.
    Caller,
    /// The native library's allocator, released with `svm_byte_array_destroy`.
    NativeLibrary,
    /// The WASM guest's allocator, inside its linear memory.
    Guest,
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller => write!(f, "caller"),
            Self::NativeLibrary => write!(f, "native library"),
            Self::Guest => write!(f, "guest"),
        }
    }
}

/// C layout of a byte buffer as exchanged with the native library
/// (`svm_byte_array`).
///
/// A `RawBuffer` is a plain view: it neither owns nor frees anything.
/// Ownership lives in [`Buffer`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawBuffer {
    /// Pointer to the first byte, or null for an empty buffer.
    pub bytes: *const u8,
    /// Number of initialized bytes.
    pub length: u32,
    /// Number of allocated bytes.
    pub capacity: u32,
}

impl RawBuffer {
    /// An empty buffer, used as an out-parameter slot.
    pub const fn empty() -> Self {
        Self {
            bytes: ptr::null(),
            length: 0,
            capacity: 0,
        }
    }

    /// Whether the buffer points at nothing.
    pub fn is_null(&self) -> bool {
        self.bytes.is_null()
    }

    /// Borrow the initialized bytes.
    ///
    /// # Safety
    ///
    /// `bytes` must point to at least `length` readable bytes that stay valid
    /// and unmodified for `'a`.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        if self.bytes.is_null() || self.length == 0 {
            return &[];
        }
        // SAFETY: upheld by the caller.
        unsafe { slice::from_raw_parts(self.bytes, self.length as usize) }
    }
}

impl Default for RawBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

/// An allocator that can hand out and take back [`RawBuffer`]s.
///
/// # Safety
///
/// `allocate` must return a buffer whose `bytes` point to `capacity` writable
/// bytes (or null with zero capacity), with `length <= capacity`. `release`
/// must accept every buffer `allocate` returned, exactly once.
pub unsafe trait Allocator: Send + Sync {
    /// Which allocator this is.
    fn kind(&self) -> AllocatorKind;

    /// Allocate a zero-filled region of `size` bytes with `length == size`.
    fn allocate(&self, size: usize) -> BufferResult<RawBuffer>;

    /// Return a buffer to this allocator.
    ///
    /// # Safety
    ///
    /// `raw` must have been produced by this allocator and not released yet.
    unsafe fn release(&self, raw: RawBuffer);
}

/// The host heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallerAllocator;

/// Shared instance of the host heap allocator.
pub static CALLER_ALLOCATOR: CallerAllocator = CallerAllocator;

unsafe impl Allocator for CallerAllocator {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Caller
    }

    fn allocate(&self, size: usize) -> BufferResult<RawBuffer> {
        let failed = || BufferError::AllocationFailed {
            allocator: AllocatorKind::Caller,
            size,
        };

        let capacity = u32::try_from(size).map_err(|_| failed())?;
        if capacity == 0 {
            return Ok(RawBuffer::empty());
        }

        let layout = Layout::array::<u8>(size).map_err(|_| failed())?;
        // SAFETY: layout has a non-zero size.
        let bytes = unsafe { alloc::alloc_zeroed(layout) };
        if bytes.is_null() {
            return Err(failed());
        }

        Ok(RawBuffer {
            bytes,
            length: capacity,
            capacity,
        })
    }

    unsafe fn release(&self, raw: RawBuffer) {
        if raw.bytes.is_null() || raw.capacity == 0 {
            return;
        }
        if let Ok(layout) = Layout::array::<u8>(raw.capacity as usize) {
            // SAFETY: `raw` came from `allocate` with this exact layout.
            unsafe { alloc::dealloc(raw.bytes as *mut u8, layout) };
        }
    }
}

/// An owned byte region released through the allocator that produced it.
pub struct Buffer<'a> {
    raw: RawBuffer,
    allocator: &'a dyn Allocator,
}

impl<'a> Buffer<'a> {
    /// Allocate `size` zero-filled bytes from `allocator`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::AllocationFailed`] if the allocator rejects the
    /// request or hands back less than was asked for.
    pub fn allocate(allocator: &'a dyn Allocator, size: usize) -> BufferResult<Self> {
        let raw = allocator.allocate(size)?;

        if (raw.capacity as usize) < size || (size > 0 && raw.bytes.is_null()) {
            // SAFETY: the allocator just produced `raw`.
            unsafe { allocator.release(raw) };
            return Err(BufferError::AllocationFailed {
                allocator: allocator.kind(),
                size,
            });
        }

        trace!(allocator = %allocator.kind(), size, "Allocated buffer");

        Ok(Self {
            raw: RawBuffer {
                length: size as u32,
                ..raw
            },
            allocator,
        })
    }

    /// Copy `bytes` into a fresh buffer owned by `allocator`.
    pub fn clone_into(allocator: &'a dyn Allocator, bytes: &[u8]) -> BufferResult<Self> {
        let mut buffer = Self::allocate(allocator, bytes.len())?;
        buffer.view_mut().copy_from_slice(bytes);
        Ok(buffer)
    }

    /// Take ownership of a buffer produced by foreign code.
    ///
    /// A buffer that violates `length <= capacity` is released immediately
    /// and reported as an error.
    ///
    /// # Safety
    ///
    /// `raw` must have been allocated by `allocator`, must not be owned by
    /// anything else, and must not be released elsewhere.
    pub unsafe fn adopt(allocator: &'a dyn Allocator, raw: RawBuffer) -> BufferResult<Self> {
        if raw.length > raw.capacity {
            // SAFETY: upheld by the caller.
            unsafe { allocator.release(raw) };
            return Err(BufferError::LengthExceedsCapacity {
                length: raw.length,
                capacity: raw.capacity,
            });
        }
        Ok(Self { raw, allocator })
    }

    /// Borrow the buffer's bytes.
    pub fn view(&self) -> &[u8] {
        // SAFETY: we own `raw` and `length <= capacity` holds.
        unsafe { self.raw.as_slice() }
    }

    fn view_mut(&mut self) -> &mut [u8] {
        if self.raw.bytes.is_null() || self.raw.length == 0 {
            return &mut [];
        }
        // SAFETY: we own `raw` exclusively and it is writable.
        unsafe { slice::from_raw_parts_mut(self.raw.bytes as *mut u8, self.raw.length as usize) }
    }

    /// The C view of this buffer, valid while `self` lives.
    ///
    /// Native entry points take buffers by value but only read them; the
    /// returned struct must not outlive the buffer.
    pub fn as_raw(&self) -> RawBuffer {
        self.raw
    }

    /// Hand the buffer to foreign code without releasing it.
    ///
    /// The receiver becomes responsible for releasing it through the same
    /// allocator.
    pub fn into_raw(self) -> RawBuffer {
        let this = std::mem::ManuallyDrop::new(self);
        this.raw
    }

    /// Copy the contents into host-owned memory.
    pub fn to_vec(&self) -> Vec<u8> {
        self.view().to_vec()
    }

    /// Number of initialized bytes.
    pub fn len(&self) -> usize {
        self.raw.length as usize
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.raw.length == 0
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.raw.capacity as usize
    }

    /// The owning allocator.
    pub fn allocator_kind(&self) -> AllocatorKind {
        self.allocator.kind()
    }

    /// Release the buffer through its owning allocator.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Buffer<'_> {
    fn drop(&mut self) {
        trace!(allocator = %self.allocator.kind(), len = self.raw.length, "Releasing buffer");
        // SAFETY: `raw` came from `allocator` and drop runs once.
        unsafe { self.allocator.release(self.raw) };
    }
}

impl fmt::Debug for Buffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("allocator", &self.allocator.kind())
            .field("length", &self.raw.length)
            .field("capacity", &self.raw.capacity)
            .finish()
    }
}
