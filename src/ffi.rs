//! C ABI over opaque structure handles.
//!
//! Handles are the address of a boxed [`LpmTrie`] or [`ExactHashTable`],
//! widened to `u64`; `0` is never a valid handle. Input buffers are copied
//! into owned blocks and never retained. Lookup results are copied into a
//! fresh [`OffheapBuffer`] that the caller releases with
//! [`offheap_buffer_free`].
//!
//! Argument validation happens here so the structures keep their
//! precondition-based contracts: masks outside `0..=32` and non-positive
//! capacities are rejected with [`OffheapStatus::InvalidArgument`].

use std::alloc::{alloc, Layout};
use std::num::NonZeroUsize;
use std::ptr;

use tracing::warn;

use crate::error::{Error, Result};
use crate::hash::ExactHashTable;
use crate::trie::{LpmTrie, KEY_BITS};
use crate::value::ValueBlock;

/// Opaque handle to an [`LpmTrie`].
pub type TrieHandle = u64;

/// Opaque handle to an [`ExactHashTable`].
pub type HtableHandle = u64;

/// Outcome of a boundary call.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffheapStatus {
    /// The call succeeded.
    Ok = 0,
    /// An owning allocation could not be satisfied.
    OutOfMemory = 1,
    /// A primitive expected to succeed failed, e.g. an unreadable buffer.
    UnexpectedOperation = 2,
    /// A mask, capacity, or handle was rejected.
    InvalidArgument = 3,
}

impl From<&Error> for OffheapStatus {
    fn from(e: &Error) -> Self {
        match e {
            Error::OutOfMemory { .. } => OffheapStatus::OutOfMemory,
            Error::InvalidPrefixLength(_) | Error::InvalidCapacity(_) | Error::InvalidAddress(_) => {
                OffheapStatus::InvalidArgument
            }
            Error::UnexpectedOperation(_) | Error::MalformedRecord { .. } | Error::Io(_) => {
                OffheapStatus::UnexpectedOperation
            }
        }
    }
}

fn status(result: Result<()>) -> OffheapStatus {
    match result {
        Ok(()) => OffheapStatus::Ok,
        Err(e) => {
            warn!(error = %e, "offheap call failed");
            OffheapStatus::from(&e)
        }
    }
}

/// Owned copy of a looked-up value; `data` is null when nothing matched.
#[repr(C)]
#[derive(Debug)]
pub struct OffheapBuffer {
    /// Start of the copied bytes, or null for no match
    pub data: *mut u8,
    /// Number of bytes at `data`
    pub len: usize,
}

impl OffheapBuffer {
    const NONE: Self = OffheapBuffer {
        data: ptr::null_mut(),
        len: 0,
    };

    fn copy_of(value: Option<&ValueBlock>) -> Result<Self> {
        let Some(value) = value else {
            return Ok(Self::NONE);
        };
        let copy = ValueBlock::copy_from(value).map_err(|_| Error::oom("result buffer"))?;
        let len = copy.len();
        let data = Box::into_raw(copy.into_boxed_bytes()) as *mut u8;
        Ok(Self { data, len })
    }
}

/// Move `value` into a heap allocation, reporting exhaustion as an error.
fn try_box<T>(value: T) -> Result<Box<T>> {
    let layout = Layout::new::<T>();
    debug_assert!(layout.size() > 0);
    // SAFETY: `layout` has non-zero size.
    let raw = unsafe { alloc(layout) } as *mut T;
    if raw.is_null() {
        return Err(Error::oom("structure header"));
    }
    // SAFETY: `raw` is a fresh allocation from the global allocator with the
    // layout of `T`, which is what `Box` expects to own.
    unsafe {
        raw.write(value);
        Ok(Box::from_raw(raw))
    }
}

/// Borrow the input buffer `(data, len)`.
///
/// # Safety
/// If `data` is non-null it must point to `len` readable bytes.
unsafe fn input<'a>(data: *const u8, len: usize) -> Result<&'a [u8]> {
    if len == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(Error::UnexpectedOperation("input buffer cannot be read"));
    }
    // SAFETY: non-null and valid for `len` bytes per the caller contract.
    Ok(unsafe { std::slice::from_raw_parts(data, len) })
}

/// # Safety
/// `handle` must be 0 or a live handle of type `T`.
unsafe fn deref_mut<'a, T>(handle: u64) -> Option<&'a mut T> {
    // SAFETY: per the caller contract.
    unsafe { (handle as usize as *mut T).as_mut() }
}

/// # Safety
/// `handle` must be 0 or a live handle of type `T`.
unsafe fn deref<'a, T>(handle: u64) -> Option<&'a T> {
    // SAFETY: per the caller contract.
    unsafe { (handle as usize as *const T).as_ref() }
}

fn into_handle<T>(boxed: Box<T>) -> u64 {
    Box::into_raw(boxed) as usize as u64
}

/// Create an empty trie and store its handle in `*out`.
///
/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn offheap_trie_new(out: *mut TrieHandle) -> OffheapStatus {
    if out.is_null() {
        return OffheapStatus::InvalidArgument;
    }
    match try_box(LpmTrie::new()) {
        Ok(trie) => {
            // SAFETY: checked non-null, writable per the caller contract.
            unsafe { out.write(into_handle(trie)) };
            OffheapStatus::Ok
        }
        Err(e) => status(Err(e)),
    }
}

/// Register `(value, value_len)` for the top `mask` bits of `address`.
///
/// # Safety
/// `handle` must be a live trie handle and `value` must point to
/// `value_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn offheap_trie_insert(
    handle: TrieHandle,
    address: u32,
    mask: i32,
    value: *const u8,
    value_len: usize,
) -> OffheapStatus {
    // SAFETY: per the caller contract.
    let Some(trie) = (unsafe { deref_mut::<LpmTrie>(handle) }) else {
        return OffheapStatus::InvalidArgument;
    };
    let prefix_len = match u8::try_from(mask) {
        Ok(len) if len <= KEY_BITS => len,
        _ => return status(Err(Error::InvalidPrefixLength(i64::from(mask)))),
    };
    status(
        // SAFETY: per the caller contract.
        unsafe { input(value, value_len) }
            .and_then(|bytes| trie.insert(address, prefix_len, bytes)),
    )
}

/// Longest-prefix lookup; the copied value (or none) is stored in `*out`.
///
/// # Safety
/// `handle` must be a live trie handle and `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn offheap_trie_lookup(
    handle: TrieHandle,
    address: u32,
    out: *mut OffheapBuffer,
) -> OffheapStatus {
    // SAFETY: per the caller contract.
    let Some(trie) = (unsafe { deref::<LpmTrie>(handle) }) else {
        return OffheapStatus::InvalidArgument;
    };
    if out.is_null() {
        return OffheapStatus::InvalidArgument;
    }
    match OffheapBuffer::copy_of(trie.lookup(address)) {
        Ok(buf) => {
            // SAFETY: checked non-null, writable per the caller contract.
            unsafe { out.write(buf) };
            OffheapStatus::Ok
        }
        Err(e) => status(Err(e)),
    }
}

/// Destroy a trie. A zero handle is ignored.
///
/// # Safety
/// `handle` must be 0 or a live trie handle; it is dead afterwards.
#[no_mangle]
pub unsafe extern "C" fn offheap_trie_destroy(handle: TrieHandle) {
    if handle == 0 {
        return;
    }
    // SAFETY: produced by `into_handle` in `offheap_trie_new`.
    let trie = unsafe { Box::from_raw(handle as usize as *mut LpmTrie) };
    (*trie).destroy();
}

/// Create a hash table with `capacity` buckets and store its handle in `*out`.
///
/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn offheap_htable_new(capacity: i32, out: *mut HtableHandle) -> OffheapStatus {
    if out.is_null() {
        return OffheapStatus::InvalidArgument;
    }
    let Some(capacity) = usize::try_from(capacity).ok().and_then(NonZeroUsize::new) else {
        return status(Err(Error::InvalidCapacity(i64::from(capacity))));
    };
    match ExactHashTable::with_capacity(capacity).and_then(try_box) {
        Ok(table) => {
            // SAFETY: checked non-null, writable per the caller contract.
            unsafe { out.write(into_handle(table)) };
            OffheapStatus::Ok
        }
        Err(e) => status(Err(e)),
    }
}

/// Insert a copy of `key` mapped to a copy of `value`.
///
/// # Safety
/// `handle` must be a live hash table handle, and each buffer must point to
/// its stated number of readable bytes.
#[no_mangle]
pub unsafe extern "C" fn offheap_htable_insert(
    handle: HtableHandle,
    key: *const u8,
    key_len: usize,
    value: *const u8,
    value_len: usize,
) -> OffheapStatus {
    // SAFETY: per the caller contract.
    let Some(table) = (unsafe { deref_mut::<ExactHashTable>(handle) }) else {
        return OffheapStatus::InvalidArgument;
    };
    // SAFETY: per the caller contract.
    let result = unsafe { input(key, key_len) }.and_then(|key| {
        // SAFETY: per the caller contract.
        let value = unsafe { input(value, value_len) }?;
        table.insert(key, value)
    });
    status(result)
}

/// Exact-match lookup; the copied value (or none) is stored in `*out`.
///
/// # Safety
/// `handle` must be a live hash table handle, `key` must point to `key_len`
/// readable bytes, and `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn offheap_htable_lookup(
    handle: HtableHandle,
    key: *const u8,
    key_len: usize,
    out: *mut OffheapBuffer,
) -> OffheapStatus {
    // SAFETY: per the caller contract.
    let Some(table) = (unsafe { deref::<ExactHashTable>(handle) }) else {
        return OffheapStatus::InvalidArgument;
    };
    if out.is_null() {
        return OffheapStatus::InvalidArgument;
    }
    // SAFETY: per the caller contract.
    let result = unsafe { input(key, key_len) }
        .and_then(|key| OffheapBuffer::copy_of(table.lookup(key)));
    match result {
        Ok(buf) => {
            // SAFETY: checked non-null, writable per the caller contract.
            unsafe { out.write(buf) };
            OffheapStatus::Ok
        }
        Err(e) => status(Err(e)),
    }
}

/// Destroy a hash table. A zero handle is ignored.
///
/// # Safety
/// `handle` must be 0 or a live hash table handle; it is dead afterwards.
#[no_mangle]
pub unsafe extern "C" fn offheap_htable_destroy(handle: HtableHandle) {
    if handle == 0 {
        return;
    }
    // SAFETY: produced by `into_handle` in `offheap_htable_new`.
    let table = unsafe { Box::from_raw(handle as usize as *mut ExactHashTable) };
    (*table).destroy();
}

/// Release a buffer returned by a lookup. Null buffers are ignored.
///
/// # Safety
/// `buf` must come from a lookup call and not have been freed already.
#[no_mangle]
pub unsafe extern "C" fn offheap_buffer_free(buf: OffheapBuffer) {
    if buf.data.is_null() {
        return;
    }
    // SAFETY: `data`/`len` came from `Box::<[u8]>::into_raw` in `copy_of`.
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(buf.data, buf.len)) });
}
