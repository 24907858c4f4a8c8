//!
//! Host Heap Objects
//!
//! Every object handed to the host starts with a `HeapHeader` carrying an
//! atomic reference count and a tag identifying the payload. The host only ever
//! sees raw pointers; it increments and decrements the count through the
//! exported functions below and never frees memory itself.
//!

use std::alloc::{alloc, dealloc, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Type tags for heap objects
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapTag {
    String = 0,
    Bytes = 1,
}

/// Header for all heap-allocated objects
#[repr(C)]
pub struct HeapHeader {
    pub refcount: AtomicUsize,
    pub tag: HeapTag,
    pub _pad: [u8; 7],
}

impl HeapHeader {
    pub fn new(tag: HeapTag) -> Self {
        Self {
            refcount: AtomicUsize::new(1),
            tag,
            _pad: [0; 7],
        }
    }

    pub fn incref(&self) {
        self.refcount.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decref(&self) -> bool {
        if self.refcount.fetch_sub(1, Ordering::Release) == 1 {
            std::sync::atomic::fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Relaxed)
    }
}

/// A heap-allocated string.
///
/// The payload is the exact byte content it was created from; it is UTF-8
/// whenever it was created from a Rust `&str`.
#[repr(C)]
pub struct LsqlString {
    pub header: HeapHeader,
    pub len: usize,
    pub data: [u8; 0],
}

impl LsqlString {
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// Lossy view of the payload; invalid sequences become U+FFFD.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

fn string_layout(len: usize) -> Layout {
    Layout::from_size_align(
        std::mem::size_of::<LsqlString>() + len,
        std::mem::align_of::<LsqlString>(),
    )
    .unwrap_or_else(|_| panic!("string of {len} bytes exceeds the address space"))
}

/// Allocate a new string on the heap
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_string_new(data: *const u8, len: usize) -> *mut LsqlString {
    unsafe {
        let ptr = alloc(string_layout(len)) as *mut LsqlString;
        if ptr.is_null() {
            panic!("Failed to allocate string");
        }

        (*ptr).header = HeapHeader::new(HeapTag::String);
        (*ptr).len = len;

        if !data.is_null() && len > 0 {
            std::ptr::copy_nonoverlapping(data, (*ptr).data.as_mut_ptr(), len);
        }

        ptr
    }
}

/// Allocate a host string holding a copy of `s`.
pub fn lsql_string_from_str(s: &str) -> *mut LsqlString {
    lsql_string_from_bytes(s.as_bytes())
}

/// Allocate a host string holding a copy of `bytes`, which need not be UTF-8.
pub fn lsql_string_from_bytes(bytes: &[u8]) -> *mut LsqlString {
    unsafe { lsql_string_new(bytes.as_ptr(), bytes.len()) }
}

/// Increment reference count of a string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_string_incref(s: *mut LsqlString) {
    if !s.is_null() {
        unsafe { (*s).header.incref(); }
    }
}

/// Decrement reference count and free if zero
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_string_decref(s: *mut LsqlString) {
    if !s.is_null() {
        unsafe {
            if (*s).header.decref() {
                dealloc(s as *mut u8, string_layout((*s).len));
            }
        }
    }
}

/// Get string length in bytes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_string_len(s: *const LsqlString) -> i64 {
    if s.is_null() {
        0
    } else {
        unsafe { (*s).len as i64 }
    }
}

/// Get pointer to string data
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_string_data(s: *const LsqlString) -> *const u8 {
    if s.is_null() {
        std::ptr::null()
    } else {
        unsafe { (*s).data.as_ptr() }
    }
}
