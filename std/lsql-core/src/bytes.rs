///
/// LsqlBytes - Host Byte Buffers
///
/// Heap-allocated, reference-counted byte buffers. Blob column content crosses
/// the host boundary as one of these.
///

use std::alloc::{alloc, dealloc, Layout};

use crate::{HeapHeader, HeapTag};

/// A heap-allocated byte array
#[repr(C)]
pub struct LsqlBytes {
    pub header: HeapHeader,
    pub len: usize,
    pub data: [u8; 0],
}

impl LsqlBytes {
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }
}

fn bytes_layout(len: usize) -> Layout {
    Layout::from_size_align(
        std::mem::size_of::<LsqlBytes>() + len,
        std::mem::align_of::<LsqlBytes>(),
    )
    .unwrap_or_else(|_| panic!("byte buffer of {len} bytes exceeds the address space"))
}

/// Allocate a byte buffer holding a copy of `len` bytes at `data`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_bytes_from(data: *const u8, len: usize) -> *mut LsqlBytes {
    unsafe {
        let ptr = alloc(bytes_layout(len)) as *mut LsqlBytes;
        if ptr.is_null() {
            panic!("Failed to allocate bytes");
        }

        (*ptr).header = HeapHeader::new(HeapTag::Bytes);
        (*ptr).len = len;

        if !data.is_null() && len > 0 {
            std::ptr::copy_nonoverlapping(data, (*ptr).data.as_mut_ptr(), len);
        }

        ptr
    }
}

/// Allocate a host byte buffer holding a copy of `data`.
pub fn lsql_bytes_from_slice(data: &[u8]) -> *mut LsqlBytes {
    unsafe { lsql_bytes_from(data.as_ptr(), data.len()) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_bytes_incref(b: *mut LsqlBytes) {
    if !b.is_null() {
        unsafe { (*b).header.incref(); }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_bytes_decref(b: *mut LsqlBytes) {
    if !b.is_null() {
        unsafe {
            if (*b).header.decref() {
                dealloc(b as *mut u8, bytes_layout((*b).len));
            }
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_bytes_len(b: *const LsqlBytes) -> i64 {
    if b.is_null() {
        0
    } else {
        unsafe { (*b).len as i64 }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lsql_bytes_data(b: *const LsqlBytes) -> *const u8 {
    if b.is_null() {
        std::ptr::null()
    } else {
        unsafe { (*b).data.as_ptr() }
    }
}
