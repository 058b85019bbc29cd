//! Typed offsets and bounds-checked access to a runtime's linear memory.
//!
//! All multi-byte values are little-endian, matching WebAssembly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};

/// A byte offset into linear memory. `Ptr::NULL` is never a valid allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ptr(pub u32);

impl Ptr {
    pub const NULL: Self = Self(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `self + bytes`, wrapping like 32-bit pointer arithmetic in the runtime.
    pub fn add(self, bytes: u32) -> Self {
        Self(self.0.wrapping_add(bytes))
    }

    /// Round down to a multiple of `align` (a power of two), the way typed
    /// heap views index memory (`HEAP32[ptr >> 2]`).
    pub fn align_down(self, align: u32) -> Self {
        debug_assert!(align.is_power_of_two());
        Self(self.0 & !(align - 1))
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u32> for Ptr {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Read-only view over linear memory.
#[derive(Debug, Clone, Copy)]
pub struct MemoryView<'a> {
    bytes: &'a [u8],
}

impl<'a> MemoryView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow `len` bytes at `ptr`.
    pub fn slice(&self, ptr: Ptr, len: u32) -> MemoryResult<&'a [u8]> {
        let start = ptr.as_usize();
        let end = start.checked_add(len as usize);
        match end {
            Some(end) if end <= self.bytes.len() => Ok(&self.bytes[start..end]),
            _ => Err(MemoryError::OutOfBounds {
                ptr,
                len,
                size: self.bytes.len(),
            }),
        }
    }

    fn array<const N: usize>(&self, ptr: Ptr) -> MemoryResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(ptr, N as u32)?);
        Ok(out)
    }

    pub fn read_u8(&self, ptr: Ptr) -> MemoryResult<u8> {
        Ok(self.array::<1>(ptr)?[0])
    }

    pub fn read_i8(&self, ptr: Ptr) -> MemoryResult<i8> {
        Ok(i8::from_le_bytes(self.array(ptr)?))
    }

    pub fn read_u16(&self, ptr: Ptr) -> MemoryResult<u16> {
        Ok(u16::from_le_bytes(self.array(ptr)?))
    }

    pub fn read_i16(&self, ptr: Ptr) -> MemoryResult<i16> {
        Ok(i16::from_le_bytes(self.array(ptr)?))
    }

    pub fn read_u32(&self, ptr: Ptr) -> MemoryResult<u32> {
        Ok(u32::from_le_bytes(self.array(ptr)?))
    }

    pub fn read_i32(&self, ptr: Ptr) -> MemoryResult<i32> {
        Ok(i32::from_le_bytes(self.array(ptr)?))
    }

    pub fn read_u64(&self, ptr: Ptr) -> MemoryResult<u64> {
        Ok(u64::from_le_bytes(self.array(ptr)?))
    }

    pub fn read_i64(&self, ptr: Ptr) -> MemoryResult<i64> {
        Ok(i64::from_le_bytes(self.array(ptr)?))
    }

    pub fn read_f32(&self, ptr: Ptr) -> MemoryResult<f32> {
        Ok(f32::from_le_bytes(self.array(ptr)?))
    }

    pub fn read_f64(&self, ptr: Ptr) -> MemoryResult<f64> {
        Ok(f64::from_le_bytes(self.array(ptr)?))
    }

    /// Read a pointer-sized (u32) word as a [`Ptr`].
    pub fn read_ptr(&self, ptr: Ptr) -> MemoryResult<Ptr> {
        self.read_u32(ptr).map(Ptr)
    }

    /// Length of the NUL-terminated string at `ptr`, excluding the NUL.
    pub fn c_str_len(&self, ptr: Ptr) -> MemoryResult<u32> {
        let start = ptr.as_usize();
        if start > self.bytes.len() {
            return Err(MemoryError::OutOfBounds {
                ptr,
                len: 1,
                size: self.bytes.len(),
            });
        }
        self.bytes[start..]
            .iter()
            .position(|b| *b == 0)
            .map(|n| n as u32)
            .ok_or(MemoryError::Unterminated(ptr))
    }

    /// Read a NUL-terminated string. Invalid UTF-8 is replaced, not rejected.
    pub fn read_c_str(&self, ptr: Ptr) -> MemoryResult<String> {
        let len = self.c_str_len(ptr)?;
        Ok(String::from_utf8_lossy(self.slice(ptr, len)?).into_owned())
    }

    /// Copy `len` bytes out of memory. The result does not alias the source.
    pub fn read_bytes(&self, ptr: Ptr, len: u32) -> MemoryResult<Vec<u8>> {
        Ok(self.slice(ptr, len)?.to_vec())
    }
}

/// Mutable view over linear memory, used by runtime implementations.
#[derive(Debug)]
pub struct MemoryMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> MemoryMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn view(&self) -> MemoryView<'_> {
        MemoryView::new(self.bytes)
    }

    fn slice_mut(&mut self, ptr: Ptr, len: u32) -> MemoryResult<&mut [u8]> {
        let size = self.bytes.len();
        let start = ptr.as_usize();
        match start.checked_add(len as usize) {
            Some(end) if end <= size => Ok(&mut self.bytes[start..end]),
            _ => Err(MemoryError::OutOfBounds { ptr, len, size }),
        }
    }

    pub fn write_bytes(&mut self, ptr: Ptr, data: &[u8]) -> MemoryResult<()> {
        self.slice_mut(ptr, data.len() as u32)?.copy_from_slice(data);
        Ok(())
    }

    pub fn fill(&mut self, ptr: Ptr, len: u32, byte: u8) -> MemoryResult<()> {
        self.slice_mut(ptr, len)?.fill(byte);
        Ok(())
    }

    /// Copy `len` bytes within memory; ranges may overlap.
    pub fn copy_within(&mut self, src: Ptr, dst: Ptr, len: u32) -> MemoryResult<()> {
        self.slice_mut(src, len)?;
        self.slice_mut(dst, len)?;
        let start = src.as_usize();
        self.bytes
            .copy_within(start..start + len as usize, dst.as_usize());
        Ok(())
    }

    pub fn write_u8(&mut self, ptr: Ptr, v: u8) -> MemoryResult<()> {
        self.write_bytes(ptr, &[v])
    }

    pub fn write_u32(&mut self, ptr: Ptr, v: u32) -> MemoryResult<()> {
        self.write_bytes(ptr, &v.to_le_bytes())
    }

    pub fn write_i32(&mut self, ptr: Ptr, v: i32) -> MemoryResult<()> {
        self.write_bytes(ptr, &v.to_le_bytes())
    }

    pub fn write_i64(&mut self, ptr: Ptr, v: i64) -> MemoryResult<()> {
        self.write_bytes(ptr, &v.to_le_bytes())
    }

    pub fn write_f32(&mut self, ptr: Ptr, v: f32) -> MemoryResult<()> {
        self.write_bytes(ptr, &v.to_le_bytes())
    }

    pub fn write_f64(&mut self, ptr: Ptr, v: f64) -> MemoryResult<()> {
        self.write_bytes(ptr, &v.to_le_bytes())
    }

    pub fn write_ptr(&mut self, ptr: Ptr, v: Ptr) -> MemoryResult<()> {
        self.write_u32(ptr, v.0)
    }
}
