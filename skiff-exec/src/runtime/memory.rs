//! Linear memory instance (32-bit index space).
//!
//! Page-based growth, bounds-checked little-endian loads/stores, and the
//! bulk operations (fill, copy, init). Bulk operations check the whole range
//! before touching a byte, so a trapping operation leaves memory unchanged.

use skiff_wasm::model::MemoryType;

/// Wasm page size in bytes (64 KiB).
pub const PAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct MemoryInstance {
    buf: Vec<u8>,
    max: Option<u32>,
}

impl MemoryInstance {
    /// Create a memory from its declared type (limits in pages).
    pub fn new(ty: &MemoryType) -> Self {
        let min = ty.limits.min as usize;
        Self {
            buf: vec![0; min * PAGE_SIZE],
            max: ty.limits.max,
        }
    }

    /// Current size in pages.
    pub fn size_pages(&self) -> u32 {
        (self.buf.len() / PAGE_SIZE) as u32
    }

    /// Grow by delta pages. Returns the previous size, or None on failure.
    pub fn grow(&mut self, delta_pages: u32) -> Option<u32> {
        let prev = self.size_pages();
        let new = prev.checked_add(delta_pages)?;
        if let Some(max) = self.max {
            if new > max {
                return None;
            }
        }
        self.buf.resize((new as usize) * PAGE_SIZE, 0);
        Some(prev)
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    #[inline]
    fn checked_range(&self, addr: u32, len: usize) -> Result<usize, ()> {
        let start = addr as usize;
        let end = start.checked_add(len).ok_or(())?;
        if end <= self.buf.len() {
            Ok(start)
        } else {
            Err(())
        }
    }

    #[inline]
    pub fn load<const N: usize>(&self, addr: u32) -> Result<[u8; N], ()> {
        let i = self.checked_range(addr, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[i..i + N]);
        Ok(out)
    }

    #[inline]
    pub fn store<const N: usize>(&mut self, addr: u32, bytes: [u8; N]) -> Result<(), ()> {
        let i = self.checked_range(addr, N)?;
        self.buf[i..i + N].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn load_u8(&self, addr: u32) -> Result<u8, ()> {
        self.load::<1>(addr).map(|b| b[0])
    }

    pub fn load_u16(&self, addr: u32) -> Result<u16, ()> {
        self.load::<2>(addr).map(u16::from_le_bytes)
    }

    pub fn load_u32(&self, addr: u32) -> Result<u32, ()> {
        self.load::<4>(addr).map(u32::from_le_bytes)
    }

    pub fn load_u64(&self, addr: u32) -> Result<u64, ()> {
        self.load::<8>(addr).map(u64::from_le_bytes)
    }

    pub fn load_u128(&self, addr: u32) -> Result<u128, ()> {
        self.load::<16>(addr).map(u128::from_le_bytes)
    }

    pub fn store_u8(&mut self, addr: u32, v: u8) -> Result<(), ()> {
        self.store(addr, [v])
    }

    pub fn store_u16(&mut self, addr: u32, v: u16) -> Result<(), ()> {
        self.store(addr, v.to_le_bytes())
    }

    pub fn store_u32(&mut self, addr: u32, v: u32) -> Result<(), ()> {
        self.store(addr, v.to_le_bytes())
    }

    pub fn store_u64(&mut self, addr: u32, v: u64) -> Result<(), ()> {
        self.store(addr, v.to_le_bytes())
    }

    pub fn store_u128(&mut self, addr: u32, v: u128) -> Result<(), ()> {
        self.store(addr, v.to_le_bytes())
    }

    /* ===== Bulk operations (all-or-nothing) ===== */

    /// memory.fill: set `len` bytes at `dst` to `byte`.
    pub fn fill(&mut self, dst: u32, byte: u8, len: u32) -> Result<(), ()> {
        let i = self.checked_range(dst, len as usize)?;
        self.buf[i..i + len as usize].fill(byte);
        Ok(())
    }

    /// memory.copy: overlapping ranges behave like memmove.
    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> Result<(), ()> {
        let d = self.checked_range(dst, len as usize)?;
        let s = self.checked_range(src, len as usize)?;
        self.buf.copy_within(s..s + len as usize, d);
        Ok(())
    }

    /// memory.init: copy from a data segment slice into memory.
    pub fn init(&mut self, dst: u32, src: &[u8]) -> Result<(), ()> {
        let i = self.checked_range(dst, src.len())?;
        self.buf[i..i + src.len()].copy_from_slice(src);
        Ok(())
    }
}
