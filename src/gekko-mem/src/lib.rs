//! Flat, byte-addressable memory regions addressed by 32-bit handles.
//!
//! Kernel ports built on this crate never hold native references into their
//! state. Every field lives at a fixed offset inside one [`Memory`] region and
//! is read and written with an explicit [`ByteOrder`], which keeps the state
//! relocatable and byte-for-byte comparable with a reference running on other
//! hardware.
//!
//! Address `0` is reserved as "null" by convention; regions are mapped at a
//! non-zero base.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

use core::ops::Range;

/// A 32-bit address inside a memory region.
pub type Address = u32;

/// Byte order used when (de)serializing multi-byte values.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ByteOrder {
    /// Most significant byte first (the console's native order).
    Big,
    /// Least significant byte first.
    Little,
}

impl ByteOrder {
    fn decode_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Big => u16::from_be_bytes(bytes),
            ByteOrder::Little => u16::from_le_bytes(bytes),
        }
    }

    fn encode_u16(self, val: u16) -> [u8; 2] {
        match self {
            ByteOrder::Big => val.to_be_bytes(),
            ByteOrder::Little => val.to_le_bytes(),
        }
    }

    fn decode_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        }
    }

    fn encode_u32(self, val: u32) -> [u8; 4] {
        match self {
            ByteOrder::Big => val.to_be_bytes(),
            ByteOrder::Little => val.to_le_bytes(),
        }
    }
}

/// Typed access to a byte-addressable region.
///
/// Implementations decide the byte order and what happens on accesses outside
/// the region; callers are expected to only touch addresses they laid out.
pub trait Memory {
    /// Loads a 16-bit value.
    fn load_u16(&self, addr: Address) -> u16;
    /// Stores a 16-bit value.
    fn store_u16(&mut self, addr: Address, val: u16);
    /// Loads a 32-bit value.
    fn load_u32(&self, addr: Address) -> u32;
    /// Stores a 32-bit value.
    fn store_u32(&mut self, addr: Address, val: u32);
    /// Sets `len` bytes starting at `addr` to `byte`.
    fn fill(&mut self, addr: Address, len: u32, byte: u8);

    /// Loads a signed 32-bit value (two's complement).
    fn load_i32(&self, addr: Address) -> i32 {
        self.load_u32(addr) as i32
    }

    /// Stores a signed 32-bit value (two's complement).
    fn store_i32(&mut self, addr: Address, val: i32) {
        self.store_u32(addr, val as u32);
    }
}

/// An owned region of `SIZE` bytes mapped at `base`.
///
/// Every access is bounds-checked: reads outside the region yield zero and
/// writes outside of it are dropped, both with a warning.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Arena<const SIZE: usize> {
    base: Address,
    order: ByteOrder,
    bytes: [u8; SIZE],
}

impl<const SIZE: usize> Arena<SIZE> {
    /// Creates a zeroed region mapped at `base`.
    pub const fn new(base: Address, order: ByteOrder) -> Self {
        Self {
            base,
            order,
            bytes: [0; SIZE],
        }
    }

    /// Creates a zeroed big-endian region mapped at `base`.
    pub const fn big_endian(base: Address) -> Self {
        Self::new(base, ByteOrder::Big)
    }

    /// Returns the address of the first byte.
    pub fn base(&self) -> Address {
        self.base
    }

    /// Returns the byte order of this region.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Returns `true` if `len` bytes starting at `addr` lie inside the region.
    pub fn contains(&self, addr: Address, len: usize) -> bool {
        self.range(addr, len).is_some()
    }

    /// Raw view of the region, e.g. for comparing against a reference dump.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn range(&self, addr: Address, len: usize) -> Option<Range<usize>> {
        let start = usize::try_from(addr.checked_sub(self.base)?).ok()?;
        let end = start.checked_add(len)?;
        (end <= SIZE).then_some(start..end)
    }

    fn read<const N: usize>(&self, addr: Address) -> [u8; N] {
        let mut out = [0; N];
        match self.range(addr, N).and_then(|r| self.bytes.get(r)) {
            Some(src) => out.copy_from_slice(src),
            None => report_out_of_range(addr, N),
        }
        out
    }

    fn write<const N: usize>(&mut self, addr: Address, data: [u8; N]) {
        match self.range(addr, N).and_then(|r| self.bytes.get_mut(r)) {
            Some(dst) => dst.copy_from_slice(&data),
            None => report_out_of_range(addr, N),
        }
    }
}

impl<const SIZE: usize> Memory for Arena<SIZE> {
    fn load_u16(&self, addr: Address) -> u16 {
        self.order.decode_u16(self.read(addr))
    }

    fn store_u16(&mut self, addr: Address, val: u16) {
        let bytes = self.order.encode_u16(val);
        self.write(addr, bytes);
    }

    fn load_u32(&self, addr: Address) -> u32 {
        self.order.decode_u32(self.read(addr))
    }

    fn store_u32(&mut self, addr: Address, val: u32) {
        let bytes = self.order.encode_u32(val);
        self.write(addr, bytes);
    }

    fn fill(&mut self, addr: Address, len: u32, byte: u8) {
        let Ok(len) = usize::try_from(len) else {
            report_out_of_range(addr, usize::MAX);
            return;
        };
        match self.range(addr, len).and_then(|r| self.bytes.get_mut(r)) {
            Some(dst) => dst.fill(byte),
            None => report_out_of_range(addr, len),
        }
    }
}

#[cold]
fn report_out_of_range(addr: Address, len: usize) {
    gekko_log::warn!("memory access out of range: {:#x} (+{})", addr, len);
}
