//! Guest memory access.

/// Read-only view of guest memory.
///
/// The decoder fetches instruction bytes through this trait. It performs no
/// page-fault handling of its own; callers hand it memory that is already
/// mapped and readable. Addresses are full guest virtual addresses.
pub trait GuestMem {
    /// Read a byte from the given guest address.
    fn read(&self, address: u64) -> u8;
}

/// Flat vector-backed guest memory for tests and harnesses.
///
/// Covers a contiguous range starting at `base`; reads outside the range
/// return zero rather than panicking mid-decode.
pub struct FlatMem {
    base: u64,
    data: Vec<u8>,
}

impl FlatMem {
    /// Create a flat memory of `size` zeroed bytes starting at `base`.
    #[must_use]
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
        }
    }

    /// Copy `bytes` into memory starting at `address`.
    pub fn load(&mut self, address: u64, bytes: &[u8]) {
        let start = (address - self.base) as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

impl GuestMem for FlatMem {
    fn read(&self, address: u64) -> u8 {
        let offset = address.wrapping_sub(self.base);
        self.data.get(offset as usize).copied().unwrap_or(0)
    }
}

impl GuestMem for &[u8] {
    /// A bare slice is memory based at address zero.
    fn read(&self, address: u64) -> u8 {
        self.get(address as usize).copied().unwrap_or(0)
    }
}
