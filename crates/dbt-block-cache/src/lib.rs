//! Two-level translation block cache.
//!
//! Maps guest instruction-pointer values to host code pointers. A
//! direct-mapped L1 absorbs the hot path; an authoritative page-level map
//! backs it. Page blocks are carved out of a preallocated arena, so
//! translated-code-free pages cost one word and entries never move.
//!
//! ## Concurrency
//!
//! Lookup is lock-free and runs on guest-execution threads concurrently
//! with inserts from the translator. Each entry is a `{host, guest}` pair
//! of atomics: writers publish `host` before `guest` (release on `guest`),
//! readers check `guest` (acquire) before consuming `host`. A torn read
//! therefore surfaces as a clean miss, never a stale pointer.
//!
//! Insertion is serialized by the surrounding translator. [`BlockCache::clear`]
//! is stop-the-world: callers must quiesce guest threads first, because it
//! tears down host code pointers still in use.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use log::debug;

/// Number of direct-mapped L1 slots. Must be a power of two.
pub const L1_ENTRIES: usize = 1 << 20;
const L1_MASK: u64 = (L1_ENTRIES as u64) - 1;

/// Entries per page block: one per byte of a 4 KiB guest page.
const PAGE_ENTRIES: usize = 4096;

/// One cached `{guest, host}` mapping. `guest == 0` means empty.
#[derive(Debug, Default)]
struct CacheEntry {
    host: AtomicU64,
    guest: AtomicU64,
}

impl CacheEntry {
    /// Publish a mapping: host first, guest last with release ordering.
    fn store(&self, guest: u64, host: u64) {
        self.host.store(host, Ordering::Relaxed);
        self.guest.store(guest, Ordering::Release);
    }

    /// Clear a mapping: retract guest first so readers miss cleanly.
    fn clear(&self) {
        self.guest.store(0, Ordering::Release);
        self.host.store(0, Ordering::Relaxed);
    }

    /// Read the host pointer if this entry maps `guest`.
    fn load(&self, guest: u64) -> Option<u64> {
        if self.guest.load(Ordering::Acquire) == guest {
            Some(self.host.load(Ordering::Relaxed))
        } else {
            None
        }
    }
}

/// Cache sizing.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Guest virtual-memory span covered by the page table. Must be a
    /// power of two; addresses are masked into it, the full address is
    /// still stored for exact-match verification.
    pub virtual_mem_size: u64,
    /// Bytes of arena backing for page blocks.
    pub backing_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // 64 GiB of guest address space: 16 Mi pages, one word each.
            // Wider guests pass their own span; the full address is always
            // stored, so aliasing across the span is detected exactly.
            virtual_mem_size: 1 << 36,
            backing_bytes: 128 * 1024 * 1024,
        }
    }
}

/// Two-level guest-to-host code cache.
pub struct BlockCache {
    /// Direct-mapped first level; a pure cache over the page-level map.
    l1: Box<[CacheEntry]>,
    /// One slot per guest page: `arena index + 1` of its page block, or 0.
    page_pointers: Box<[AtomicUsize]>,
    /// Backing storage for page blocks. Preallocated; bump-allocated in
    /// `PAGE_ENTRIES` chunks and never freed until `clear`.
    arena: Box<[CacheEntry]>,
    allocate_offset: AtomicUsize,
    virtual_mem_size: u64,
}

impl BlockCache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        assert!(
            config.virtual_mem_size.is_power_of_two(),
            "virtual memory size must be a power of two"
        );
        let pages = (config.virtual_mem_size >> 12) as usize;
        let arena_entries = config.backing_bytes / size_of::<CacheEntry>();

        Self {
            l1: (0..L1_ENTRIES).map(|_| CacheEntry::default()).collect(),
            page_pointers: (0..pages).map(|_| AtomicUsize::new(0)).collect(),
            arena: (0..arena_entries).map(|_| CacheEntry::default()).collect(),
            allocate_offset: AtomicUsize::new(0),
            virtual_mem_size: config.virtual_mem_size,
        }
    }

    /// Look up the host code pointer for guest address `pc`.
    ///
    /// Returns 0 on miss. A page-level hit is promoted into L1 on the way
    /// out.
    #[must_use]
    pub fn find_block(&self, pc: u64) -> u64 {
        let l1_entry = &self.l1[(pc & L1_MASK) as usize];
        // An empty slot has guest == 0, which a lookup of address zero
        // would match; host == 0 distinguishes it and falls through to
        // the authoritative map.
        if let Some(host) = l1_entry.load(pc) {
            if host != 0 {
                return host;
            }
        }

        let Some(slot) = self.page_slot(pc) else {
            return 0;
        };
        match slot.load(pc) {
            Some(host) if host != 0 => {
                l1_entry.store(pc, host);
                host
            }
            _ => 0,
        }
    }

    /// Insert a mapping, silently replacing any prior occupant of the slot.
    ///
    /// Returns the host pointer, or 0 when the arena is exhausted — the
    /// caller must then [`BlockCache::clear`] (after quiescing guests) and
    /// retry. The fresh mapping is not pre-loaded into L1; the next lookup
    /// promotes it.
    #[must_use]
    pub fn add_block_mapping(&self, pc: u64, host: u64) -> u64 {
        // Drop a stale L1 image of this address before the page-level
        // store changes the mapping under it.
        let l1_entry = &self.l1[(pc & L1_MASK) as usize];
        if l1_entry.guest.load(Ordering::Acquire) == pc {
            l1_entry.clear();
        }

        let masked = pc & (self.virtual_mem_size - 1);
        let page = (masked >> 12) as usize;

        let pointer = self.page_pointers[page].load(Ordering::Acquire);
        let base = if pointer == 0 {
            let Some(base) = self.allocate_page_block() else {
                return 0;
            };
            self.page_pointers[page].store(base + 1, Ordering::Release);
            base
        } else {
            pointer - 1
        };

        let offset = (masked & 0xFFF) as usize;
        self.arena[base + offset].store(pc, host);
        host
    }

    /// Remove the mapping for `pc`, if any. Called on self-modifying-code
    /// detection; safe to run concurrently with lookups.
    pub fn erase(&self, pc: u64) {
        let l1_entry = &self.l1[(pc & L1_MASK) as usize];
        if l1_entry.guest.load(Ordering::Acquire) == pc {
            l1_entry.clear();
        }

        if let Some(slot) = self.page_slot(pc) {
            slot.clear();
        }
    }

    /// Drop every mapping and reset the arena. The backing memory is
    /// retained.
    ///
    /// Stop-the-world: every host code pointer in the cache becomes
    /// invalid, so guest threads must be quiesced before calling this.
    pub fn clear(&self) {
        debug!("clearing block cache");
        for entry in &self.l1 {
            entry.clear();
        }
        for pointer in &self.page_pointers {
            pointer.store(0, Ordering::Relaxed);
        }
        for entry in &self.arena[..self.allocate_offset.load(Ordering::Relaxed)] {
            entry.clear();
        }
        self.allocate_offset.store(0, Ordering::Relaxed);
    }

    /// Hook for future madvise-style warming of the backing memory.
    /// Deliberately a no-op; not required for correctness.
    pub fn hint_used_range(&self, _address: u64, _size: u64) {}

    /// The page-block slot covering `pc`, if its page has one.
    fn page_slot(&self, pc: u64) -> Option<&CacheEntry> {
        let masked = pc & (self.virtual_mem_size - 1);
        let page = (masked >> 12) as usize;
        let offset = (masked & 0xFFF) as usize;

        let pointer = self.page_pointers[page].load(Ordering::Acquire);
        if pointer == 0 {
            return None;
        }
        Some(&self.arena[(pointer - 1) + offset])
    }

    /// Bump-allocate one page block. Returns its arena base index, or
    /// `None` when the arena is spent.
    fn allocate_page_block(&self) -> Option<usize> {
        let base = self.allocate_offset.load(Ordering::Relaxed);
        let end = base + PAGE_ENTRIES;
        if end > self.arena.len() {
            debug!("block cache arena exhausted, caller must clear");
            return None;
        }
        self.allocate_offset.store(end, Ordering::Relaxed);
        Some(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache(pages: usize) -> BlockCache {
        BlockCache::new(CacheConfig {
            virtual_mem_size: 1 << 32,
            backing_bytes: pages * PAGE_ENTRIES * size_of::<CacheEntry>(),
        })
    }

    #[test]
    fn insert_then_find() {
        let cache = small_cache(4);
        assert_eq!(cache.add_block_mapping(0x1000, 0xBEEF), 0xBEEF);
        assert_eq!(cache.find_block(0x1000), 0xBEEF);
        // Second lookup hits the promoted L1 image.
        assert_eq!(cache.find_block(0x1000), 0xBEEF);
    }

    #[test]
    fn miss_returns_zero() {
        let cache = small_cache(4);
        assert_eq!(cache.find_block(0x2000), 0);
        assert_eq!(cache.add_block_mapping(0x2000, 1), 1);
        assert_eq!(cache.find_block(0x2004), 0, "same page, different offset");
    }

    #[test]
    fn insert_replaces_silently() {
        let cache = small_cache(4);
        let _ = cache.add_block_mapping(0x1000, 0xAAAA);
        assert_eq!(cache.find_block(0x1000), 0xAAAA);
        let _ = cache.add_block_mapping(0x1000, 0xBBBB);
        assert_eq!(cache.find_block(0x1000), 0xBBBB, "stale L1 image must not survive");
    }
}
