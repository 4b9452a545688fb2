//! Shared lock word
//!
//! A single 32-bit atomic in memory shared by every process that opens the
//! same database. It packs the whole advisory lock state:
//!
//! ```text
//! bit  0..27 : shared-lock count   (mask 0x0FFFFFFF)
//! bit 28     : unused
//! bit 29     : RESERVED flag       (0x20000000)
//! bit 30     : PENDING flag        (0x40000000)
//! bit 31     : unused
//! ```
//!
//! EXCLUSIVE has no bit of its own: it is "PENDING held and a shared count
//! of exactly one".

use std::sync::atomic::{AtomicU32, Ordering};

/// Upper bound on concurrent SHARED holders
pub const MAX_SHARED_LOCKS: u32 = 0x0800_0000;
/// Mask selecting the SHARED count
pub const SHARED_COUNT_MASK: u32 = 0x0FFF_FFFF;
/// Set while some connection holds RESERVED
pub const RESERVED_BIT: u32 = 0x2000_0000;
/// Set while some connection holds PENDING (or EXCLUSIVE)
pub const PENDING_BIT: u32 = 0x4000_0000;

/// Borrowed view of a lock word living in a shared region.
///
/// Only atomic operations are exposed; callers never get at the memory
/// itself.
#[derive(Clone, Copy)]
pub struct LockWord<'m> {
    word: &'m AtomicU32,
}

impl<'m> LockWord<'m> {
    /// Wrap an atomic that lives in a shared region
    pub fn new(word: &'m AtomicU32) -> Self {
        Self { word }
    }

    /// Current raw value
    pub fn load(&self) -> u32 {
        self.word.load(Ordering::SeqCst)
    }

    /// Compare-and-swap; returns the observed value on failure
    pub fn compare_exchange(&self, current: u32, new: u32) -> std::result::Result<u32, u32> {
        self.word
            .compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
    }

    /// Atomically OR in `bits`, returning the previous value
    pub fn fetch_or(&self, bits: u32) -> u32 {
        self.word.fetch_or(bits, Ordering::SeqCst)
    }

    /// Atomically AND with `mask`, returning the previous value
    pub fn fetch_and(&self, mask: u32) -> u32 {
        self.word.fetch_and(mask, Ordering::SeqCst)
    }

    /// Atomically subtract `n`, returning the previous value
    pub fn fetch_sub(&self, n: u32) -> u32 {
        self.word.fetch_sub(n, Ordering::SeqCst)
    }

    /// Number of SHARED holders
    pub fn shared_count(&self) -> u32 {
        shared_count(self.load())
    }

    /// Whether any connection holds RESERVED
    pub fn is_reserved(&self) -> bool {
        self.load() & RESERVED_BIT != 0
    }

    /// Whether any connection holds PENDING
    pub fn is_pending(&self) -> bool {
        self.load() & PENDING_BIT != 0
    }
}

impl std::fmt::Debug for LockWord<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = self.load();
        f.debug_struct("LockWord")
            .field("shared", &shared_count(value))
            .field("reserved", &(value & RESERVED_BIT != 0))
            .field("pending", &(value & PENDING_BIT != 0))
            .finish()
    }
}

/// Extract the SHARED count from a raw word
pub fn shared_count(value: u32) -> u32 {
    value & SHARED_COUNT_MASK
}
