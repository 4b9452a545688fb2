//! Shared lock region
//!
//! Owns the memory a [`LockWord`] lives in. A region is either a private heap
//! cell (single-process hosts, tests) or, on Unix, a `MAP_SHARED` mapping of a
//! small file so that every process mapping the same file sees the same word.
//! Files only ever borrow a region.

use std::fs::File;
use std::sync::atomic::AtomicU32;

use tracing::debug;

use crate::error::Result;
use crate::os::lock_word::LockWord;

#[cfg(unix)]
use crate::error::{Error, ErrorCode};
#[cfg(unix)]
use std::ptr::NonNull;

/// Size of the lock word in bytes
pub const LOCK_WORD_SIZE: usize = std::mem::size_of::<AtomicU32>();

enum Backing {
    Heap(Box<AtomicU32>),
    #[cfg(unix)]
    Mapped { ptr: NonNull<AtomicU32>, len: usize },
}

/// Memory holding one shared lock word
pub struct SharedLockRegion {
    backing: Backing,
}

// SAFETY: the region only exposes the word through atomic operations, and a
// mapping stays valid until drop.
unsafe impl Send for SharedLockRegion {}
unsafe impl Sync for SharedLockRegion {}

impl SharedLockRegion {
    /// A zeroed word visible only to this process
    pub fn in_process() -> Self {
        Self {
            backing: Backing::Heap(Box::new(AtomicU32::new(0))),
        }
    }

    /// Map the first bytes of `file` as a shared lock word.
    ///
    /// The file is grown to hold the word if it is shorter. A freshly created
    /// file reads as zero, which is the unlocked state.
    #[cfg(unix)]
    pub fn map_file(file: &File) -> Result<Self> {
        use std::os::unix::io::AsRawFd;

        let len = LOCK_WORD_SIZE;
        let current = file
            .metadata()
            .map_err(|e| Error::from_io(ErrorCode::IoErrFstat, e))?
            .len();
        if current < len as u64 {
            file.set_len(len as u64)
                .map_err(|e| Error::from_io(ErrorCode::IoErrTruncate, e))?;
        }

        // SAFETY: mapping a valid descriptor; the result is checked below.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::from_io(
                ErrorCode::IoErr,
                std::io::Error::last_os_error(),
            ));
        }

        // mmap returns page-aligned memory, which satisfies AtomicU32.
        let ptr = NonNull::new(ptr.cast::<AtomicU32>())
            .ok_or_else(|| Error::with_message(ErrorCode::IoErr, "mmap returned null"))?;
        debug!(fd = file.as_raw_fd(), len, "mapped shared lock region");

        Ok(Self {
            backing: Backing::Mapped { ptr, len },
        })
    }

    /// Non-Unix hosts have no shared mapping; fall back to a private word.
    #[cfg(not(unix))]
    pub fn map_file(_file: &File) -> Result<Self> {
        Ok(Self::in_process())
    }

    /// Whether the word is visible to other mappings of the same file
    pub fn is_shared(&self) -> bool {
        match &self.backing {
            Backing::Heap(_) => false,
            #[cfg(unix)]
            Backing::Mapped { .. } => true,
        }
    }

    /// View of the lock word for as long as the region is borrowed
    pub fn lock_word(&self) -> LockWord<'_> {
        match &self.backing {
            Backing::Heap(cell) => LockWord::new(cell),
            // SAFETY: the mapping is live for the lifetime of `self`.
            #[cfg(unix)]
            Backing::Mapped { ptr, .. } => LockWord::new(unsafe { ptr.as_ref() }),
        }
    }
}

impl Drop for SharedLockRegion {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let Backing::Mapped { ptr, len } = &self.backing {
                // SAFETY: unmapping exactly the range returned by mmap.
                unsafe {
                    libc::munmap(ptr.as_ptr().cast::<libc::c_void>(), *len);
                }
            }
        }
    }
}

impl std::fmt::Debug for SharedLockRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLockRegion")
            .field("shared", &self.is_shared())
            .field("word", &self.lock_word())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::lock_word::RESERVED_BIT;

    #[test]
    fn test_in_process_region_starts_unlocked() {
        let region = SharedLockRegion::in_process();
        assert!(!region.is_shared());
        assert_eq!(region.lock_word().load(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_two_mappings_share_one_word() {
        let file = tempfile::tempfile().unwrap();
        let a = SharedLockRegion::map_file(&file).unwrap();
        let b = SharedLockRegion::map_file(&file).unwrap();
        assert!(a.is_shared());

        a.lock_word().fetch_or(RESERVED_BIT);
        assert!(b.lock_word().is_reserved());

        b.lock_word().fetch_and(!RESERVED_BIT);
        assert_eq!(a.lock_word().load(), 0);
        assert_eq!(file.metadata().unwrap().len(), LOCK_WORD_SIZE as u64);
    }
}
