//! Virtual File System trait and types
//!
//! This module defines the VFS abstraction the storage engine calls through
//! instead of the OS: the per-file I/O and locking surface ([`VfsFile`]) and
//! the per-process file namespace ([`Vfs`]).

use crate::error::{Error, ErrorCode, Result};
use bitflags::bitflags;

// ============================================================================
// Flags and Enums
// ============================================================================

bitflags! {
    /// Flags for opening files
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const READONLY         = 0x00000001;
        const READWRITE        = 0x00000002;
        const CREATE           = 0x00000004;
        const DELETEONCLOSE    = 0x00000008;
        const EXCLUSIVE        = 0x00000010;
        const URI              = 0x00000040;
        const MAIN_DB          = 0x00000100;
        const TEMP_DB          = 0x00000200;
        const TRANSIENT_DB     = 0x00000400;
        const MAIN_JOURNAL     = 0x00000800;
        const TEMP_JOURNAL     = 0x00001000;
        const SUBJOURNAL       = 0x00002000;
        const SUPER_JOURNAL    = 0x00004000;
        const WAL              = 0x00080000;
    }
}

bitflags! {
    /// Flags for checking file access
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        /// Check if file exists
        const EXISTS = 0;
        /// Check if file is readable and writable
        const READWRITE = 1;
        /// Check if file is readable
        const READ = 2;
    }
}

bitflags! {
    /// Flags for file sync operations
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SyncFlags: u32 {
        const NORMAL   = 0x00002;
        const FULL     = 0x00003;
        const DATAONLY = 0x00010;
    }
}

bitflags! {
    /// Device characteristics flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceCharacteristics: u32 {
        const ATOMIC                  = 0x00000001;
        const ATOMIC512               = 0x00000002;
        const ATOMIC1K                = 0x00000004;
        const ATOMIC2K                = 0x00000008;
        const ATOMIC4K                = 0x00000010;
        const ATOMIC8K                = 0x00000020;
        const ATOMIC16K               = 0x00000040;
        const ATOMIC32K               = 0x00000080;
        const ATOMIC64K               = 0x00000100;
        const SAFE_APPEND             = 0x00000200;
        const SEQUENTIAL              = 0x00000400;
        const UNDELETABLE_WHEN_OPEN   = 0x00000800;
        const POWERSAFE_OVERWRITE     = 0x00001000;
        const IMMUTABLE               = 0x00002000;
        const BATCH_ATOMIC            = 0x00004000;
    }
}

bitflags! {
    /// Flags for shared memory lock operations
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShmLockFlags: u32 {
        const UNLOCK    = 1;
        const LOCK      = 2;
        const SHARED    = 4;
        const EXCLUSIVE = 8;
    }
}

/// File lock types (from SQLite's lock state machine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(i32)]
pub enum LockType {
    /// No lock held
    #[default]
    None = 0,
    /// Shared lock (multiple readers)
    Shared = 1,
    /// Reserved lock (intend to write)
    Reserved = 2,
    /// Pending lock (waiting for exclusive)
    Pending = 3,
    /// Exclusive lock (single writer)
    Exclusive = 4,
}

impl TryFrom<i32> for LockType {
    type Error = Error;

    /// Decode the raw lock mode passed across the engine ABI.
    fn try_from(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(LockType::None),
            1 => Ok(LockType::Shared),
            2 => Ok(LockType::Reserved),
            3 => Ok(LockType::Pending),
            4 => Ok(LockType::Exclusive),
            other => Err(Error::with_message(
                ErrorCode::IoErrLock,
                format!("unknown lock mode {other}"),
            )),
        }
    }
}

/// File control operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileControlOp {
    /// Get current lock state
    LockState,
    /// Hint about expected file size
    SizeHint(i64),
    /// Set chunk size for incremental vacuum
    ChunkSize(i32),
    /// Sync was omitted
    SyncOmitted,
    /// Persist WAL file after close
    PersistWal(bool),
    /// Get temp filename
    TempFilename,
    /// Set memory-mapped I/O size
    MmapSize(i64),
    /// Check if file has moved
    HasMoved,
    /// Force sync
    Sync,
    /// Complete phase two of commit
    CommitPhaseTwo,
    /// Set lock timeout in milliseconds
    LockTimeout(i32),
    /// Get data version
    DataVersion,
    /// Custom file control operation
    Custom(i32),
}

/// Outcome of a read that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The whole buffer was filled from the file
    Complete,
    /// End of file was reached after `read` bytes; the rest of the buffer
    /// has been zero-filled
    Short { read: usize },
}

impl ReadOutcome {
    /// Result code the engine expects for this outcome
    pub fn code(self) -> ErrorCode {
        match self {
            ReadOutcome::Complete => ErrorCode::Ok,
            ReadOutcome::Short { .. } => ErrorCode::IoErrShortRead,
        }
    }

    /// Number of bytes that came from the file for a buffer of `len` bytes
    pub fn bytes_read(self, len: usize) -> usize {
        match self {
            ReadOutcome::Complete => len,
            ReadOutcome::Short { read } => read,
        }
    }
}

// ============================================================================
// VFS File Trait
// ============================================================================

/// File handle abstraction
///
/// This trait defines the interface for file operations that SQLite performs.
/// Each VFS implementation provides a concrete type implementing this trait.
pub trait VfsFile: Send + Sync {
    /// Release the handle. Always succeeds.
    fn close(&mut self) -> Result<()>;

    /// Read `buf.len()` bytes at the given offset. A read that hits end of
    /// file zero-fills the remainder and reports [`ReadOutcome::Short`].
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<ReadOutcome>;

    /// Write all of `buf` at the given offset
    fn write(&self, buf: &[u8], offset: u64) -> Result<()>;

    /// Truncate file to the given size
    fn truncate(&self, size: u64) -> Result<()>;

    /// Sync file to disk
    fn sync(&self, flags: SyncFlags) -> Result<()>;

    /// Get file size
    fn file_size(&self) -> Result<u64>;

    /// Acquire a file lock
    fn lock(&mut self, lock_type: LockType) -> Result<()>;

    /// Release a file lock
    fn unlock(&mut self, lock_type: LockType) -> Result<()>;

    /// Check if a reserved lock is held by any connection
    fn check_reserved_lock(&self) -> Result<bool>;

    /// File control operations
    fn file_control(&mut self, op: FileControlOp) -> Result<()>;

    /// Get sector size for this file
    fn sector_size(&self) -> i32 {
        4096
    }

    /// Get device characteristics
    fn device_characteristics(&self) -> DeviceCharacteristics {
        DeviceCharacteristics::empty()
    }

    /// Map shared memory region (for WAL)
    fn shm_map(&mut self, _region: i32, _size: i32, _extend: bool) -> Result<&mut [u8]> {
        Err(Error::new(ErrorCode::IoErr))
    }

    /// Lock shared memory region
    fn shm_lock(&mut self, _offset: i32, _n: i32, _flags: ShmLockFlags) -> Result<()> {
        Err(Error::new(ErrorCode::IoErr))
    }

    /// Shared memory barrier
    fn shm_barrier(&self) {}

    /// Unmap shared memory
    fn shm_unmap(&mut self, _delete: bool) -> Result<()> {
        Err(Error::new(ErrorCode::IoErr))
    }

    /// Fetch memory-mapped page
    fn fetch(&self, _offset: u64, _amount: usize) -> Result<&[u8]> {
        Err(Error::new(ErrorCode::IoErr))
    }

    /// Release memory-mapped page
    fn unfetch(&self, _offset: u64) -> Result<()> {
        Err(Error::new(ErrorCode::IoErr))
    }
}

// ============================================================================
// VFS Trait
// ============================================================================

/// Virtual File System - platform abstraction
///
/// This trait defines the file namespace the engine opens databases and
/// journals from.
pub trait Vfs: Send + Sync {
    /// File handle type produced by [`Vfs::open`]
    type File: VfsFile;

    /// VFS name (e.g., "unix", "sandboxed")
    fn name(&self) -> &str;

    /// Maximum pathname length supported
    fn max_pathname(&self) -> i32 {
        1024
    }

    /// Open a file
    fn open(&self, path: &str, flags: OpenFlags) -> Result<Self::File>;

    /// Delete a file
    fn delete(&self, path: &str, sync_dir: bool) -> Result<()>;

    /// Check if file exists/is accessible
    fn access(&self, path: &str, flags: AccessFlags) -> Result<bool>;

    /// Get full pathname from relative path
    fn full_pathname(&self, path: &str) -> Result<String>;
}

// ============================================================================
// Tests
// ============================================================================
