//! Sandboxed file
//!
//! A [`VfsFile`] for processes that may not open files or take OS locks. The
//! broker hands over an already-open handle, and locking is emulated on a
//! [`LockWord`] in memory shared by every process using the database.
//!
//! Lock protocol on the word:
//!
//! - SHARED bumps the shared count with CAS, refused while PENDING is set.
//! - RESERVED sets the RESERVED bit; only one holder system-wide.
//! - EXCLUSIVE first sets PENDING (which keeps new readers out), then
//!   succeeds once the shared count has drained to this connection's own one.
//!   PENDING is kept across busy retries. It may be requested straight from
//!   SHARED, which is how hot-journal recovery escalates.
//!
//! Contention is reported as [`ErrorCode::Busy`]; calls that break the
//! protocol panic.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::config::LockConfig;
use crate::error::{Error, ErrorCode, Result};
use crate::os::lock_word::{shared_count, LockWord, MAX_SHARED_LOCKS, PENDING_BIT, RESERVED_BIT};
use crate::os::vfs::{
    DeviceCharacteristics, FileControlOp, LockType, ReadOutcome, ShmLockFlags, SyncFlags, VfsFile,
};

// ============================================================================
// Platform-specific helpers
// ============================================================================

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

/// Whether a write failed because the device or quota is full
#[cfg(unix)]
fn is_out_of_space(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOSPC) | Some(libc::EDQUOT))
}

#[cfg(windows)]
fn is_out_of_space(err: &io::Error) -> bool {
    const ERROR_HANDLE_DISK_FULL: i32 = 39;
    const ERROR_DISK_FULL: i32 = 112;
    matches!(
        err.raw_os_error(),
        Some(ERROR_HANDLE_DISK_FULL) | Some(ERROR_DISK_FULL)
    )
}

/// Position `done` bytes past `offset`, failing with `code` on overflow
fn advance(offset: u64, done: usize, code: ErrorCode) -> Result<u64> {
    offset
        .checked_add(done as u64)
        .ok_or_else(|| Error::with_message(code, "file offset overflows"))
}

// ============================================================================
// Sandboxed File
// ============================================================================

/// Rights a handle was opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessRights {
    /// Reads only
    ReadOnly,
    /// Reads and writes
    ReadWrite,
}

/// File handle usable from inside the sandbox
pub struct SandboxedFile<'m> {
    /// Handle while the engine has not opened the file
    underlying_file: Option<File>,
    /// Handle while the engine has the file open
    opened_file: Option<File>,
    /// Path used to reopen with fewer rights
    file_path: Option<PathBuf>,
    /// Rights of the handle; never upgraded
    access_rights: AccessRights,
    /// Lock state shared with every other connection to the database
    lock_word: LockWord<'m>,
    /// Lock level held by this connection
    lock_type: LockType,
    /// Whether this connection set the RESERVED bit
    holds_reserved: bool,
    config: LockConfig,
}

impl<'m> SandboxedFile<'m> {
    /// Wrap a handle the broker opened with `access_rights`.
    ///
    /// `file_path` is only needed to hand out read-only duplicates of a
    /// read-write file.
    pub fn new(
        file: File,
        file_path: Option<PathBuf>,
        access_rights: AccessRights,
        lock_word: LockWord<'m>,
    ) -> Self {
        Self {
            underlying_file: Some(file),
            opened_file: None,
            file_path,
            access_rights,
            lock_word,
            lock_type: LockType::None,
            holds_reserved: false,
            config: LockConfig::default(),
        }
    }

    /// Replace the lock protocol settings
    pub fn with_lock_config(mut self, config: LockConfig) -> Self {
        self.config = config;
        self
    }

    /// Called by the VFS when the engine opens the file.
    ///
    /// # Panics
    ///
    /// Panics if the file is already open.
    pub fn on_file_opened(&mut self) {
        let file = match self.underlying_file.take() {
            Some(file) => file,
            None => panic!("sandboxed file opened twice"),
        };
        self.opened_file = Some(file);
        debug!(path = ?self.file_path, rights = ?self.access_rights, "sandboxed file opened");
    }

    /// Whether the engine currently has the file open
    pub fn is_open(&self) -> bool {
        self.opened_file.is_some()
    }

    /// Rights this file was created with
    pub fn access_rights(&self) -> AccessRights {
        self.access_rights
    }

    /// Path supplied by the broker, if any
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Lock level held by this connection
    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    /// Lock word this file coordinates through
    pub fn lock_word(&self) -> LockWord<'m> {
        self.lock_word
    }

    /// Produce an independent OS handle to the same file.
    ///
    /// Requesting the file's own rights clones the handle. Requesting
    /// read-only from a read-write file reopens it by path.
    ///
    /// # Panics
    ///
    /// Panics when asked to upgrade a read-only file, or when a downgrade is
    /// needed and no path was supplied.
    pub fn duplicate_file(&self, access_rights: AccessRights) -> Result<File> {
        assert!(
            access_rights <= self.access_rights,
            "cannot upgrade a read-only sandboxed file to read-write"
        );

        if access_rights == self.access_rights {
            return self
                .handle()
                .try_clone()
                .map_err(|e| Error::from_io(ErrorCode::CantOpen, e));
        }

        let path = match &self.file_path {
            Some(path) => path,
            None => panic!("read-only duplicate requires a file path"),
        };
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| Error::from_io(ErrorCode::CantOpen, e))?;
        debug!(path = %path.display(), "reopened sandboxed file read-only");
        Ok(file)
    }

    /// The handle in whichever slot currently holds it
    fn handle(&self) -> &File {
        match (&self.opened_file, &self.underlying_file) {
            (Some(file), _) | (None, Some(file)) => file,
            (None, None) => unreachable!("sandboxed file lost its handle"),
        }
    }

    /// The handle the engine opened; I/O before open breaks the protocol
    fn opened(&self) -> &File {
        match &self.opened_file {
            Some(file) => file,
            None => panic!("I/O on a sandboxed file that is not open"),
        }
    }

    // ------------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------------

    fn lock_shared(&mut self) -> Result<()> {
        let mut current = self.lock_word.load();
        for _ in 0..self.config.shared_lock_attempts() {
            if current & PENDING_BIT != 0 || shared_count(current) >= MAX_SHARED_LOCKS {
                break;
            }
            match self.lock_word.compare_exchange(current, current + 1) {
                Ok(_) => {
                    self.lock_type = LockType::Shared;
                    return Ok(());
                }
                Err(observed) => current = observed,
            }
        }
        trace!(word = ?self.lock_word, "shared lock busy");
        Err(Error::new(ErrorCode::Busy))
    }

    fn lock_reserved(&mut self) -> Result<()> {
        assert_eq!(
            self.lock_type,
            LockType::Shared,
            "RESERVED requires holding exactly SHARED"
        );

        let previous = self.lock_word.fetch_or(RESERVED_BIT);
        if previous & RESERVED_BIT != 0 {
            trace!(word = ?self.lock_word, "reserved lock busy");
            return Err(Error::new(ErrorCode::Busy));
        }
        self.holds_reserved = true;
        self.lock_type = LockType::Reserved;
        Ok(())
    }

    fn lock_exclusive(&mut self) -> Result<()> {
        assert!(
            self.lock_type >= LockType::Shared,
            "EXCLUSIVE requires holding at least SHARED"
        );

        if self.lock_type < LockType::Pending {
            let previous = self.lock_word.fetch_or(PENDING_BIT);
            if previous & PENDING_BIT != 0 {
                trace!(word = ?self.lock_word, "pending lock held elsewhere");
                return Err(Error::new(ErrorCode::Busy));
            }
            self.lock_type = LockType::Pending;
        }

        // Our own SHARED is the one that must remain.
        if self.lock_word.shared_count() != 1 {
            trace!(word = ?self.lock_word, "waiting for readers to drain");
            return Err(Error::new(ErrorCode::Busy));
        }
        self.lock_type = LockType::Exclusive;
        Ok(())
    }

    /// Drop RESERVED and PENDING contributions, keeping SHARED
    fn release_write_intent(&mut self) {
        let mut bits = 0;
        if self.holds_reserved {
            bits |= RESERVED_BIT;
        }
        if self.lock_type >= LockType::Pending {
            bits |= PENDING_BIT;
        }
        if bits != 0 {
            self.lock_word.fetch_and(!bits);
        }
        self.holds_reserved = false;
    }
}

impl std::fmt::Debug for SandboxedFile<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxedFile")
            .field("file_path", &self.file_path)
            .field("access_rights", &self.access_rights)
            .field("open", &self.is_open())
            .field("lock_type", &self.lock_type)
            .field("lock_word", &self.lock_word)
            .finish()
    }
}

impl VfsFile for SandboxedFile<'_> {
    fn close(&mut self) -> Result<()> {
        if let Some(file) = self.opened_file.take() {
            self.underlying_file = Some(file);
        }
        debug!(path = ?self.file_path, "sandboxed file closed");
        Ok(())
    }

    fn read(&self, buf: &mut [u8], offset: u64) -> Result<ReadOutcome> {
        let file = self.opened();
        let mut filled = 0;

        while filled < buf.len() {
            let at = advance(offset, filled, ErrorCode::IoErrRead)?;
            match read_at(file, &mut buf[filled..], at) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(offset, len = buf.len(), error = %e, "sandboxed read failed");
                    return Err(Error::from_io(ErrorCode::IoErrRead, e));
                }
            }
        }

        if filled < buf.len() {
            // Pages past the end of file must read as zeros.
            buf[filled..].fill(0);
            return Ok(ReadOutcome::Short { read: filled });
        }
        Ok(ReadOutcome::Complete)
    }

    fn write(&self, buf: &[u8], offset: u64) -> Result<()> {
        let file = self.opened();
        let mut written = 0;

        while written < buf.len() {
            let at = advance(offset, written, ErrorCode::IoErrWrite)?;
            match write_at(file, &buf[written..], at) {
                Ok(0) => {
                    warn!(offset, written, len = buf.len(), "sandboxed write stalled");
                    return Err(Error::with_message(ErrorCode::IoErrWrite, "short write"));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_out_of_space(&e) => {
                    warn!(offset, len = buf.len(), "sandboxed write: no space left");
                    return Err(Error::from_io(ErrorCode::Full, e));
                }
                Err(e) => {
                    warn!(offset, len = buf.len(), error = %e, "sandboxed write failed");
                    return Err(Error::from_io(ErrorCode::IoErrWrite, e));
                }
            }
        }
        Ok(())
    }

    fn truncate(&self, size: u64) -> Result<()> {
        self.opened().set_len(size).map_err(|e| {
            warn!(size, error = %e, "sandboxed truncate failed");
            Error::from_io(ErrorCode::IoErrTruncate, e)
        })
    }

    fn sync(&self, flags: SyncFlags) -> Result<()> {
        let file = self.opened();
        let rc = if flags.contains(SyncFlags::DATAONLY) {
            file.sync_data()
        } else {
            file.sync_all()
        };
        rc.map_err(|e| {
            warn!(?flags, error = %e, "sandboxed sync failed");
            Error::from_io(ErrorCode::IoErrFsync, e)
        })
    }

    fn file_size(&self) -> Result<u64> {
        self.opened()
            .metadata()
            .map(|m| m.len())
            .map_err(|e| Error::from_io(ErrorCode::IoErrFstat, e))
    }

    fn lock(&mut self, lock_type: LockType) -> Result<()> {
        // Already have this lock or better
        if lock_type <= self.lock_type {
            return Ok(());
        }

        let result = match lock_type {
            LockType::Shared => self.lock_shared(),
            LockType::Reserved => self.lock_reserved(),
            LockType::Exclusive => self.lock_exclusive(),
            LockType::None | LockType::Pending => {
                panic!("invalid lock request: {lock_type:?}")
            }
        };
        if result.is_ok() {
            trace!(?lock_type, word = ?self.lock_word, "lock acquired");
        }
        result
    }

    fn unlock(&mut self, lock_type: LockType) -> Result<()> {
        assert!(
            matches!(lock_type, LockType::None | LockType::Shared),
            "invalid unlock request: {lock_type:?}"
        );

        // Nothing to do
        if lock_type >= self.lock_type {
            return Ok(());
        }

        self.release_write_intent();

        if lock_type == LockType::None {
            let previous = self.lock_word.fetch_sub(1);
            assert!(
                shared_count(previous) >= 1,
                "shared lock count underflow"
            );
        }

        self.lock_type = lock_type;
        trace!(?lock_type, word = ?self.lock_word, "lock released");
        Ok(())
    }

    fn check_reserved_lock(&self) -> Result<bool> {
        Ok(self.lock_word.is_reserved())
    }

    fn file_control(&mut self, _op: FileControlOp) -> Result<()> {
        Err(Error::new(ErrorCode::NotFound))
    }

    fn sector_size(&self) -> i32 {
        0
    }

    fn device_characteristics(&self) -> DeviceCharacteristics {
        DeviceCharacteristics::empty()
    }

    fn shm_map(&mut self, _region: i32, _size: i32, _extend: bool) -> Result<&mut [u8]> {
        Err(Error::with_message(ErrorCode::IoErr, "shared memory map unsupported"))
    }

    fn shm_lock(&mut self, _offset: i32, _n: i32, _flags: ShmLockFlags) -> Result<()> {
        Err(Error::with_message(ErrorCode::IoErr, "shared memory lock unsupported"))
    }

    fn shm_barrier(&self) {}

    fn shm_unmap(&mut self, _delete: bool) -> Result<()> {
        Err(Error::with_message(ErrorCode::IoErr, "shared memory unmap unsupported"))
    }

    fn fetch(&self, _offset: u64, _amount: usize) -> Result<&[u8]> {
        Err(Error::with_message(ErrorCode::IoErr, "memory-mapped I/O unsupported"))
    }

    fn unfetch(&self, _offset: u64) -> Result<()> {
        Err(Error::with_message(ErrorCode::IoErr, "memory-mapped I/O unsupported"))
    }
}

// ============================================================================
// Tests
// ============================================================================
