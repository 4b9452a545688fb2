//! Error types and Result aliases for the sandboxed VFS
//!
//! Every recoverable outcome carries an [`ErrorCode`] whose numeric value
//! matches the SQLite result code ABI, so a bridge layer can hand it to the
//! engine unchanged. Protocol violations by the caller are not represented
//! here; they panic.

use std::fmt;

use thiserror::Error;

use crate::os::vfs::ReadOutcome;

/// SQLite primary and extended result codes used by the VFS layer.
///
/// These match the numeric values from C SQLite's `sqlite3.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Successful result
    Ok = 0,
    /// Database file is locked
    Busy = 5,
    /// Disk I/O error
    IoErr = 10,
    /// Unknown opcode in file control
    NotFound = 12,
    /// Database or disk is full
    Full = 13,
    /// Unable to open database file
    CantOpen = 14,
    /// I/O error during read
    IoErrRead = 10 | (1 << 8),
    /// Read returned fewer bytes than requested
    IoErrShortRead = 10 | (2 << 8),
    /// I/O error during write
    IoErrWrite = 10 | (3 << 8),
    /// I/O error during fsync
    IoErrFsync = 10 | (4 << 8),
    /// I/O error during truncate
    IoErrTruncate = 10 | (6 << 8),
    /// I/O error during fstat
    IoErrFstat = 10 | (7 << 8),
    /// I/O error during delete
    IoErrDelete = 10 | (10 << 8),
    /// I/O error in the locking layer
    IoErrLock = 10 | (15 << 8),
}

impl ErrorCode {
    /// Raw integer value as seen by the engine
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Primary result code (low byte of an extended code)
    pub fn primary(self) -> i32 {
        self.as_raw() & 0xff
    }

    /// Short description, in the wording of `sqlite3_errstr`
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Ok => "not an error",
            ErrorCode::Busy => "database is locked",
            ErrorCode::NotFound => "unknown operation",
            ErrorCode::Full => "database or disk is full",
            ErrorCode::CantOpen => "unable to open database file",
            ErrorCode::IoErr
            | ErrorCode::IoErrRead
            | ErrorCode::IoErrShortRead
            | ErrorCode::IoErrWrite
            | ErrorCode::IoErrFsync
            | ErrorCode::IoErrTruncate
            | ErrorCode::IoErrFstat
            | ErrorCode::IoErrDelete
            | ErrorCode::IoErrLock => "disk I/O error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Error returned by VFS operations
#[derive(Debug, Error)]
#[error("{code}{}", detail_suffix(.message))]
pub struct Error {
    code: ErrorCode,
    message: Option<String>,
    #[source]
    source: Option<std::io::Error>,
}

fn detail_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

impl Error {
    /// Create an error carrying only a result code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
            source: None,
        }
    }

    /// Create an error with a descriptive message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            source: None,
        }
    }

    /// Wrap an OS error under the given result code
    pub fn from_io(code: ErrorCode, err: std::io::Error) -> Self {
        Self {
            code,
            message: Some(err.to_string()),
            source: Some(err),
        }
    }

    /// Result code for the engine
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Optional detail message
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// True for lock contention, which callers retry rather than abort on
    pub fn is_busy(&self) -> bool {
        self.code == ErrorCode::Busy
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Error::new(code)
    }
}

/// Result type alias for VFS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Collapse a VFS result into the raw code the engine expects
pub fn result_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => ErrorCode::Ok.as_raw(),
        Err(err) => err.code().as_raw(),
    }
}

/// Collapse a read result into the raw code the engine expects.
///
/// A short read succeeds with zero-filled data but still reports
/// `IOERR_SHORT_READ`.
pub fn read_result_code(result: &Result<ReadOutcome>) -> i32 {
    match result {
        Ok(outcome) => outcome.code().as_raw(),
        Err(err) => err.code().as_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_codes_match_abi() {
        assert_eq!(ErrorCode::IoErrRead.as_raw(), 266);
        assert_eq!(ErrorCode::IoErrShortRead.as_raw(), 522);
        assert_eq!(ErrorCode::IoErrWrite.as_raw(), 778);
        assert_eq!(ErrorCode::IoErrFsync.as_raw(), 1034);
        assert_eq!(ErrorCode::IoErrTruncate.as_raw(), 1546);
        assert_eq!(ErrorCode::IoErrFstat.as_raw(), 1802);
        assert_eq!(ErrorCode::IoErrDelete.as_raw(), 2570);
        assert_eq!(ErrorCode::IoErrLock.as_raw(), 3850);
    }

    #[test]
    fn test_primary_code() {
        assert_eq!(ErrorCode::IoErrWrite.primary(), ErrorCode::IoErr.as_raw());
        assert_eq!(ErrorCode::Busy.primary(), 5);
    }

    #[test]
    fn test_display_includes_message() {
        let err = Error::with_message(ErrorCode::CantOpen, "no such file: main.db");
        assert_eq!(
            err.to_string(),
            "unable to open database file: no such file: main.db"
        );
        assert_eq!(Error::new(ErrorCode::Busy).to_string(), "database is locked");
    }

    #[test]
    fn test_result_code() {
        let ok: Result<()> = Ok(());
        assert_eq!(result_code(&ok), 0);
        let busy: Result<()> = Err(ErrorCode::Busy.into());
        assert_eq!(result_code(&busy), 5);
        assert!(busy.unwrap_err().is_busy());
    }

    #[test]
    fn test_read_result_code_keeps_short_read() {
        assert_eq!(read_result_code(&Ok(ReadOutcome::Complete)), 0);
        assert_eq!(read_result_code(&Ok(ReadOutcome::Short { read: 0 })), 522);
        let failed: Result<ReadOutcome> = Err(ErrorCode::IoErrRead.into());
        assert_eq!(read_result_code(&failed), 266);
    }
}
