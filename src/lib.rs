//! Sandboxed VFS - file I/O and SQLite-style locking for processes that may
//! not open files or take OS locks themselves

pub mod config;
pub mod error;
pub mod os;

// Re-export main public types
pub use config::LockConfig;
pub use error::{Error, ErrorCode, Result};

pub use os::lock_word::LockWord;
pub use os::sandboxed::{AccessRights, SandboxedFile};
pub use os::sandboxed_vfs::SandboxedVfs;
pub use os::shm::SharedLockRegion;
pub use os::vfs::{LockType, OpenFlags, ReadOutcome, SyncFlags, Vfs, VfsFile};
