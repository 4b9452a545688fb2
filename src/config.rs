//! Lock protocol configuration
//!
//! Per-file settings for the shared lock word protocol. There is no global
//! configuration; each [`SandboxedFile`](crate::os::sandboxed::SandboxedFile)
//! carries its own copy.

/// Compare-and-swap attempts made when acquiring SHARED
pub const DEFAULT_SHARED_LOCK_ATTEMPTS: u32 = 4;

/// Settings for the shared lock word protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Number of CAS attempts before SHARED acquisition reports busy
    shared_lock_attempts: u32,
}

impl LockConfig {
    /// Configuration with the default attempt count
    pub fn new() -> Self {
        Self {
            shared_lock_attempts: DEFAULT_SHARED_LOCK_ATTEMPTS,
        }
    }

    /// Set the CAS attempt count for SHARED acquisition (at least one)
    pub fn with_shared_lock_attempts(mut self, attempts: u32) -> Self {
        self.shared_lock_attempts = attempts.max(1);
        self
    }

    /// CAS attempt count for SHARED acquisition
    pub fn shared_lock_attempts(&self) -> u32 {
        self.shared_lock_attempts
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::new()
    }
}
