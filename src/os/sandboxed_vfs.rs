//! Sandboxed VFS
//!
//! The sandboxed process cannot open files by name, so the broker registers
//! pre-opened [`SandboxedFile`]s under the paths the engine will ask for.
//! Opening a path checks the requested rights and hands the file to the
//! engine; after close the engine gives it back with [`SandboxedVfs::release`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{Error, ErrorCode, Result};
use crate::os::sandboxed::{AccessRights, SandboxedFile};
use crate::os::vfs::{AccessFlags, OpenFlags, Vfs, VfsFile};

/// Default VFS name
pub const SANDBOXED_VFS_NAME: &str = "sandboxed";

/// VFS serving broker-provided files
pub struct SandboxedVfs<'m> {
    /// VFS name
    name: String,
    /// Files not currently opened by the engine, by path
    files: Mutex<HashMap<String, SandboxedFile<'m>>>,
}

impl<'m> SandboxedVfs<'m> {
    /// Create an empty VFS named "sandboxed"
    pub fn new() -> Self {
        Self::new_with_name(SANDBOXED_VFS_NAME)
    }

    /// Create an empty VFS with a custom name
    pub fn new_with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            files: Mutex::new(HashMap::new()),
        }
    }

    fn files(&self) -> MutexGuard<'_, HashMap<String, SandboxedFile<'m>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `file` available under `path`, returning any file it replaces
    pub fn register_file(
        &self,
        path: impl Into<String>,
        file: SandboxedFile<'m>,
    ) -> Option<SandboxedFile<'m>> {
        let path = path.into();
        debug!(%path, rights = ?file.access_rights(), vfs = %self.name, "registered file");
        self.files().insert(path, file)
    }

    /// Remove the file registered under `path`
    pub fn unregister_file(&self, path: &str) -> Option<SandboxedFile<'m>> {
        self.files().remove(path)
    }

    /// Give a file back after the engine is done with it.
    ///
    /// The file is closed first if the engine has not done so.
    pub fn release(&self, path: impl Into<String>, mut file: SandboxedFile<'m>) -> Result<()> {
        if file.is_open() {
            file.close()?;
        }
        let path = path.into();
        if self.files().insert(path.clone(), file).is_some() {
            warn!(%path, "released file replaced a registered one");
        }
        Ok(())
    }

    /// Whether a closed file is registered under `path`
    pub fn is_registered(&self, path: &str) -> bool {
        self.files().contains_key(path)
    }
}

impl Default for SandboxedVfs<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'m> Vfs for SandboxedVfs<'m> {
    type File = SandboxedFile<'m>;

    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<SandboxedFile<'m>> {
        let mut files = self.files();
        let mut file = files.remove(path).ok_or_else(|| {
            Error::with_message(ErrorCode::CantOpen, format!("no sandboxed file for {path}"))
        })?;

        if flags.contains(OpenFlags::READWRITE) && file.access_rights() == AccessRights::ReadOnly {
            files.insert(path.to_string(), file);
            return Err(Error::with_message(
                ErrorCode::CantOpen,
                format!("{path} is read-only in this sandbox"),
            ));
        }

        file.on_file_opened();
        Ok(file)
    }

    fn delete(&self, path: &str, _sync_dir: bool) -> Result<()> {
        Err(Error::with_message(
            ErrorCode::IoErrDelete,
            format!("cannot delete {path} from inside the sandbox"),
        ))
    }

    fn access(&self, path: &str, flags: AccessFlags) -> Result<bool> {
        let files = self.files();
        let Some(file) = files.get(path) else {
            return Ok(false);
        };

        if flags.contains(AccessFlags::READWRITE) {
            return Ok(file.access_rights() == AccessRights::ReadWrite);
        }
        Ok(true)
    }

    fn full_pathname(&self, path: &str) -> Result<String> {
        // Paths are opaque keys chosen by the broker.
        Ok(path.to_string())
    }
}
