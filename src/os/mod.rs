//! OS abstraction layer: VFS traits and the sandboxed implementation

pub mod vfs;
pub mod lock_word;
pub mod shm;
pub mod sandboxed;
pub mod sandboxed_vfs;
