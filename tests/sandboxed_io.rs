use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use sandboxed_vfs::error::read_result_code;
use sandboxed_vfs::{
    AccessRights, ErrorCode, ReadOutcome, SandboxedFile, SharedLockRegion, SyncFlags, VfsFile,
};
use tempfile::tempdir;

fn open_rw(path: &Path) -> File {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .unwrap()
}

fn sandboxed<'m>(
    file: File,
    path: Option<&Path>,
    rights: AccessRights,
    region: &'m SharedLockRegion,
) -> SandboxedFile<'m> {
    let mut file = SandboxedFile::new(file, path.map(Path::to_path_buf), rights, region.lock_word());
    file.on_file_opened();
    file
}

#[test]
fn test_read_write_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("main.db");
    let region = SharedLockRegion::in_process();
    let file = sandboxed(open_rw(&path), Some(&path), AccessRights::ReadWrite, &region);

    file.write(b"SQLite format 3\0", 0).unwrap();
    file.write(&[7u8; 16], 16).unwrap();

    let mut buf = [0u8; 32];
    assert_eq!(file.read(&mut buf, 0).unwrap(), ReadOutcome::Complete);
    assert_eq!(&buf[..16], b"SQLite format 3\0");
    assert_eq!(&buf[16..], &[7u8; 16]);
    assert_eq!(file.file_size().unwrap(), 32);
}

#[test]
fn test_read_past_eof_zero_fills_tail() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("main.db");
    let region = SharedLockRegion::in_process();
    let file = sandboxed(open_rw(&path), None, AccessRights::ReadWrite, &region);

    file.write(b"abcd", 0).unwrap();

    let mut buf = [0xAAu8; 10];
    let outcome = file.read(&mut buf, 2).unwrap();
    assert_eq!(outcome, ReadOutcome::Short { read: 2 });
    assert_eq!(outcome.code(), ErrorCode::IoErrShortRead);
    assert_eq!(&buf, b"cd\0\0\0\0\0\0\0\0");

    let mut page = [0xFFu8; 4096];
    let outcome = file.read(&mut page, 8192).unwrap();
    assert_eq!(outcome, ReadOutcome::Short { read: 0 });
    assert!(page.iter().all(|&b| b == 0));
}

#[test]
fn test_short_read_reports_short_read_code() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.db");
    let region = SharedLockRegion::in_process();
    let file = sandboxed(open_rw(&path), None, AccessRights::ReadWrite, &region);

    let mut buf = [0xAAu8; 8];
    let result = file.read(&mut buf, 0);
    assert_eq!(read_result_code(&result), 522);
    assert_eq!(buf, [0u8; 8]);

    file.write(&[3u8; 8], 0).unwrap();
    let result = file.read(&mut buf, 0);
    assert_eq!(read_result_code(&result), 0);
}

#[test]
fn test_read_failure_is_ioerr_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("main.db");
    std::fs::write(&path, b"data").unwrap();
    let region = SharedLockRegion::in_process();

    let write_only = OpenOptions::new().write(true).open(&path).unwrap();
    let file = sandboxed(write_only, None, AccessRights::ReadWrite, &region);

    let mut buf = [0u8; 4];
    let err = file.read(&mut buf, 0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IoErrRead);
}

#[test]
fn test_write_failure_is_ioerr_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("main.db");
    std::fs::write(&path, b"data").unwrap();
    let region = SharedLockRegion::in_process();

    let read_only = File::open(&path).unwrap();
    let file = sandboxed(read_only, Some(&path), AccessRights::ReadOnly, &region);

    let err = file.write(b"more", 4).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IoErrWrite);
}

#[cfg(target_os = "linux")]
#[test]
fn test_disk_full_is_reported_as_full() {
    let region = SharedLockRegion::in_process();
    let full = OpenOptions::new().write(true).open("/dev/full").unwrap();
    let file = sandboxed(full, None, AccessRights::ReadWrite, &region);

    let err = file.write(&[0u8; 512], 0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Full);
}

#[test]
fn test_truncate_and_sync() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("main.db");
    let region = SharedLockRegion::in_process();
    let file = sandboxed(open_rw(&path), None, AccessRights::ReadWrite, &region);

    file.write(&[1u8; 8192], 0).unwrap();
    file.sync(SyncFlags::NORMAL).unwrap();
    file.truncate(4096).unwrap();
    file.sync(SyncFlags::FULL | SyncFlags::DATAONLY).unwrap();
    assert_eq!(file.file_size().unwrap(), 4096);
}

#[test]
fn test_truncate_failure_is_ioerr_truncate() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("main.db");
    std::fs::write(&path, b"data").unwrap();
    let region = SharedLockRegion::in_process();
    let file = sandboxed(File::open(&path).unwrap(), None, AccessRights::ReadOnly, &region);

    let err = file.truncate(0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IoErrTruncate);
}

#[test]
fn test_duplicate_with_same_rights() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("main.db");
    let region = SharedLockRegion::in_process();
    let file = sandboxed(open_rw(&path), None, AccessRights::ReadWrite, &region);

    let mut dup = file.duplicate_file(AccessRights::ReadWrite).unwrap();
    dup.write_all(b"via duplicate").unwrap();

    let mut buf = [0u8; 13];
    assert_eq!(file.read(&mut buf, 0).unwrap(), ReadOutcome::Complete);
    assert_eq!(&buf, b"via duplicate");
}

#[test]
fn test_duplicate_downgrades_to_read_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("main.db");
    let region = SharedLockRegion::in_process();
    let file = SandboxedFile::new(
        open_rw(&path),
        Some(path.clone()),
        AccessRights::ReadWrite,
        region.lock_word(),
    );

    // Works before the engine opens the file as well.
    let mut dup = file.duplicate_file(AccessRights::ReadOnly).unwrap();
    assert!(dup.write_all(b"nope").is_err());
}

#[test]
#[should_panic(expected = "cannot upgrade")]
fn test_duplicate_cannot_upgrade() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("main.db");
    std::fs::write(&path, b"").unwrap();
    let region = SharedLockRegion::in_process();
    let file = sandboxed(File::open(&path).unwrap(), Some(&path), AccessRights::ReadOnly, &region);
    let _ = file.duplicate_file(AccessRights::ReadWrite);
}

#[test]
#[should_panic(expected = "requires a file path")]
fn test_downgrade_without_path_panics() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("main.db");
    let region = SharedLockRegion::in_process();
    let file = sandboxed(open_rw(&path), None, AccessRights::ReadWrite, &region);
    let _ = file.duplicate_file(AccessRights::ReadOnly);
}
