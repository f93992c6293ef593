//! Durable writes for build output
//!
//! Cueball files are written once and then published by rename, so two things
//! must reach stable storage before a version becomes visible: the file
//! contents ([`durable_sync`]) and the directory entries the renames create
//! ([`durable_rename`], [`sync_dir`]).

use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Flush the data of `file` to stable storage.
///
/// Linux uses `fdatasync`. macOS and iOS use `fcntl(F_FULLFSYNC)`, since plain
/// `fsync` stops at the drive cache there. Windows uses `FlushFileBuffers`.
/// Anything else falls back to `File::sync_data`.
pub fn durable_sync(file: &File) -> io::Result<()> {
    flush_to_media(file)
}

#[cfg(target_os = "linux")]
fn flush_to_media(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the descriptor belongs to `file`, which outlives the call.
    check_os(unsafe { libc::fdatasync(file.as_raw_fd()) })
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn flush_to_media(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the descriptor belongs to `file`, which outlives the call.
    check_os(unsafe { libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC) })
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "ios"))]
fn check_os(ret: libc::c_int) -> io::Result<()> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(target_os = "windows")]
fn flush_to_media(file: &File) -> io::Result<()> {
    use std::os::windows::io::AsRawHandle;
    use winapi::um::fileapi::FlushFileBuffers;
    // SAFETY: the handle belongs to `file`, which outlives the call.
    if unsafe { FlushFileBuffers(file.as_raw_handle() as *mut _) } != 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios", target_os = "windows")))]
fn flush_to_media(file: &File) -> io::Result<()> {
    file.sync_data()
}

/// Persist the entries of a directory (new names from create/rename).
///
/// Directories cannot be opened for syncing on Windows; NTFS journals
/// metadata, so this is a no-op there.
pub fn sync_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(path)?.sync_all()
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

/// Rename `from` to `to` and persist the new name in `to`'s parent.
pub fn durable_rename(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)?;
    match to.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => sync_dir(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_durable_sync_success() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"cueball block").unwrap();

        let result = durable_sync(file.as_file());
        assert!(result.is_ok(), "durable_sync failed: {:?}", result.err());
    }

    #[test]
    fn test_sync_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("f"), b"x").unwrap();
        assert!(sync_dir(dir.path()).is_ok());
    }

    #[test]
    fn test_sync_missing_dir_fails_on_unix() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        if cfg!(unix) {
            assert!(sync_dir(&missing).is_err());
        }
    }

    #[test]
    fn test_durable_rename_moves_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let from = dir.path().join("pending");
        std::fs::create_dir(&from).unwrap();
        std::fs::write(from.join("f"), b"x").unwrap();

        let to = dir.path().join("v1");
        durable_rename(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(to.join("f")).unwrap(), b"x");
    }

    #[test]
    fn test_durable_rename_missing_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = durable_rename(&dir.path().join("absent"), &dir.path().join("v1"));
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
        assert!(!dir.path().join("v1").exists());
    }
}
