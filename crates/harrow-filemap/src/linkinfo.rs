//! Cross-platform file identity for hardlink detection.
//!
//! POSIX exposes `(dev, ino, nlink)` through a plain stat; Windows needs
//! a handle and the by-handle information call, taking care not to
//! follow symlinks through `CreateFileW`.

use std::io;
use std::path::Path;

/// Resolve a path to its filesystem identity key and observed link count.
///
/// The identity key is stable within one run and distinguishes files
/// across volumes.
pub fn link_info(path: &Path) -> io::Result<(String, u64)> {
    imp::link_info(path)
}

#[cfg(unix)]
mod imp {
    use std::io;
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;

    pub(super) fn link_info(path: &Path) -> io::Result<(String, u64)> {
        let meta = std::fs::metadata(path)?;
        Ok((format!("{}|{}", meta.dev(), meta.ino()), meta.nlink()))
    }
}

#[cfg(windows)]
mod imp {
    use std::ffi::OsStr;
    use std::io;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    use windows_sys::Win32::Foundation::{CloseHandle, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::Storage::FileSystem::{
        CreateFileW, GetFileInformationByHandle, BY_HANDLE_FILE_INFORMATION,
        FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OPEN_REPARSE_POINT, OPEN_EXISTING,
    };

    pub(super) fn link_info(path: &Path) -> io::Result<(String, u64)> {
        let mut flags = FILE_FLAG_BACKUP_SEMANTICS;
        if std::fs::symlink_metadata(path)?.file_type().is_symlink() {
            // without this flag CreateFileW would open the link target
            flags |= FILE_FLAG_OPEN_REPARSE_POINT;
        }

        let wide: Vec<u16> = OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                0,
                0,
                std::ptr::null(),
                OPEN_EXISTING,
                flags,
                std::ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }

        let mut info: BY_HANDLE_FILE_INFORMATION = unsafe { std::mem::zeroed() };
        let ok = unsafe { GetFileInformationByHandle(handle, &mut info) };
        unsafe { CloseHandle(handle) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }

        let identity = format!(
            "{}|{}|{}",
            info.dwVolumeSerialNumber, info.nFileIndexHigh, info.nFileIndexLow
        );
        Ok((identity, u64::from(info.nNumberOfLinks)))
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    use std::io;
    use std::path::Path;

    pub(super) fn link_info(_path: &Path) -> io::Result<(String, u64)> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "hardlink identity is not available on this platform",
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn hardlinked_files_share_identity_and_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let original = dir.path().join("original.bin");
        let linked = dir.path().join("linked.bin");
        std::fs::write(&original, b"payload").expect("write");
        std::fs::hard_link(&original, &linked).expect("hard link");

        let (id_a, nlink_a) = link_info(&original).expect("link info");
        let (id_b, nlink_b) = link_info(&linked).expect("link info");
        assert_eq!(id_a, id_b);
        assert_eq!(nlink_a, 2);
        assert_eq!(nlink_b, 2);
    }

    #[test]
    fn distinct_files_have_distinct_identity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"a").expect("write");
        std::fs::write(&b, b"b").expect("write");

        let (id_a, nlink_a) = link_info(&a).expect("link info");
        let (id_b, _) = link_info(&b).expect("link info");
        assert_ne!(id_a, id_b);
        assert_eq!(nlink_a, 1);
    }

    #[test]
    fn missing_file_reports_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = link_info(&dir.path().join("gone.bin")).expect_err("should fail");
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
