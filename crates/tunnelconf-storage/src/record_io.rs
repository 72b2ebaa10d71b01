//! Lock-aware reads, atomic create-or-overwrite writes, and removal of
//! configuration files.
//!
//! Writers that still hold a file are detected in two ways: on Windows the
//! read-write open itself fails with a sharing violation; on every platform an
//! exclusive advisory lock is then attempted on the open handle, and contention
//! means another writer holds the file.

use std::{
    fs::{self, OpenOptions},
    io::{self, ErrorKind, Read, Write},
    path::Path,
};

use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::debug;
use tunnelconf_core::ConfError;

#[cfg(windows)]
use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, ERROR_SHARING_VIOLATION};

/// Reads all of `path`, failing with `SharingViolation` if another writer
/// still holds it.
///
/// The file is opened read-write rather than read-only so the OS can refuse
/// access while a writer is active, instead of handing back a partial file.
pub fn read_exclusive(path: &Path) -> Result<Vec<u8>, ConfError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|err| classify(path, err))?;

    file.try_lock_exclusive()
        .map_err(|err| classify(path, err))?;

    let mut buf = Vec::new();
    let read = file.read_to_end(&mut buf);
    // Closing the handle releases the lock as well; unlocking first keeps the
    // window short on platforms that defer close.
    let _ = FileExt::unlock(&file);
    drop(file);
    read.map_err(|err| classify(path, err))?;
    Ok(buf)
}

/// Plain read of a whole file.
pub fn read(path: &Path) -> Result<Vec<u8>, ConfError> {
    fs::read(path).map_err(|err| ConfError::io(path, err))
}

/// Writes `bytes` to `path` so that the final name only ever refers to a
/// complete file.
///
/// With `overwrite == false` an existing file is left alone and the call
/// fails with `AlreadyExists`. The file is readable and writable by its owner
/// only.
pub fn write_atomic(path: &Path, overwrite: bool, bytes: &[u8]) -> Result<(), ConfError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| ConfError::io(path, "path has no parent directory"))?;

    if !overwrite && path.exists() {
        return Err(ConfError::already_exists(path));
    }

    let mut tmp = tempfile::Builder::new()
        .prefix(".tunnelconf-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|err| ConfError::io(parent, err))?;
    restrict_permissions(&tmp).map_err(|err| ConfError::io(tmp.path(), err))?;
    tmp.write_all(bytes)
        .map_err(|err| ConfError::io(tmp.path(), err))?;
    tmp.flush().map_err(|err| ConfError::io(tmp.path(), err))?;
    tmp.as_file()
        .sync_all()
        .map_err(|err| ConfError::io(tmp.path(), err))?;

    commit(tmp, path, overwrite)?;
    // The rename only counts once the directory entry is on disk.
    sync_dir(parent).map_err(|err| ConfError::io(parent, err))?;
    debug!(path = %path.display(), overwrite, "wrote configuration file");
    Ok(())
}

/// Deletes `path`. A missing file is an error.
pub fn remove(path: &Path) -> Result<(), ConfError> {
    fs::remove_file(path).map_err(|err| ConfError::io(path, err))
}

fn commit(tmp: NamedTempFile, path: &Path, overwrite: bool) -> Result<(), ConfError> {
    let persisted = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    persisted.map(|_| ()).map_err(|err| {
        if err.error.kind() == ErrorKind::AlreadyExists {
            ConfError::already_exists(path)
        } else {
            ConfError::io(path, err.error)
        }
    })
}

fn classify(path: &Path, err: io::Error) -> ConfError {
    if is_sharing_violation(&err) {
        ConfError::sharing_violation(path)
    } else {
        ConfError::io(path, err)
    }
}

fn is_sharing_violation(err: &io::Error) -> bool {
    #[cfg(windows)]
    {
        let code = err.raw_os_error();
        if code == Some(ERROR_SHARING_VIOLATION as i32) || code == Some(ERROR_LOCK_VIOLATION as i32) {
            return true;
        }
    }
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(unix)]
fn restrict_permissions(tmp: &NamedTempFile) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_tmp: &NamedTempFile) -> io::Result<()> {
    // Inherits the access-controlled ACL of the configuration directory.
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
