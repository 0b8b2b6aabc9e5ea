//! Owned write descriptors for entries created under a directory handle.

use std::fs::File;
use std::io::Write as _;
use std::os::fd::IntoRawFd as _;
use std::path::{Path, PathBuf};

use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;

use crate::dir::DirHandle;
use crate::error::{self, IoError, Op};

/// An open descriptor for writing one directory entry.
///
/// Created write-only with close-on-exec, truncating anything already
/// present under the name. Mode `0644` applies, subject to the umask.
/// The handle is the descriptor's only owner; dropping it releases the
/// descriptor silently, while [`WriteHandle::close`] surfaces the error.
pub(crate) struct WriteHandle {
    dir_path: PathBuf,
    name: PathBuf,
    file: File,
}

impl WriteHandle {
    /// Creates or truncates `name` under `dir`.
    pub(crate) fn create(dir: &DirHandle, name: &Path) -> Result<WriteHandle, IoError> {
        let fd = fcntl::openat(
            dir.fd(),
            name,
            OFlag::O_CREAT | OFlag::O_WRONLY | OFlag::O_TRUNC | OFlag::O_CLOEXEC,
            Mode::from_bits_truncate(0o644),
        )
        .map_err(|errno| IoError::entry(Op::Open, dir.path(), name, error::os_error(errno)))?;
        Ok(WriteHandle {
            dir_path: dir.path().to_path_buf(),
            name: name.to_path_buf(),
            file: File::from(fd),
        })
    }

    /// Writes the whole buffer, continuing over short writes until every
    /// byte has been consumed. Partial writes are never surfaced.
    pub(crate) fn write_all(&mut self, payload: &[u8]) -> Result<(), IoError> {
        self.file
            .write_all(payload)
            .map_err(|source| IoError::entry(Op::Write, &self.dir_path, &self.name, source))
    }

    /// Flushes the file's data and metadata to stable storage.
    pub(crate) fn sync(&self) -> Result<(), IoError> {
        self.file
            .sync_all()
            .map_err(|source| IoError::entry(Op::Fsync, &self.dir_path, &self.name, source))
    }

    /// Closes the descriptor, surfacing the error `Drop` would swallow.
    pub(crate) fn close(self) -> Result<(), IoError> {
        let fd = self.file.into_raw_fd();
        nix::unistd::close(fd).map_err(|errno| {
            IoError::entry(Op::Close, &self.dir_path, &self.name, error::os_error(errno))
        })
    }
}
