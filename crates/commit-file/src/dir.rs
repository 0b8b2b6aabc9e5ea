//! Owned directory descriptors scoped to the `*at` syscall family.

use std::io;
use std::os::fd::{AsFd as _, BorrowedFd, IntoRawFd as _};
use std::path::{Path, PathBuf};

use cap_std::fs::Dir;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;

use crate::error::{self, IoError, Op};

/// An open descriptor on a directory.
///
/// Entry operations go through the held descriptor, so they keep
/// addressing the same directory inode even if the directory's own path
/// is renamed while the handle is open. The handle is the descriptor's
/// only owner; dropping it releases the descriptor and ignores any close
/// error, while [`DirHandle::close`] surfaces it.
pub(crate) struct DirHandle {
    path: PathBuf,
    dir: Dir,
}

impl DirHandle {
    /// Opens `path` read-only with close-on-exec.
    pub(crate) fn open(path: &Path) -> Result<DirHandle, IoError> {
        let dir = Dir::open_ambient_dir(path, cap_std::ambient_authority())
            .map_err(|source| IoError::path(Op::Open, path, source))?;
        Ok(DirHandle {
            path: path.to_path_buf(),
            dir,
        })
    }

    /// Removes `name` from the directory. A missing entry counts as
    /// success, so removal is idempotent.
    pub(crate) fn unlink(&self, name: &Path) -> Result<(), IoError> {
        match self.dir.remove_file(name) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                // Already gone, nothing to do.
                Ok(())
            }
            Err(source) => Err(IoError::entry(Op::Unlink, &self.path, name, source)),
        }
    }

    /// Renames `from` onto `to`, both relative to the held descriptor.
    /// Within one filesystem POSIX makes the replacement atomic.
    pub(crate) fn rename(&self, from: &Path, to: &Path) -> Result<(), IoError> {
        self.dir
            .rename(from, &self.dir, to)
            .map_err(|source| IoError::rename(&self.path, from, to, source))
    }

    /// Flushes the directory's metadata to stable storage. A rename is
    /// only durable once the directory entry itself has been synced.
    pub(crate) fn sync(&self) -> Result<(), IoError> {
        // The held descriptor is O_PATH on Linux, which fsync rejects.
        // "." resolves through it, so the reopen reaches the same inode
        // even if the directory's path has moved.
        let fd = fcntl::openat(
            self.fd(),
            Path::new("."),
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(|errno| IoError::path(Op::Fsync, &self.path, error::os_error(errno)))?;
        nix::unistd::fsync(&fd)
            .map_err(|errno| IoError::path(Op::Fsync, &self.path, error::os_error(errno)))
    }

    /// Closes the descriptor, surfacing the error `Drop` would swallow.
    /// Consuming `self` makes a second close unrepresentable.
    pub(crate) fn close(self) -> Result<(), IoError> {
        let fd = self.dir.into_raw_fd();
        nix::unistd::close(fd)
            .map_err(|errno| IoError::path(Op::Close, &self.path, error::os_error(errno)))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn fd(&self) -> BorrowedFd<'_> {
        self.dir.as_fd()
    }
}
