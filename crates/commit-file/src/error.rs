//! Structured errors for failed filesystem operations.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// The operation that failed, named the way it was issued to the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Open,
    Read,
    Write,
    Fsync,
    Close,
    Unlink,
    Rename,
}

impl Op {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Op::Open => "open",
            Op::Read => "read",
            Op::Write => "write",
            Op::Fsync => "fsync",
            Op::Close => "close",
            Op::Unlink => "unlink",
            Op::Rename => "rename",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed syscall, recorded with the operation and its path operands.
///
/// The rendered form is uniform across the crate:
/// `op("<operand>"): <os error>`, where the operand is a whole path, a
/// `directory/name` pair, or (for renames) both names within one directory.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// An operation on a single path: opening or reading the target
    /// itself, or opening, syncing, and closing a directory.
    Path {
        op: Op,
        path: PathBuf,
        source: io::Error,
    },
    /// An operation on one named entry inside a directory.
    Entry {
        op: Op,
        dir: PathBuf,
        file: PathBuf,
        source: io::Error,
    },
    /// A rename of one entry onto another within a single directory.
    Rename {
        dir: PathBuf,
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Path { op, path, source } => {
                write!(f, "{op}(\"{}\"): {source}", path.display())
            }
            IoError::Entry {
                op,
                dir,
                file,
                source,
            } => {
                write!(
                    f,
                    "{op}(\"{}/{}\"): {source}",
                    dir.display(),
                    file.display()
                )
            }
            IoError::Rename {
                dir,
                from,
                to,
                source,
            } => {
                write!(
                    f,
                    "rename(\"{}/{}\", \"{}/{}\"): {source}",
                    dir.display(),
                    from.display(),
                    dir.display(),
                    to.display()
                )
            }
        }
    }
}

impl IoError {
    pub(crate) fn path(op: Op, path: impl Into<PathBuf>, source: io::Error) -> IoError {
        IoError::Path {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn entry(
        op: Op,
        dir: impl Into<PathBuf>,
        file: impl Into<PathBuf>,
        source: io::Error,
    ) -> IoError {
        IoError::Entry {
            op,
            dir: dir.into(),
            file: file.into(),
            source,
        }
    }

    pub(crate) fn rename(
        dir: impl Into<PathBuf>,
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        source: io::Error,
    ) -> IoError {
        IoError::Rename {
            dir: dir.into(),
            from: from.into(),
            to: to.into(),
            source,
        }
    }

    /// The operation that failed.
    #[must_use]
    pub fn op(&self) -> Op {
        match self {
            IoError::Path { op, .. } | IoError::Entry { op, .. } => *op,
            IoError::Rename { .. } => Op::Rename,
        }
    }

    /// The directory the operation ran in, or the whole path for
    /// single-operand operations.
    #[must_use]
    pub fn dir(&self) -> &Path {
        match self {
            IoError::Path { path, .. } => path,
            IoError::Entry { dir, .. } | IoError::Rename { dir, .. } => dir,
        }
    }

    /// The OS error code, when the failure came from a syscall.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_source().raw_os_error()
    }

    /// Whether the failure was `ENOSPC` or `EDQUOT`. Retrying after
    /// freeing space may succeed; this crate never retries on its own.
    #[must_use]
    pub fn is_storage_full(&self) -> bool {
        matches!(
            self.io_source().kind(),
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded
        )
    }

    fn io_source(&self) -> &io::Error {
        match self {
            IoError::Path { source, .. }
            | IoError::Entry { source, .. }
            | IoError::Rename { source, .. } => source,
        }
    }
}

/// Converts a raw errno from a direct syscall into the `io::Error` the
/// rest of the crate carries.
pub(crate) fn os_error(errno: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}
