//! An in-memory stand-in for the durable store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use nix::errno::Errno;

use crate::FileStore;
use crate::error::{self, IoError, Op};

/// [`FileStore`] backed by process memory instead of a filesystem.
///
/// Reads and writes are atomic with respect to each other, but nothing
/// is durable; the contents vanish with the value. Intended for tests of
/// code written against [`FileStore`].
#[derive(Debug)]
pub struct MemStore {
    path: PathBuf,
    contents: Mutex<Option<Vec<u8>>>,
}

impl MemStore {
    /// Creates an empty store reporting `path`. Until the first write,
    /// reads fail the way a missing file does.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> MemStore {
        MemStore {
            path: path.into(),
            contents: Mutex::new(None),
        }
    }

    /// Creates a store already holding `contents`.
    #[must_use]
    pub fn with_contents(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> MemStore {
        MemStore {
            path: path.into(),
            contents: Mutex::new(Some(contents.into())),
        }
    }
}

impl FileStore for MemStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<u8>, IoError> {
        self.contents
            .lock()
            .expect("contents lock poisoned")
            .clone()
            .ok_or_else(|| IoError::path(Op::Open, &self.path, error::os_error(Errno::ENOENT)))
    }

    fn write(&self, payload: &[u8]) -> Result<(), IoError> {
        *self.contents.lock().expect("contents lock poisoned") = Some(payload.to_vec());
        Ok(())
    }
}
