//! Durable whole-file replacement for POSIX filesystems.
//!
//! [`CommittedFile`] installs a payload at a target path so that a crash at
//! any point leaves either the previous contents or the new contents on
//! disk, never a torn or partial file. A commit walks a fixed sequence:
//! write the payload to a `.work` sibling, fsync it, close it, rename it
//! over the target, then fsync the parent directory. The directory fsync
//! matters: fsync of the file alone does not guarantee that the renamed
//! directory entry survives a crash.
//!
//! Construction removes any `.work` sibling left behind by an interrupted
//! commit, so a crashed writer never leaks staging files past the next
//! open. Aside from the target name and its transient `.work` sibling, the
//! crate creates nothing in the parent directory.

mod dir;
mod error;
mod mem;
mod path;
mod write;

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use crate::dir::DirHandle;
use crate::write::WriteHandle;

pub use crate::error::{IoError, Op};
pub use crate::mem::MemStore;

/// Suffix of the staging sibling written next to the target during a
/// commit. An entry of this exact name is deleted on construction, even
/// if something else put it there.
pub const WORK_SUFFIX: &str = ".work";

/// Read, replace, and identify a file's contents.
///
/// The seam between durable storage and the code using it:
/// [`CommittedFile`] is the filesystem-backed form, [`MemStore`] keeps
/// contents in memory for tests of layers built on top.
pub trait FileStore {
    /// The target path the store reports for itself.
    fn path(&self) -> &Path;

    /// Returns the full current contents.
    fn read(&self) -> Result<Vec<u8>, IoError>;

    /// Replaces the contents with `payload`.
    fn write(&self, payload: &[u8]) -> Result<(), IoError>;
}

/// A target path whose contents are replaced atomically and durably.
///
/// Holds only the path; every operation opens what it needs and releases
/// it before returning. Concurrent commits to the same path race on the
/// `.work` name without ordering guarantees, but readers of the target
/// only ever see some complete payload.
#[derive(Debug)]
pub struct CommittedFile {
    path: PathBuf,
}

impl CommittedFile {
    /// Records `path` and removes a stale `.work` sibling if one exists.
    ///
    /// Fails if the parent directory cannot be opened or a stale sibling
    /// cannot be removed; a missing sibling is not an error.
    pub fn new(path: impl Into<PathBuf>) -> Result<CommittedFile, IoError> {
        let file = CommittedFile { path: path.into() };
        file.remove_stale_work()?;
        Ok(file)
    }

    /// Replaces the target's contents with `payload`.
    ///
    /// On success both the payload and the directory entry binding it to
    /// the target name are on stable storage. On failure the sequence
    /// stops at the failed step: the target is untouched, and at worst a
    /// partially written `.work` sibling remains for the next
    /// construction to delete. No rollback is attempted after the
    /// rename; a directory-sync failure at that point still propagates.
    pub fn write(&self, payload: &[u8]) -> Result<(), IoError> {
        let (dir_path, name) = path::split(&self.path);
        let work = work_name(&name);
        let name = Path::new(&name);
        let work = Path::new(&work);

        // The directory stays open across the whole commit, so the
        // rename and sync land in the same directory inode even if the
        // parent path is renamed underneath us.
        let dir = DirHandle::open(&dir_path)?;
        let mut work_file = WriteHandle::create(&dir, work)?;
        work_file.write_all(payload)?;
        work_file.sync()?;
        work_file.close()?;
        // The payload is durable under the work name; the rename
        // publishes it atomically, and the directory sync makes the new
        // entry hold across a crash.
        dir.rename(work, name)?;
        dir.sync()?;
        dir.close()
    }

    /// Returns the target's full contents. Empty files read back as an
    /// empty buffer. The descriptor is released before this returns,
    /// errors included.
    pub fn read(&self) -> Result<Vec<u8>, IoError> {
        let mut file =
            File::open(&self.path).map_err(|source| IoError::path(Op::Open, &self.path, source))?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|source| IoError::path(Op::Read, &self.path, source))?;
        Ok(contents)
    }

    /// Returns the recorded target path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn remove_stale_work(&self) -> Result<(), IoError> {
        let (dir_path, name) = path::split(&self.path);
        let dir = DirHandle::open(&dir_path)?;
        dir.unlink(Path::new(&work_name(&name)))?;
        dir.close()
    }
}

impl FileStore for CommittedFile {
    fn path(&self) -> &Path {
        CommittedFile::path(self)
    }

    fn read(&self) -> Result<Vec<u8>, IoError> {
        CommittedFile::read(self)
    }

    fn write(&self, payload: &[u8]) -> Result<(), IoError> {
        CommittedFile::write(self, payload)
    }
}

fn work_name(name: &OsStr) -> OsString {
    let mut work = name.to_os_string();
    work.push(WORK_SUFFIX);
    work
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::{MetadataExt as _, PermissionsExt as _};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use rand::RngCore as _;

    use super::*;

    fn work_sibling(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .expect("target has a file name")
            .to_os_string();
        name.push(WORK_SUFFIX);
        target.with_file_name(name)
    }

    #[test]
    fn fresh_write_installs_contents() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("f");

        let cf = CommittedFile::new(&target).unwrap();
        cf.write(b"hello").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"hello");
        assert!(!work_sibling(&target).exists());
        let entries: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![OsString::from("f")]);
    }

    #[test]
    fn fresh_write_creates_mode_0644() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("f");

        // The creation mode is filtered by the process umask, so pin it
        // for the duration and put the old mask back before asserting.
        let old_mask = nix::sys::stat::umask(nix::sys::stat::Mode::empty());
        let cf = CommittedFile::new(&target).unwrap();
        let result = cf.write(b"hello");
        nix::sys::stat::umask(old_mask);

        result.unwrap();
        let mode = fs::metadata(&target).unwrap().mode();
        assert_eq!(mode & 0o7777, 0o644);
    }

    #[test]
    fn overwrite_replaces_contents_and_inode() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("f");
        fs::write(&target, b"old").unwrap();
        let old_ino = fs::metadata(&target).unwrap().ino();

        let cf = CommittedFile::new(&target).unwrap();
        cf.write(b"newer").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"newer");
        let new_ino = fs::metadata(&target).unwrap().ino();
        assert_ne!(old_ino, new_ino, "rename should install a fresh inode");
    }

    #[test]
    fn construction_removes_stale_work_sibling() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("f");
        fs::write(&target, b"keep").unwrap();
        fs::write(work_sibling(&target), b"garbage").unwrap();

        CommittedFile::new(&target).unwrap();

        assert!(!work_sibling(&target).exists());
        assert_eq!(fs::read(&target).unwrap(), b"keep");
    }

    #[test]
    fn construction_succeeds_without_work_sibling() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("f");
        fs::write(&target, b"present").unwrap();

        CommittedFile::new(&target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"present");
    }

    #[test]
    fn construction_succeeds_before_target_exists() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("f");

        let cf = CommittedFile::new(&target).unwrap();
        assert!(!target.exists());
        cf.write(b"first contents").unwrap();
        assert_eq!(cf.read().unwrap(), b"first contents");
    }

    #[test]
    fn repeated_writes_leave_only_the_target() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("f");
        let cf = CommittedFile::new(&target).unwrap();

        for i in 0..3 {
            cf.write(format!("round {i}").as_bytes()).unwrap();
            assert!(!work_sibling(&target).exists());
            assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
        }
        assert_eq!(fs::read(&target).unwrap(), b"round 2");
    }

    #[test]
    fn round_trip_preserves_every_byte_value() {
        let temp = tempfile::tempdir().unwrap();
        let cf = CommittedFile::new(temp.path().join("f")).unwrap();

        let payload: Vec<u8> = (0..=255u8).cycle().take(8192 + 37).collect();
        cf.write(&payload).unwrap();
        assert_eq!(cf.read().unwrap(), payload);
    }

    #[test]
    fn round_trip_large_random_payload() {
        let temp = tempfile::tempdir().unwrap();
        let cf = CommittedFile::new(temp.path().join("f")).unwrap();

        let mut payload = vec![0u8; 16 * 1024 * 1024];
        rand::rng().fill_bytes(&mut payload);
        cf.write(&payload).unwrap();
        assert_eq!(cf.read().unwrap(), payload);
    }

    #[test]
    fn empty_payload_truncates_the_target() {
        let temp = tempfile::tempdir().unwrap();
        let cf = CommittedFile::new(temp.path().join("f")).unwrap();

        cf.write(b"not empty").unwrap();
        cf.write(b"").unwrap();
        assert_eq!(cf.read().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn read_missing_target_reports_enoent() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("f");
        let cf = CommittedFile::new(&target).unwrap();

        let err = cf.read().unwrap_err();
        assert_eq!(err.op(), Op::Open);
        assert_eq!(err.raw_os_error(), Some(nix::errno::Errno::ENOENT as i32));
        let msg = err.to_string();
        assert!(
            msg.starts_with(&format!("open(\"{}\"): ", target.display())),
            "got: {msg}"
        );
    }

    #[test]
    fn construction_fails_when_directory_is_missing() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("no-such-dir").join("f");

        let err = CommittedFile::new(&target).unwrap_err();
        assert_eq!(err.op(), Op::Open);
        assert_eq!(err.dir(), temp.path().join("no-such-dir"));
    }

    #[test]
    fn stale_work_directory_fails_construction() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("f");
        fs::create_dir(work_sibling(&target)).unwrap();

        let err = CommittedFile::new(&target).unwrap_err();
        assert_eq!(err.op(), Op::Unlink);
    }

    #[test]
    fn failed_write_leaves_target_and_directory_untouched() {
        if nix::unistd::Uid::effective().is_root() {
            // Root ignores directory permissions; nothing to test.
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("f");
        let cf = CommittedFile::new(&target).unwrap();
        cf.write(b"keep").unwrap();

        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o500)).unwrap();
        let err = cf.write(b"replacement").unwrap_err();
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o700)).unwrap();

        assert_eq!(err.op(), Op::Open);
        assert_eq!(fs::read(&target).unwrap(), b"keep");
        assert!(!work_sibling(&target).exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn descriptors_are_released_after_each_write() {
        fn open_fds() -> usize {
            fs::read_dir("/proc/self/fd").unwrap().count()
        }

        let temp = tempfile::tempdir().unwrap();
        let scratch = temp.path().join("scratch");
        fs::create_dir(&scratch).unwrap();
        let cf = CommittedFile::new(scratch.join("f")).unwrap();

        // Parallel tests open descriptors of their own, so allow a small
        // band of noise. A leak costs two descriptors per write and
        // blows far past it.
        let baseline = open_fds();
        for i in 0..50 {
            cf.write(format!("{i}").as_bytes()).unwrap();
        }
        let after = open_fds();
        assert!(
            after <= baseline + 8,
            "descriptor count grew from {baseline} to {after}"
        );

        // Failure paths must release descriptors too.
        fs::remove_dir_all(&scratch).unwrap();
        for _ in 0..50 {
            cf.write(b"doomed").unwrap_err();
        }
        let after_failures = open_fds();
        assert!(
            after_failures <= baseline + 8,
            "descriptor count grew from {baseline} to {after_failures} on failures"
        );
    }

    #[test]
    fn concurrent_reader_never_observes_torn_contents() {
        let temp = tempfile::tempdir().unwrap();
        let cf = CommittedFile::new(temp.path().join("f")).unwrap();
        cf.write(b"pre").unwrap();

        let done = AtomicBool::new(false);
        thread::scope(|s| {
            s.spawn(|| {
                for i in 0..1000 {
                    cf.write(i.to_string().as_bytes()).unwrap();
                }
                done.store(true, Ordering::Release);
            });
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let seen = String::from_utf8(cf.read().unwrap()).unwrap();
                    let allowed = seen == "pre" || seen.parse::<u32>().is_ok_and(|n| n < 1000);
                    assert!(allowed, "torn or foreign contents: {seen:?}");
                }
            });
        });
        assert_eq!(cf.read().unwrap(), b"999");
    }

    #[test]
    fn stores_are_interchangeable_behind_the_trait() {
        fn exercise(store: &dyn FileStore) {
            store.write(b"via trait").unwrap();
            assert_eq!(store.read().unwrap(), b"via trait");
            assert!(store.path().ends_with("f"));
        }

        let temp = tempfile::tempdir().unwrap();
        let durable = CommittedFile::new(temp.path().join("f")).unwrap();
        exercise(&durable);

        let fake = MemStore::new("/virtual/f");
        exercise(&fake);
    }
}
