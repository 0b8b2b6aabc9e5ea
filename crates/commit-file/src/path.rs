//! POSIX `dirname`/`basename` splitting on raw path bytes.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt as _;
use std::path::{Path, PathBuf};

/// Splits a path into its parent directory and final component with
/// `dirname(3)`/`basename(3)` semantics: trailing slashes are ignored, a
/// path without a slash lives in `.`, and the root is its own parent.
///
/// Operates on the raw bytes, so non-UTF-8 names pass through unchanged.
/// The input is never modified.
pub(crate) fn split(path: &Path) -> (PathBuf, OsString) {
    let bytes = path.as_os_str().as_bytes();
    if bytes.is_empty() {
        return (PathBuf::from("."), OsString::from("."));
    }

    // Ignore trailing slashes after the final component.
    let mut end = bytes.len();
    while end > 1 && bytes[end - 1] == b'/' {
        end -= 1;
    }
    if end == 1 && bytes[0] == b'/' {
        // Nothing but slashes: the root is both directory and name.
        return (PathBuf::from("/"), OsString::from("/"));
    }

    match bytes[..end].iter().rposition(|&b| b == b'/') {
        None => (PathBuf::from("."), component(&bytes[..end])),
        Some(sep) => {
            let name = component(&bytes[sep + 1..end]);
            // The separator run before the name is not part of the
            // directory, except when the directory is the root itself.
            let mut dir_end = sep;
            while dir_end > 1 && bytes[dir_end - 1] == b'/' {
                dir_end -= 1;
            }
            let dir = if dir_end == 0 {
                PathBuf::from("/")
            } else {
                PathBuf::from(component(&bytes[..dir_end]))
            };
            (dir, name)
        }
    }
}

fn component(bytes: &[u8]) -> OsString {
    OsStr::from_bytes(bytes).to_os_string()
}
