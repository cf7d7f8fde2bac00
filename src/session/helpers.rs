//! I/O error enrichment.
//!
//! Small adapters that turn a bare `io::Error` into an `AtomicSinkError::Io`
//! whose message names the failed operation and path and, where the raw OS
//! code is recognizable, appends an actionable hint.
//!
//! Usage:
//!   fs::rename(a, b).map_err(io_error_with_help("atomic rename", b))?;

use std::io;
use std::path::Path;

use crate::errors::AtomicSinkError;

/// Format a human-friendly message with op/path plus platform-aware hints.
fn build_message(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{} '{}': {}", op, path.display(), e);

    if let Some(code) = e.raw_os_error() {
        #[cfg(unix)]
        {
            match code {
                libc::EACCES | libc::EPERM => {
                    msg.push_str(" — permission denied; check ownership and write permissions.");
                }
                libc::EXDEV => {
                    msg.push_str(" — cross-filesystem; atomic rename not possible.");
                }
                libc::ENOENT => {
                    msg.push_str(" — path not found; verify the parent directory exists.");
                }
                libc::EEXIST => {
                    msg.push_str(" — already exists; pick a unique name or remove the target.");
                }
                libc::ENOSPC => {
                    msg.push_str(" — insufficient space on device.");
                }
                libc::EROFS => {
                    msg.push_str(" — read-only filesystem; cannot write here.");
                }
                libc::ENAMETOOLONG => {
                    msg.push_str(" — filename or path too long; shorten path segments.");
                }
                _ => {}
            }
        }
        #[cfg(windows)]
        {
            match code {
                5 => msg.push_str(" — access denied; check permissions."), // ERROR_ACCESS_DENIED
                17 => msg.push_str(" — not same device; cross-filesystem move."), // ERROR_NOT_SAME_DEVICE
                32 => msg.push_str(" — sharing violation; file is in use."), // ERROR_SHARING_VIOLATION
                2 | 3 => msg.push_str(" — path not found; verify it exists."), // FILE/PATH NOT FOUND
                112 => msg.push_str(" — insufficient disk space."), // ERROR_DISK_FULL
                _ => {}
            }
        }
        msg.push_str(&format!(" [os code: {}]", code));
    } else {
        match e.kind() {
            io::ErrorKind::PermissionDenied => {
                msg.push_str(" — permission denied; check ownership and write permissions.");
            }
            io::ErrorKind::NotFound => {
                msg.push_str(" — path not found; verify the parent directory exists.");
            }
            io::ErrorKind::AlreadyExists => {
                msg.push_str(" — already exists; remove or choose a unique name.");
            }
            _ => {}
        }
    }

    msg
}

/// Returns a closure suitable for `.map_err(...)` that converts an
/// `io::Error` into an `AtomicSinkError::Io` with an enriched message.
pub(crate) fn io_error_with_help<'a>(
    op: &'a str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> AtomicSinkError + 'a {
    move |e: io::Error| AtomicSinkError::Io {
        message: build_message(op, path, &e),
        source: e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_op_and_path() {
        let e = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = io_error_with_help("atomic rename", Path::new("/tmp/x"))(e);
        let msg = err.to_string();
        assert!(msg.contains("atomic rename"), "msg: {msg}");
        assert!(msg.contains("/tmp/x"), "msg: {msg}");
    }
}
