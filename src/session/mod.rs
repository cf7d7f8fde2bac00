//! Atomic write sessions.
//!
//! An [`AtomicWriteSession`] buffers content into a uniquely named temp file
//! next to its destination, then makes a one-time persist-or-discard decision
//! at [`AtomicWriteSession::finalize`]. Observers of the destination path only
//! ever see the old complete content or the new complete content.

mod compare;
mod helpers;
mod install;
mod temp;

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tracing::{debug, info, warn};

use crate::errors::{AtomicSinkError, Result};
use helpers::io_error_with_help;

/// What to do with the temp file when the session is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizePolicy {
    /// Delete the temp file; never touch the destination.
    Discard,
    /// Install the temp file unless it is byte-identical to the current
    /// destination, in which case discard it and leave the destination's
    /// inode and mtime untouched.
    Persist,
    /// Always install the temp file, bypassing the comparison.
    PersistUnchanged,
}

/// The action a finalized session actually took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Persisted,
    Discarded,
    /// No policy was ever set; the temp file was intentionally left on disk.
    Leaked,
}

type Callback = Box<dyn FnOnce(&AtomicWriteSession)>;

/// A write session targeting one destination path.
///
/// Content is appended to a hidden sibling temp file (same directory as the
/// destination, so the final rename stays on one filesystem). Nothing at the
/// destination changes until `finalize`.
pub struct AtomicWriteSession {
    dest: PathBuf,
    temp_path: PathBuf,
    // Some while open; taken (and the handle closed) during finalize so the
    // rename works on Windows too.
    file: Option<BufWriter<File>>,
    policy: Option<FinalizePolicy>,
    mtime: Option<FileTime>,
    dir_mode: Option<u32>,
    on_persist: Option<Callback>,
    on_discard: Option<Callback>,
    outcome: Option<FinalizeOutcome>,
}

impl AtomicWriteSession {
    /// Open a new session for `dest`. Creates the temp file immediately.
    pub fn create(dest: impl Into<PathBuf>) -> Result<Self> {
        let dest = dest.into();
        let temp_path = temp::sibling_temp_path(&dest);
        let file = File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(io_error_with_help("create temp file", &temp_path))?;
        debug!(dest = %dest.display(), temp = %temp_path.display(), "opened write session");
        Ok(Self {
            dest,
            temp_path,
            file: Some(BufWriter::new(file)),
            policy: None,
            mtime: None,
            dir_mode: None,
            on_persist: None,
            on_discard: None,
            outcome: None,
        })
    }

    /// The destination path this session resolves to at finalization.
    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// The temp file backing this session. Gone (under either name) once the
    /// session persists or discards.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// The action taken, once finalized.
    pub fn outcome(&self) -> Option<FinalizeOutcome> {
        self.outcome
    }

    /// Append bytes to the temp file.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(writer) = self.file.as_mut() else {
            return Err(AtomicSinkError::AlreadyFinalized(self.dest.clone()));
        };
        writer
            .write_all(bytes)
            .map_err(io_error_with_help("write temp file", &self.temp_path))
    }

    /// Bytes written so far (buffered bytes flushed first).
    pub fn bytes_written(&mut self) -> Result<u64> {
        let Some(writer) = self.file.as_mut() else {
            return Err(AtomicSinkError::AlreadyFinalized(self.dest.clone()));
        };
        writer
            .flush()
            .map_err(io_error_with_help("flush temp file", &self.temp_path))?;
        writer
            .get_mut()
            .stream_position()
            .map_err(io_error_with_help("stat temp file", &self.temp_path))
    }

    /// Choose what finalization does. May be changed any time before
    /// `finalize`; leaving it unset makes finalization leak the temp file
    /// (reported as a warning) rather than guess.
    pub fn set_policy(&mut self, policy: FinalizePolicy) -> Result<()> {
        self.check_open()?;
        self.policy = Some(policy);
        Ok(())
    }

    /// Override the destination's modification time after persist. Applied to
    /// the temp file right before the rename, so timestamp and file identity
    /// move into place together.
    pub fn set_modified_time(&mut self, mtime: FileTime) -> Result<()> {
        self.check_open()?;
        self.mtime = Some(mtime);
        Ok(())
    }

    /// Create the destination's parent directory (recursively, with this
    /// permission mode) if it is absent at persist time. Without this, a
    /// missing parent makes the rename fail.
    pub fn set_directory_mode(&mut self, mode: u32) -> Result<()> {
        self.check_open()?;
        self.dir_mode = Some(mode);
        Ok(())
    }

    /// Register a callback invoked exactly once if finalization persists.
    pub fn on_persist(&mut self, callback: impl FnOnce(&AtomicWriteSession) + 'static) -> Result<()> {
        self.check_open()?;
        self.on_persist = Some(Box::new(callback));
        Ok(())
    }

    /// Register a callback invoked exactly once if finalization discards.
    pub fn on_discard(&mut self, callback: impl FnOnce(&AtomicWriteSession) + 'static) -> Result<()> {
        self.check_open()?;
        self.on_discard = Some(Box::new(callback));
        Ok(())
    }

    /// Run the persist-or-discard decision and the filesystem mutation.
    ///
    /// Exactly-once: a second call is a programming error and returns
    /// [`AtomicSinkError::AlreadyFinalized`]. With no policy set, the temp
    /// file is left on disk untouched and a warning is emitted.
    pub fn finalize(&mut self) -> Result<FinalizeOutcome> {
        let Some(mut writer) = self.file.take() else {
            return Err(AtomicSinkError::AlreadyFinalized(self.dest.clone()));
        };
        writer
            .flush()
            .map_err(io_error_with_help("flush temp file", &self.temp_path))?;
        let mut file = writer
            .into_inner()
            .map_err(|e| io_error_with_help("flush temp file", &self.temp_path)(e.into_error()))?;

        let persist = match self.policy {
            Some(FinalizePolicy::Discard) => Some(false),
            Some(FinalizePolicy::PersistUnchanged) => Some(true),
            Some(FinalizePolicy::Persist) => {
                let identical = compare::matches_destination(&mut file, &self.dest)
                    .map_err(io_error_with_help("compare against destination", &self.dest))?;
                if identical {
                    debug!(dest = %self.dest.display(), "content unchanged; discarding temp file");
                }
                Some(!identical)
            }
            None => None,
        };
        // Close the handle before any rename/unlink (required on Windows).
        drop(file);

        match persist {
            Some(true) => {
                self.do_persist()?;
                self.outcome = Some(FinalizeOutcome::Persisted);
                if let Some(cb) = self.on_persist.take() {
                    cb(self);
                }
                Ok(FinalizeOutcome::Persisted)
            }
            Some(false) => {
                fs::remove_file(&self.temp_path)
                    .map_err(io_error_with_help("remove temp file", &self.temp_path))?;
                self.outcome = Some(FinalizeOutcome::Discarded);
                if let Some(cb) = self.on_discard.take() {
                    cb(self);
                }
                Ok(FinalizeOutcome::Discarded)
            }
            None => {
                warn!(
                    dest = %self.dest.display(),
                    "no finalize policy set; temporary file left on device: {}",
                    self.temp_path.display()
                );
                self.outcome = Some(FinalizeOutcome::Leaked);
                Ok(FinalizeOutcome::Leaked)
            }
        }
    }

    fn do_persist(&self) -> Result<()> {
        if let Some(mtime) = self.mtime {
            filetime::set_file_mtime(&self.temp_path, mtime)
                .map_err(io_error_with_help("set modified time on temp file", &self.temp_path))?;
        }
        if let Some(mode) = self.dir_mode {
            if let Some(parent) = self.dest.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    create_dirs_with_mode(parent, mode)
                        .map_err(io_error_with_help("create destination directory", parent))?;
                }
            }
        }
        install::rename_into_place(&self.temp_path, &self.dest)?;
        info!(dest = %self.dest.display(), "persisted atomically");
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.file.is_some() {
            Ok(())
        } else {
            Err(AtomicSinkError::AlreadyFinalized(self.dest.clone()))
        }
    }

}

fn create_dirs_with_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path)
}

impl io::Write for AtomicWriteSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(w) => w.write(buf),
            None => Err(io::Error::other(format!(
                "session for {} already finalized",
                self.dest.display()
            ))),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for AtomicWriteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicWriteSession")
            .field("dest", &self.dest)
            .field("temp_path", &self.temp_path)
            .field("policy", &self.policy)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl Drop for AtomicWriteSession {
    fn drop(&mut self) {
        // Finalization is explicit; a forgotten call leaves the temp file on
        // disk exactly like the unset-policy anomaly, and we only report it.
        if self.file.is_some() {
            warn!(
                dest = %self.dest.display(),
                "session dropped without finalize; temporary file left on device: {}",
                self.temp_path.display()
            );
        }
    }
}

/// One-shot atomic file write: open a session, write `bytes`, persist.
///
/// Uses the [`FinalizePolicy::Persist`] policy, so rewriting a file with
/// identical content leaves its inode and mtime untouched.
pub fn write_file(dest: impl Into<PathBuf>, bytes: impl AsRef<[u8]>) -> Result<()> {
    let mut session = AtomicWriteSession::create(dest)?;
    session.write(bytes.as_ref())?;
    session.set_policy(FinalizePolicy::Persist)?;
    session.finalize()?;
    Ok(())
}
