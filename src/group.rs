//! Multi-destination coordination.
//!
//! A [`SessionGroup`] keys open [`AtomicWriteSession`]s by destination path,
//! guaranteeing at most one live session per destination within the group.
//! It can broadcast policy to every member, route a record stream across
//! destinations ([`SessionGroup::split_records`]), and finalize everything in
//! insertion order, collecting per-member failures instead of stopping at the
//! first one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use thiserror::Error;
use tracing::warn;

use crate::errors::{AtomicSinkError, Result};
use crate::record::Record;
use crate::session::{AtomicWriteSession, FinalizeOutcome, FinalizePolicy};

/// Aggregate failure from [`SessionGroup::finalize_all`]. Members that did
/// finalize cleanly are reported in `outcomes`; every member is attempted
/// even when earlier ones fail.
#[derive(Debug, Error)]
#[error("failed to finalize {} session(s)", .failures.len())]
pub struct GroupFinalizeError {
    pub outcomes: Vec<(PathBuf, FinalizeOutcome)>,
    pub failures: Vec<(PathBuf, AtomicSinkError)>,
}

/// Destination path -> open session registry, insertion order preserved.
#[derive(Debug, Default)]
pub struct SessionGroup {
    order: Vec<PathBuf>,
    sessions: HashMap<PathBuf, AtomicWriteSession>,
}

impl SessionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Member destination paths, in insertion order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.order.iter().map(PathBuf::as_path)
    }

    pub fn is_open(&self, dest: impl AsRef<Path>) -> bool {
        self.sessions.contains_key(dest.as_ref())
    }

    /// Fetch an open member; `NotOpen` if the path was never opened here.
    pub fn get(&self, dest: impl AsRef<Path>) -> Result<&AtomicWriteSession> {
        let dest = dest.as_ref();
        self.sessions
            .get(dest)
            .ok_or_else(|| AtomicSinkError::NotOpen(dest.to_path_buf()))
    }

    pub fn get_mut(&mut self, dest: impl AsRef<Path>) -> Result<&mut AtomicWriteSession> {
        let dest = dest.as_ref();
        self.sessions
            .get_mut(dest)
            .ok_or_else(|| AtomicSinkError::NotOpen(dest.to_path_buf()))
    }

    /// Open a new session for `dest` and register it.
    pub fn open(&mut self, dest: impl Into<PathBuf>) -> Result<&mut AtomicWriteSession> {
        let dest = dest.into();
        if self.sessions.contains_key(&dest) {
            return Err(AtomicSinkError::AlreadyOpen(dest));
        }
        let session = AtomicWriteSession::create(dest.clone())?;
        self.order.push(dest.clone());
        Ok(self.sessions.entry(dest).or_insert(session))
    }

    /// Register a caller-constructed session under its destination path.
    pub fn add(&mut self, session: AtomicWriteSession) -> Result<()> {
        let dest = session.destination().to_path_buf();
        if self.sessions.contains_key(&dest) {
            return Err(AtomicSinkError::AlreadyOpen(dest));
        }
        self.order.push(dest.clone());
        self.sessions.insert(dest, session);
        Ok(())
    }

    /// Set the finalize policy on every member, in insertion order.
    pub fn set_policy_all(&mut self, policy: FinalizePolicy) -> Result<()> {
        self.for_each(|s| s.set_policy(policy))
    }

    /// Enable directory creation (with `mode`) on every member.
    pub fn set_directory_mode_all(&mut self, mode: u32) -> Result<()> {
        self.for_each(|s| s.set_directory_mode(mode))
    }

    /// Override the post-persist mtime on every member.
    pub fn set_modified_time_all(&mut self, mtime: FileTime) -> Result<()> {
        self.for_each(|s| s.set_modified_time(mtime))
    }

    fn for_each(&mut self, mut op: impl FnMut(&mut AtomicWriteSession) -> Result<()>) -> Result<()> {
        for dest in &self.order {
            if let Some(session) = self.sessions.get_mut(dest) {
                op(session)?;
            }
        }
        Ok(())
    }

    /// Route `records` across member sessions.
    ///
    /// `classify` maps each record to its destination path. The first record
    /// routed to a destination opens its session and writes a header line
    /// derived from that record's field names; every record (first included)
    /// is then written as a data line, in arrival order.
    pub fn split_records<I, F>(&mut self, records: I, mut classify: F) -> Result<()>
    where
        I: IntoIterator<Item = Record>,
        F: FnMut(&Record) -> PathBuf,
    {
        for record in records {
            let dest = classify(&record);
            let session = if self.is_open(&dest) {
                self.get_mut(&dest)?
            } else {
                let opened = self.open(dest)?;
                opened.write(record.header_line().as_bytes())?;
                opened
            };
            session.write(record.data_line().as_bytes())?;
        }
        Ok(())
    }

    /// Finalize every member, in insertion order.
    ///
    /// One member failing does not stop the others; all failures are
    /// collected into a single [`GroupFinalizeError`].
    pub fn finalize_all(mut self) -> Result<Vec<(PathBuf, FinalizeOutcome)>, GroupFinalizeError> {
        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        for dest in std::mem::take(&mut self.order) {
            let Some(mut session) = self.sessions.remove(&dest) else {
                continue;
            };
            match session.finalize() {
                Ok(outcome) => outcomes.push((dest, outcome)),
                Err(e) => {
                    warn!(dest = %dest.display(), error = %e, "finalize failed; continuing with remaining sessions");
                    failures.push((dest, e));
                }
            }
        }
        if failures.is_empty() {
            Ok(outcomes)
        } else {
            Err(GroupFinalizeError { outcomes, failures })
        }
    }
}
