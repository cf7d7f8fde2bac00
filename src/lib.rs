//! Core library for `atomic_sink`.
//!
//! An atomic, comparison-aware file write primitive: content goes into a
//! uniquely named temp file next to its destination, and an explicit
//! finalization step either installs it with one atomic rename or discards
//! it. Readers of the destination path only ever see old complete content or
//! new complete content, and rewriting identical bytes leaves the existing
//! file (inode, mtime, permissions) untouched.
//!
//! ```no_run
//! use atomic_sink::{AtomicWriteSession, FinalizePolicy};
//!
//! # fn main() -> atomic_sink::Result<()> {
//! let mut session = AtomicWriteSession::create("/var/lib/app/report.csv")?;
//! session.write(b"no,name\n1,alpha\n")?;
//! session.set_policy(FinalizePolicy::Persist)?;
//! session.finalize()?;
//! # Ok(())
//! # }
//! ```
//!
//! Atomicity is the operating system's rename guarantee, which only holds
//! when temp file and destination share a filesystem; temp files are placed
//! next to the destination for exactly that reason. There is no cross-process
//! locking: concurrent writers in one process are serialized per destination
//! by [`SessionGroup`], concurrent processes race and the last rename wins.

mod errors;
mod group;
mod record;
mod session;

pub use errors::{AtomicSinkError, Result};
pub use group::{GroupFinalizeError, SessionGroup};
pub use record::Record;
pub use session::{AtomicWriteSession, FinalizeOutcome, FinalizePolicy, write_file};

// Re-exported so callers can set timestamps without naming the dependency.
pub use filetime::FileTime;
