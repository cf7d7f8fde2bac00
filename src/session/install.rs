//! Atomic install of the temp file at its destination.
//! - Performs a rename with context-rich errors.
//! - On Windows, removes an existing destination first (rename doesn't overwrite).
//! - On Unix, best-effort fsync of the destination directory after rename.

use std::fs;
use std::path::Path;

use super::helpers::io_error_with_help;
use crate::errors::Result;

pub(crate) fn rename_into_place(src: &Path, dst: &Path) -> Result<()> {
    // Windows: ensure destination path is free (rename doesn't overwrite there).
    #[cfg(windows)]
    {
        if dst.exists() {
            if let Err(e) = fs::remove_file(dst) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(io_error_with_help(
                        "remove existing destination before rename",
                        dst,
                    )(e));
                }
            }
        }
    }

    let op = format!("atomic rename '{}' ->", src.display());
    fs::rename(src, dst).map_err(io_error_with_help(&op, dst))?;

    // Unix: fsync the destination directory so the rename survives a crash.
    // Ignore errors to avoid turning a successful rename into a failure.
    #[cfg(unix)]
    if let Some(parent) = dst.parent() {
        let _ = fsync_dir(parent);
    }

    Ok(())
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) -> std::io::Result<()> {
    let f = fs::File::open(dir)?;
    f.sync_all()
}
