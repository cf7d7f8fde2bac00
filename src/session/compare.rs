//! Streaming content comparison between the session's temp file and the
//! current destination. Never loads either file fully into memory and never
//! mutates the destination.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const CHUNK: usize = 8 * 1024;

/// True iff `dest` exists, has the same length as the bytes written into
/// `temp`, and is byte-identical to them.
///
/// The temp file was opened truncate-and-append and never rewound, so its
/// current write offset is the logical length of the new content. The cursor
/// is restored to that offset before returning, whatever the outcome.
pub(crate) fn matches_destination(temp: &mut File, dest: &Path) -> io::Result<bool> {
    let dest_meta = match fs::metadata(dest) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let written = temp.stream_position()?;
    if dest_meta.len() != written {
        return Ok(false);
    }

    temp.seek(SeekFrom::Start(0))?;
    let mut existing = File::open(dest)?;
    let mut theirs = [0u8; CHUNK];
    let mut ours = [0u8; CHUNK];
    let identical = loop {
        let n = existing.read(&mut theirs)?;
        if n == 0 {
            break true;
        }
        temp.read_exact(&mut ours[..n])?;
        if theirs[..n] != ours[..n] {
            break false;
        }
    };

    // Leave the write cursor where the caller had it.
    temp.seek(SeekFrom::Start(written))?;
    Ok(identical)
}
