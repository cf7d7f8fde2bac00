//! Sibling temp-path generation.
//! Produces unique hidden names co-located with the destination so the final
//! rename stays on one filesystem.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Generate a unique hidden sibling temp name for `dest`.
/// Pattern: .<basename>.atomic_sink.<pid>.<nanos>.<seq>.tmp
///
/// The temp file lives in the nearest existing ancestor of the destination's
/// parent. Normally that is the parent itself; when directory creation is
/// enabled and the parent does not exist yet, walking up keeps the temp file
/// on the same volume as the eventual destination.
pub(crate) fn sibling_temp_path(dest: &Path) -> PathBuf {
    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let base = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let name = format!(".{base}.atomic_sink.{pid}.{nanos}.{seq}.tmp");
    nearest_existing_ancestor(dest).join(name)
}

fn nearest_existing_ancestor(dest: &Path) -> PathBuf {
    let mut dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    while !dir.exists() {
        match dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => dir = p,
            _ => return PathBuf::from("."),
        }
    }
    dir.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn uniqueness_concurrent() {
        let dest = Path::new("out.csv");
        let mut handles = Vec::new();
        for _ in 0..32 {
            let d = dest.to_path_buf();
            handles.push(thread::spawn(move || sibling_temp_path(&d)));
        }
        let mut set = HashSet::new();
        for h in handles {
            let p = h.join().unwrap();
            assert!(set.insert(p));
        }
        assert_eq!(set.len(), 32);
    }

    #[test]
    fn temp_lands_next_to_destination() {
        let td = tempfile::tempdir().unwrap();
        let dest = td.path().join("report.csv");
        let tmp = sibling_temp_path(&dest);
        assert_eq!(tmp.parent().unwrap(), td.path());
        let name = tmp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".report.csv."), "name: {name}");
        assert!(name.ends_with(".tmp"), "name: {name}");
    }

    #[test]
    fn missing_parent_walks_up_to_existing_ancestor() {
        let td = tempfile::tempdir().unwrap();
        let dest = td.path().join("sub/deeper/report.csv");
        let tmp = sibling_temp_path(&dest);
        assert_eq!(tmp.parent().unwrap(), td.path());
    }
}
