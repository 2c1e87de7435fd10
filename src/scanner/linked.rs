//! Detection of items already linked into a destination.
//!
//! Destinations hold symbolic links pointing back at source files. Walking
//! them once yields the canonical targets; a loaded item whose canonical path
//! is among them counts as linked.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Canonical targets of every symlink below the given destinations.
pub fn scan_link_targets(destinations: &[PathBuf]) -> HashSet<PathBuf> {
    let mut targets = HashSet::new();

    for destination in destinations {
        for entry in WalkDir::new(destination).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(?destination, error = ?e, "Failed to walk destination");
                    continue;
                }
            };
            if !entry.path_is_symlink() {
                continue;
            }
            match resolve_link(entry.path()) {
                Some(target) => {
                    trace!(link = ?entry.path(), ?target, "Found link");
                    targets.insert(target);
                }
                None => debug!(link = ?entry.path(), "Dangling link"),
            }
        }
    }

    debug!(count = targets.len(), "Scanned destination links");
    targets
}

fn resolve_link(link: &Path) -> Option<PathBuf> {
    let raw = fs::read_link(link).ok()?;
    let absolute = if raw.is_absolute() {
        raw
    } else {
        link.parent()?.join(raw)
    };
    fs::canonicalize(absolute).ok()
}

/// Canonical form of a source path for comparison with link targets.
pub fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    #[test]
    fn test_finds_absolute_and_relative_links() {
        let root = tempdir().unwrap();
        let source = root.path().join("card");
        let dest = root.path().join("project");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(dest.join("day1")).unwrap();

        let a = source.join("a.jpg");
        let b = source.join("b.jpg");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();
        fs::write(source.join("c.jpg"), b"c").unwrap();

        symlink(&a, dest.join("a.jpg")).unwrap();
        symlink("../../card/b.jpg", dest.join("day1/b.jpg")).unwrap();
        symlink(source.join("gone.jpg"), dest.join("gone.jpg")).unwrap();

        let targets = scan_link_targets(&[dest]);
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&canonical(&a)));
        assert!(targets.contains(&canonical(&b)));
        assert!(!targets.contains(&canonical(&source.join("c.jpg"))));
    }

    #[test]
    fn test_missing_destination_is_empty() {
        let root = tempdir().unwrap();
        assert!(scan_link_targets(&[root.path().join("nope")]).is_empty());
    }
}
