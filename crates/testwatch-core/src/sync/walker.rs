//! File enumeration and fingerprinting.

use globset::{Glob, GlobMatcher};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::SyncError;

/// Restricts which file names count as tests.
#[derive(Debug, Clone)]
pub struct FileMask {
    matcher: GlobMatcher,
}

impl FileMask {
    pub fn new(mask: &str) -> Result<Self, SyncError> {
        let glob = Glob::new(mask).map_err(|source| SyncError::InvalidFileMask {
            mask: mask.to_string(),
            source,
        })?;
        Ok(Self {
            matcher: glob.compile_matcher(),
        })
    }

    /// Matches against the file name only.
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.matcher.is_match(Path::new(name)))
    }
}

/// Lists every file under `root`, sorted by name, skipping hidden entries.
///
/// Ignore files are not honoured: a test listed in `.gitignore` is still a test.
pub fn walk_files(root: &Path, mask: Option<&FileMask>) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if mask.is_some_and(|m| !m.matches(entry.path())) {
            continue;
        }
        files.push(entry.into_path());
    }
    files
}

/// SHA-256 of the file contents, hex encoded.
pub fn fingerprint(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    hex::encode(hasher.finalize())
}

/// Test name of a file: its path relative to the tests directory, with `/`
/// separators.
pub fn relative_name(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("Unit/Nested")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join("Unit/BTest.php"), "b").unwrap();
        fs::write(root.join("Unit/ATest.php"), "a").unwrap();
        fs::write(root.join("Unit/Nested/CTest.php"), "c").unwrap();
        fs::write(root.join("Unit/helpers.js"), "h").unwrap();
        fs::write(root.join(".cache/DTest.php"), "d").unwrap();
        fs::write(root.join(".gitignore"), "Unit/\n").unwrap();
        temp
    }

    #[test]
    fn test_walk_sorted_skips_hidden() {
        let temp = tree();
        let names: Vec<String> = walk_files(temp.path(), None)
            .iter()
            .map(|f| relative_name(temp.path(), f))
            .collect();

        assert_eq!(
            names,
            vec![
                "Unit/ATest.php",
                "Unit/BTest.php",
                "Unit/Nested/CTest.php",
                "Unit/helpers.js",
            ]
        );
    }

    #[test]
    fn test_mask_matches_file_name() {
        let temp = tree();
        let mask = FileMask::new("*Test.php").unwrap();
        let files = walk_files(temp.path(), Some(&mask));
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.to_string_lossy().ends_with("Test.php")));
    }

    #[test]
    fn test_invalid_mask() {
        assert!(matches!(
            FileMask::new("[unclosed"),
            Err(SyncError::InvalidFileMask { .. })
        ));
    }

    #[test]
    fn test_fingerprint_is_content_hash() {
        assert_eq!(fingerprint(b"a"), fingerprint(b"a"));
        assert_ne!(fingerprint(b"a"), fingerprint(b"b"));
        assert_eq!(fingerprint(b"").len(), 64);
    }
}
