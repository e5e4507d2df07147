//! Path-prefix exclusion of files from synchronization.

use std::path::{Path, PathBuf};

/// What is being checked against the exclusion list.
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    /// A file found on disk, used as-is.
    Path(&'a Path),
    /// A bare file name, resolved against the base path.
    Name(&'a str),
}

impl Candidate<'_> {
    fn resolve(&self, base_path: &Path) -> PathBuf {
        match self {
            Candidate::Path(path) => path.to_path_buf(),
            Candidate::Name(name) => base_path.join(name),
        }
    }
}

/// Returns true if the candidate path starts with any exclusion prefix.
///
/// Matching is textual, so `tests/Unit` also excludes `tests/UnitLegacy`.
pub fn is_excluded<P: AsRef<Path>>(
    exclusions: &[P],
    base_path: &Path,
    candidate: Candidate<'_>,
) -> bool {
    if exclusions.is_empty() {
        return false;
    }

    let path = candidate.resolve(base_path);
    let path = path.to_string_lossy();

    exclusions.iter().any(|prefix| {
        let prefix = prefix.as_ref().to_string_lossy();
        !prefix.is_empty() && path.starts_with(prefix.as_ref())
    })
}
