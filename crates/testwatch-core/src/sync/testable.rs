use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::config::ABSTRACT_CLASS_EXTENSIONS;

/// A line declaring an abstract class, up to its opening brace.
static ABSTRACT_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:(?:public|internal|private|protected|export|final|sealed)\s+)*abstract\s+(?:(?:public|internal|private|protected|export)\s+)*class\s[A-Za-z0-9_ \t\r\n,<>.:()\\]{1,200}\{",
    )
    .expect("valid abstract class regex")
});

/// Decides whether a file found in a tests directory holds no runnable tests.
pub trait SkipPredicate: Send + Sync {
    fn should_skip(&self, path: &Path, contents: &[u8]) -> bool;
}

/// Skips sources declaring an abstract class, which are base classes for
/// other tests rather than tests themselves.
#[derive(Debug, Clone)]
pub struct AbstractClassPredicate {
    extensions: Vec<String>,
}

impl AbstractClassPredicate {
    pub fn new<I, E>(extensions: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for AbstractClassPredicate {
    fn default() -> Self {
        Self::new(ABSTRACT_CLASS_EXTENSIONS.iter().copied())
    }
}

impl SkipPredicate for AbstractClassPredicate {
    fn should_skip(&self, path: &Path, contents: &[u8]) -> bool {
        let checked = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
        if !checked {
            return false;
        }

        ABSTRACT_CLASS.is_match(&String::from_utf8_lossy(contents))
    }
}

/// Treats every file as a test.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverSkip;

impl SkipPredicate for NeverSkip {
    fn should_skip(&self, _path: &Path, _contents: &[u8]) -> bool {
        false
    }
}
