//! Default values for testwatch configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Config Locations
// ============================================================================

/// Project-local configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "testwatch.toml";

/// Sub-directory of the user config dir holding `config.toml`.
pub const DEFAULT_CONFIG_DIR: &str = "testwatch";

// ============================================================================
// Watcher Defaults
// ============================================================================

/// Seconds between synchronization passes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Matches source references in tool output: `file` is the path, `line` the line.
///
/// Finds references such as:
/// - `at Object..test (resources/assets/js/tests/example.spec.js:4:23`
/// - `(resources/assets/js/tests/example.spec.js:4`
/// - `/resources/assets/js/tests/example.php:449`
pub const DEFAULT_FILE_MATCHER: &str =
    r"(?P<file>(?:[A-Za-z]:)?[\w.\-/\\]*[\w\-]+\.[A-Za-z0-9]+):(?P<line>\d+)";

/// Target of "open in editor" links. `{file}` is the hex-encoded file name.
pub const DEFAULT_LINK_TEMPLATE: &str =
    "/tests-watcher/file/edit?filename={file}&suite_id={suite}&line={line}";

// ============================================================================
// Project Defaults
// ============================================================================

/// Tests directory of a project when none is configured.
pub const DEFAULT_TESTS_PATH: &str = "tests";

/// Source extensions checked for abstract class declarations.
pub const ABSTRACT_CLASS_EXTENSIONS: &[&str] = &["php", "java", "cs", "ts", "kt"];

// ============================================================================
// Output Defaults
// ============================================================================

/// Log stored for a run that produced no output.
pub const EMPTY_LOG: &str = "(empty)";

// ============================================================================
// Storage Defaults
// ============================================================================

/// Default data directory name.
pub const DEFAULT_DATA_DIR: &str = ".testwatch";

/// Default store file name.
pub const DEFAULT_STORE_FILE: &str = "store.json";
