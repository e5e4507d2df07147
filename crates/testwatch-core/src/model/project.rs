use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::ids::{ProjectId, SuiteId, TesterId};

/// Log pattern locating failing browser-test cases; group 2 names the case.
pub const DEFAULT_FAILURE_PATTERN: &str = r"([0-9]\)+\s.+::)(.*)";

/// Screenshot file written by browser-test tools for a failing case.
pub const DEFAULT_SCREENSHOT_TEMPLATE: &str = "failure-{name}-0.png";

/// A codebase root holding one or more suites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    /// Unique name
    pub name: String,
    /// Project root on disk
    pub path: PathBuf,
    /// Default tests directory, relative to `path`
    pub tests_path: PathBuf,
    /// Disabled projects never admit tests to the queue
    pub enabled: bool,
    /// Names of projects whose changes should also trigger this project
    #[serde(default)]
    pub depends: Vec<String>,
    /// Path prefixes never turned into tests
    #[serde(default)]
    pub exclusions: Vec<PathBuf>,
}

/// Project fields provided by configuration.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub path: PathBuf,
    pub tests_path: PathBuf,
    pub depends: Vec<String>,
    pub exclusions: Vec<PathBuf>,
}

/// How screenshots of failing tests are located after a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ArtifactStrategy {
    /// One screenshot named after the test file.
    #[default]
    Generic,
    /// One screenshot per failing case found in the log by `pattern`.
    PatternBased {
        #[serde(default = "default_failure_pattern")]
        pattern: String,
        /// File name template; `{name}` is replaced by the failing case.
        #[serde(default = "default_screenshot_template")]
        file_template: String,
    },
}

fn default_failure_pattern() -> String {
    DEFAULT_FAILURE_PATTERN.to_string()
}

fn default_screenshot_template() -> String {
    DEFAULT_SCREENSHOT_TEMPLATE.to_string()
}

/// Tool profile of a tester, as written in configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TesterProfile {
    /// Invocation template. `{file}` and `{options}` are substituted,
    /// otherwise options and file are appended.
    pub command: String,
    /// Folder (relative to the project root) where the tool writes artifacts
    pub output_folder: Option<PathBuf>,
    pub output_html_fail_extension: Option<String>,
    pub output_png_fail_extension: Option<String>,
    /// Pipe output through `tee`
    pub require_tee: bool,
    /// Run under a pseudo-terminal via `script`
    pub require_script: bool,
    /// Output matching this regex marks the run as failed
    pub error_pattern: Option<String>,
    pub env: BTreeMap<String, String>,
    pub artifacts: ArtifactStrategy,
}

/// A configured test-running tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tester {
    pub id: TesterId,
    pub name: String,
    #[serde(flatten)]
    pub profile: TesterProfile,
}

#[derive(Debug, Clone, Default)]
pub struct NewTester {
    pub name: String,
    pub profile: TesterProfile,
}

/// Per-suite settings shared between configuration and the stored suite.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteSettings {
    /// Overrides the project's tests directory
    pub tests_path: Option<PathBuf>,
    pub command_options: Option<String>,
    /// Glob restricting which file names are tests
    pub file_mask: Option<String>,
    /// Passed through to the executor
    pub retries: u32,
    /// Editor identifier used for "open in editor" commands
    pub editor: Option<String>,
}

/// A named group of tests within a project, bound to one tester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub id: SuiteId,
    pub name: String,
    pub project_id: ProjectId,
    pub tester_id: TesterId,
    #[serde(flatten)]
    pub settings: SuiteSettings,
}

impl Suite {
    /// Resolves the directory holding this suite's tests.
    pub fn tests_dir(&self, project: &Project) -> PathBuf {
        let relative = self
            .settings
            .tests_path
            .as_ref()
            .unwrap_or(&project.tests_path);
        project.path.join(relative)
    }
}

#[derive(Debug, Clone)]
pub struct NewSuite {
    pub name: String,
    pub project_id: ProjectId,
    pub tester_id: TesterId,
    pub settings: SuiteSettings,
}
