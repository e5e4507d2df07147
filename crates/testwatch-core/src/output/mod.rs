//! Interpretation of raw test-tool output.
//!
//! Turns the text captured from a test run into the pieces stored on a
//! [`Run`](crate::model::Run):
//!
//! - the log, with ANSI colors rendered as HTML and `file:line` references
//!   rewritten into "open in editor" links
//! - the HTML failure artifact written by the tool, if any
//! - screenshot paths, located per the tester's [`ArtifactStrategy`](crate::model::ArtifactStrategy)
//!
//! Everything here is pure text processing apart from checking which
//! referenced files and artifacts exist.

pub mod ansi;
pub mod artifacts;
pub mod links;

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

pub use ansi::{remove_ansi_codes, to_html};
pub use links::{LinkTarget, SourceReference};

use crate::config::{
    ConfigError, WatcherConfig, DEFAULT_FILE_MATCHER, DEFAULT_LINK_TEMPLATE, EMPTY_LOG,
};
use crate::model::TestContext;

static DEFAULT_MATCHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_FILE_MATCHER).expect("valid default file matcher"));

/// Renders logs and collects artifacts for recorded runs.
#[derive(Debug, Clone)]
pub struct OutputInterpreter {
    file_matcher: Regex,
    link_template: String,
}

impl OutputInterpreter {
    pub fn new(file_matcher: Regex, link_template: impl Into<String>) -> Self {
        Self {
            file_matcher,
            link_template: link_template.into(),
        }
    }

    pub fn from_config(config: &WatcherConfig) -> Result<Self, ConfigError> {
        let file_matcher = Regex::new(&config.file_matcher).map_err(|e| {
            ConfigError::Invalid(format!("watcher.file_matcher: {}", e))
        })?;
        Ok(Self::new(file_matcher, config.link_template.clone()))
    }

    /// Renders a raw log: ANSI to HTML, newlines normalized, references to
    /// files under the project root turned into links.
    pub fn format_log(&self, raw: &str, ctx: &TestContext) -> String {
        if raw.is_empty() {
            return EMPTY_LOG.to_string();
        }

        let html = to_html(raw);
        let references = links::find_references(&self.file_matcher, &html);
        if references.is_empty() {
            return html;
        }

        let target = LinkTarget {
            project_root: &ctx.project.path,
            suite: ctx.suite.id,
            template: &self.link_template,
        };
        links::link_references(&html, &references, &target)
    }

    /// The HTML failure artifact of the run, if the tool wrote one.
    pub fn html_artifact(&self, ctx: &TestContext) -> Option<String> {
        artifacts::html_artifact(ctx)
    }

    /// Screenshots of the run.
    pub fn screenshots(&self, ctx: &TestContext, raw: &str) -> Vec<PathBuf> {
        artifacts::screenshots(ctx, raw)
    }
}

impl Default for OutputInterpreter {
    fn default() -> Self {
        Self::new(DEFAULT_MATCHER.clone(), DEFAULT_LINK_TEMPLATE)
    }
}
