//! The seam to whatever actually runs a test.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::model::{TestContext, TestId};
use crate::recorder::RawOutput;

/// Errors raised while running a test.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid error pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Executor error: {0}")]
    Other(String),
}

/// Everything needed to run one test.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub context: TestContext,
    /// Command line with the test file and suite options substituted
    pub command: String,
}

impl ExecutionRequest {
    pub fn new(context: TestContext) -> Self {
        let file = context.test.full_path();
        let command = expand_command(
            &context.tester.profile.command,
            context.suite.settings.command_options.as_deref(),
            &file,
        );
        Self { context, command }
    }

    pub fn test_id(&self) -> TestId {
        self.context.test.id
    }

    /// Commands run from the project root.
    pub fn working_dir(&self) -> &Path {
        &self.context.project.path
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.context.tester.profile.env
    }

    /// Extra attempts after a failed run, from the suite.
    pub fn retries(&self) -> u32 {
        self.context.suite.settings.retries
    }

    pub fn require_tee(&self) -> bool {
        self.context.tester.profile.require_tee
    }

    pub fn require_script(&self) -> bool {
        self.context.tester.profile.require_script
    }

    /// Whether output matches the tester's error pattern. Some tools exit
    /// with success even when tests fail.
    pub fn output_indicates_failure(&self, output: &str) -> Result<bool, ExecutorError> {
        match &self.context.tester.profile.error_pattern {
            Some(pattern) => Ok(Regex::new(pattern)?.is_match(output)),
            None => Ok(false),
        }
    }
}

/// Substitutes `{file}` and `{options}` into a tester's command template.
/// Templates without `{file}` get options and file appended.
pub fn expand_command(template: &str, options: Option<&str>, file: &Path) -> String {
    let file = shell_quote(&file.to_string_lossy());
    let options = options.unwrap_or("").trim();

    if template.contains("{file}") {
        return template
            .replace("{options}", options)
            .replace("{file}", &file)
            .trim()
            .to_string();
    }

    let mut command = template.trim().to_string();
    if !options.is_empty() {
        command.push(' ');
        command.push_str(options);
    }
    command.push(' ');
    command.push_str(&file);
    command
}

/// Quotes a word for `sh` when it holds anything but safe characters.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Runs tests.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, request: &ExecutionRequest) -> Result<RawOutput, ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_appends_options_and_file() {
        assert_eq!(
            expand_command(
                "vendor/bin/phpunit",
                Some("--colors=always"),
                Path::new("/srv/app/tests/UserTest.php")
            ),
            "vendor/bin/phpunit --colors=always /srv/app/tests/UserTest.php"
        );
        assert_eq!(
            expand_command("jest", None, Path::new("/a/b.spec.js")),
            "jest /a/b.spec.js"
        );
    }

    #[test]
    fn test_expand_template() {
        assert_eq!(
            expand_command(
                "php artisan dusk {file} {options}",
                None,
                Path::new("/srv/app/tests/Browser/LoginTest.php")
            ),
            "php artisan dusk /srv/app/tests/Browser/LoginTest.php"
        );
    }

    #[test]
    fn test_quotes_unsafe_paths() {
        assert_eq!(shell_quote("/srv/my app/x.php"), "'/srv/my app/x.php'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("/plain/path.php"), "/plain/path.php");
    }
}
