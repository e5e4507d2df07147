//! Runs tests as shell commands.

use async_trait::async_trait;
use chrono::Utc;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use testwatch_core::executor::shell_quote;
use testwatch_core::{ExecutionRequest, Executor, ExecutorError, RawOutput};

/// Executes the expanded command line with `bash` from the project root.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }
}

impl ShellExecutor {
    async fn run_once(&self, request: &ExecutionRequest) -> Result<RawOutput, ExecutorError> {
        let line = command_line(request);
        debug!(test = %request.test_id(), command = %line, "spawning");

        let started_at = Utc::now();
        let output = Command::new(&self.shell)
            .arg("-o")
            .arg("pipefail")
            .arg("-c")
            .arg(&line)
            .current_dir(request.working_dir())
            .envs(request.env())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExecutorError::Spawn {
                command: line.clone(),
                source,
            })?;
        let ended_at = Utc::now();

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let success = output.status.success() && !request.output_indicates_failure(&text)?;

        Ok(RawOutput {
            output: text,
            success,
            started_at,
            ended_at,
        })
    }
}

/// Wraps the request's command for tools that need a terminal or a pipe.
fn command_line(request: &ExecutionRequest) -> String {
    let mut line = request.command.clone();
    if request.require_script() {
        line = format!("script -q -e -c {} /dev/null", shell_quote(&line));
    }
    if request.require_tee() {
        line = format!("{} 2>&1 | tee", line);
    }
    line
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn run(&self, request: &ExecutionRequest) -> Result<RawOutput, ExecutorError> {
        let mut remaining = request.retries();
        loop {
            let raw = self.run_once(request).await?;
            if raw.success || remaining == 0 {
                return Ok(raw);
            }
            remaining -= 1;
            info!(test = %request.test_id(), remaining, "test failed, retrying");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use testwatch_core::model::{
        Project, ProjectId, Suite, SuiteId, SuiteSettings, Test, TestContext, TestId, Tester,
        TesterId, TesterProfile,
    };
    use testwatch_core::TestState;

    fn request(root: &Path, profile: TesterProfile, retries: u32) -> ExecutionRequest {
        let now = Utc::now();
        ExecutionRequest::new(TestContext {
            test: Test {
                id: TestId(1),
                fingerprint: "f".to_string(),
                path: root.to_path_buf(),
                name: "check.sh".to_string(),
                suite_id: SuiteId(1),
                state: TestState::Running,
                enabled: true,
                last_run_id: None,
                created_at: now,
                updated_at: now,
            },
            suite: Suite {
                id: SuiteId(1),
                name: "unit".to_string(),
                project_id: ProjectId(1),
                tester_id: TesterId(1),
                settings: SuiteSettings {
                    retries,
                    ..SuiteSettings::default()
                },
            },
            project: Project {
                id: ProjectId(1),
                name: "app".to_string(),
                path: root.to_path_buf(),
                tests_path: PathBuf::from("."),
                enabled: true,
                depends: vec![],
                exclusions: vec![],
            },
            tester: Tester {
                id: TesterId(1),
                name: "sh".to_string(),
                profile,
            },
        })
    }

    fn profile(command: &str) -> TesterProfile {
        TesterProfile {
            command: command.to_string(),
            ..TesterProfile::default()
        }
    }

    #[tokio::test]
    async fn test_success_and_output() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("check.sh"), "echo passed").unwrap();

        let raw = ShellExecutor::default()
            .run(&request(temp.path(), profile("bash"), 0))
            .await
            .unwrap();

        assert!(raw.success);
        assert_eq!(raw.output, "passed\n");
    }

    #[tokio::test]
    async fn test_exit_status_marks_failure() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("check.sh"), "echo broken >&2; exit 3").unwrap();

        let raw = ShellExecutor::default()
            .run(&request(temp.path(), profile("bash"), 0))
            .await
            .unwrap();

        assert!(!raw.success);
        assert!(raw.output.contains("broken"));
    }

    #[tokio::test]
    async fn test_error_pattern_overrides_exit_status() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("check.sh"), "echo 'FAILURES!'").unwrap();

        let raw = ShellExecutor::default()
            .run(&request(
                temp.path(),
                TesterProfile {
                    error_pattern: Some("FAILURES!".to_string()),
                    ..profile("bash")
                },
                0,
            ))
            .await
            .unwrap();

        assert!(!raw.success);
    }

    #[tokio::test]
    async fn test_env_and_working_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("check.sh"), "echo \"$SUITE_ENV\"; ls").unwrap();

        let mut profile = profile("bash");
        profile
            .env
            .insert("SUITE_ENV".to_string(), "testing".to_string());
        let raw = ShellExecutor::default()
            .run(&request(temp.path(), profile, 0))
            .await
            .unwrap();

        assert_eq!(raw.output, "testing\ncheck.sh\n");
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let temp = TempDir::new().unwrap();
        // Fails on the first attempt only.
        std::fs::write(
            temp.path().join("check.sh"),
            "if [ -f seen ]; then echo ok; else touch seen; exit 1; fi",
        )
        .unwrap();

        let executor = ShellExecutor::default();
        let raw = executor
            .run(&request(temp.path(), profile("bash"), 1))
            .await
            .unwrap();
        assert!(raw.success);

        std::fs::remove_file(temp.path().join("seen")).unwrap();
        let raw = executor
            .run(&request(temp.path(), profile("bash"), 0))
            .await
            .unwrap();
        assert!(!raw.success);
    }

    #[test]
    fn test_tee_wrapping() {
        let request = request(
            Path::new("/srv/app"),
            TesterProfile {
                require_tee: true,
                ..profile("phpunit")
            },
            0,
        );
        assert_eq!(command_line(&request), "phpunit /srv/app/check.sh 2>&1 | tee");
    }
}
