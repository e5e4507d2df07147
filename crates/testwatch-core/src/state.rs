use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a discovered test.
///
/// Tests rest in `Idle`, `Ok` or `Failed` and move through the run queue:
/// resting → Queued → Running → Ok | Failed. A reset brings any state back
/// to `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    /// Discovered but never run, or explicitly reset
    #[default]
    Idle,
    /// Waiting in the run queue
    Queued,
    /// Handed to the executor
    Running,
    /// Last run succeeded
    Ok,
    /// Last run failed
    Failed,
}

impl TestState {
    /// Returns true for the states a test rests in between runs.
    pub fn is_resting(&self) -> bool {
        !self.is_active()
    }

    /// Returns true while the test is queued or running.
    pub fn is_active(&self) -> bool {
        matches!(self, TestState::Queued | TestState::Running)
    }

    /// Checks whether moving from this state to `to` is allowed.
    ///
    /// `force` lets an active (queued or running) test be queued again.
    pub fn can_transition(&self, to: TestState, force: bool) -> bool {
        match (self, to) {
            (_, TestState::Idle) => true,
            (from, TestState::Queued) => force || from.is_resting(),
            (TestState::Queued, TestState::Running) => true,
            (TestState::Running, TestState::Ok | TestState::Failed) => true,
            _ => false,
        }
    }

    /// The resting state reached after a run with the given outcome.
    pub fn from_outcome(success: bool) -> Self {
        if success {
            TestState::Ok
        } else {
            TestState::Failed
        }
    }

    /// Sort rank used by result listings: running first, idle last.
    pub fn sort_rank(&self) -> u8 {
        match self {
            TestState::Running => 1,
            TestState::Failed => 2,
            TestState::Queued => 3,
            TestState::Ok => 4,
            TestState::Idle => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestState::Idle => "idle",
            TestState::Queued => "queued",
            TestState::Running => "running",
            TestState::Ok => "ok",
            TestState::Failed => "failed",
        }
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "idle" => Ok(TestState::Idle),
            "queued" => Ok(TestState::Queued),
            "running" => Ok(TestState::Running),
            "ok" => Ok(TestState::Ok),
            "failed" => Ok(TestState::Failed),
            other => Err(format!("unknown test state: {}", other)),
        }
    }
}
