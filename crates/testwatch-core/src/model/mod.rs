//! Entities tracked by the engine.
//!
//! - [`Project`], [`Suite`] and [`Tester`] come from configuration.
//! - [`Test`] rows are discovered by the synchronizer.
//! - [`Run`] rows are written by the result recorder.
//! - [`QueueEntry`] rows mark tests waiting for the executor.

mod ids;
mod project;

pub use ids::{ProjectId, QueueEntryId, RunId, SuiteId, TestId, TesterId};
pub use project::{
    ArtifactStrategy, NewProject, NewSuite, NewTester, Project, Suite, SuiteSettings, Tester,
    TesterProfile, DEFAULT_FAILURE_PATTERN, DEFAULT_SCREENSHOT_TEMPLATE,
};
pub use test::{NewRun, NewTest, QueueEntry, Run, Test, TestContext, TestFilter, TestUpsert};
