//! Selection of results worth notifying about.
//!
//! Failures are always surfaced again; other results only once they have a
//! notification history. Selected results are marked notified as a separate
//! step, after delivery succeeded.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{ProjectId, Run, Test, TestFilter};
use crate::state::TestState;
use crate::store::{Store, StoreError};

/// Errors from delivering notifications.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A test together with its latest run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub test: Test,
    pub suite_name: String,
    pub project_id: ProjectId,
    pub project_name: String,
    pub run: Option<Run>,
}

impl TestResult {
    pub fn state(&self) -> TestState {
        self.test.state
    }

    pub fn is_notified(&self) -> bool {
        self.run.as_ref().is_some_and(|r| r.notified_at.is_some())
    }

    /// Failed results always qualify; others only once notified before.
    pub fn is_eligible(&self) -> bool {
        self.state() == TestState::Failed || self.is_notified()
    }
}

/// Delivers selected results somewhere.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, results: &[TestResult]) -> Result<(), NotifyError>;
}

/// Writes each result to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, results: &[TestResult]) -> Result<(), NotifyError> {
        for result in results {
            if result.state() == TestState::Failed {
                warn!(
                    project = %result.project_name,
                    suite = %result.suite_name,
                    test = %result.test.name,
                    "test failed"
                );
            } else {
                info!(
                    project = %result.project_name,
                    suite = %result.suite_name,
                    test = %result.test.name,
                    state = %result.state(),
                    "test result"
                );
            }
        }
        Ok(())
    }
}

/// Builds the latest-result view and picks what to notify.
pub struct NotificationSelector<S: Store> {
    store: Arc<S>,
}

impl<S: Store> NotificationSelector<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Every test with its latest run: running first, then failed, queued,
    /// ok and idle, most recently updated first within a state.
    pub fn latest_results(
        &self,
        project: Option<ProjectId>,
    ) -> Result<Vec<TestResult>, StoreError> {
        let mut results = Vec::new();

        for test in self.store.list_tests(&TestFilter::project(project))? {
            let Some(suite) = self.store.get_suite(test.suite_id)? else {
                continue;
            };
            let Some(owner) = self.store.get_project(suite.project_id)? else {
                continue;
            };
            let run = self.store.latest_run(test.id)?;

            results.push(TestResult {
                test,
                suite_name: suite.name,
                project_id: owner.id,
                project_name: owner.name,
                run,
            });
        }

        results.sort_by(|a, b| {
            a.state()
                .sort_rank()
                .cmp(&b.state().sort_rank())
                .then(b.test.updated_at.cmp(&a.test.updated_at))
        });
        Ok(results)
    }

    /// Drops results that are not failed and were never notified.
    pub fn eligible(&self, results: Vec<TestResult>) -> Vec<TestResult> {
        results.into_iter().filter(TestResult::is_eligible).collect()
    }

    /// Stamps the runs of `results` as notified now.
    pub fn mark_notified(&self, results: &[TestResult]) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut marked = 0;
        for run in results.iter().filter_map(|r| r.run.as_ref()) {
            self.store.mark_run_notified(run.id, now)?;
            marked += 1;
        }
        Ok(marked)
    }

    /// Selects eligible results, hands them to the notifier and marks them
    /// notified once delivery succeeded. Returns how many were delivered.
    pub async fn deliver(
        &self,
        notifier: &dyn Notifier,
        project: Option<ProjectId>,
    ) -> Result<usize, NotifyError> {
        let selected = self.eligible(self.latest_results(project)?);
        if selected.is_empty() {
            return Ok(0);
        }

        notifier.notify(&selected).await?;
        self.mark_notified(&selected)?;
        Ok(selected.len())
    }
}
