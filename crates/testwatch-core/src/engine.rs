use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::editor;
use crate::executor::{ExecutionRequest, Executor};
use crate::model::{ProjectId, SuiteId};
use crate::notify::{NotificationSelector, Notifier, NotifyError, TestResult};
use crate::output::OutputInterpreter;
use crate::queue::QueueManager;
use crate::recorder::{RawOutput, Recorded, ResultRecorder};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::store::{Store, StoreError};
use crate::sync::{SyncError, SyncReport, TestSynchronizer};

/// Ties the engine components to one store and configuration.
///
/// Provides the high-level operations driven by the command line: keeping
/// the store in line with configuration and disk, feeding the executor one
/// test at a time, and notifying about results.
pub struct Engine<S: Store> {
    store: Arc<S>,
    config: Config,
    queue: QueueManager<S>,
    synchronizer: TestSynchronizer<S>,
    recorder: ResultRecorder<S>,
    notifications: NotificationSelector<S>,
}

impl<S: Store> Engine<S> {
    pub fn new(store: Arc<S>, config: Config) -> Result<Self, EngineError> {
        let interpreter = OutputInterpreter::from_config(&config.watcher)?;

        Ok(Self {
            queue: QueueManager::new(Arc::clone(&store)),
            synchronizer: TestSynchronizer::new(Arc::clone(&store)),
            recorder: ResultRecorder::new(Arc::clone(&store), interpreter),
            notifications: NotificationSelector::new(Arc::clone(&store)),
            store,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &QueueManager<S> {
        &self.queue
    }

    pub fn synchronizer(&self) -> &TestSynchronizer<S> {
        &self.synchronizer
    }

    pub fn recorder(&self) -> &ResultRecorder<S> {
        &self.recorder
    }

    pub fn notifications(&self) -> &NotificationSelector<S> {
        &self.notifications
    }

    /// Mirrors the configured testers, projects and suites into the store.
    pub fn reconcile(&self) -> Result<ReconcileReport, EngineError> {
        Ok(reconcile(self.store.as_ref(), &self.config)?)
    }

    /// Synchronizes every suite with the disk.
    pub fn sync_all(&self) -> Result<SyncReport, EngineError> {
        Ok(self.synchronizer.sync_all(&self.config.watcher.exclusions)?)
    }

    /// Synchronizes the suites affected by a change to `path`.
    pub fn sync_path(&self, path: &Path) -> Result<SyncReport, EngineError> {
        let mut report = SyncReport::default();
        for suite in self.synchronizer.suites_for_path(path)? {
            report.merge(
                self.synchronizer
                    .sync_suite(suite.id, &self.config.watcher.exclusions)?,
            );
        }
        Ok(report)
    }

    /// Claims the next queued test, runs it and records the result.
    ///
    /// Returns `None` when nothing is waiting. An executor failure is stored
    /// as a failed run carrying the error text.
    pub async fn tick(&self, executor: &dyn Executor) -> Result<Option<Recorded>, EngineError> {
        let Some(test) = self.queue.claim_next()? else {
            return Ok(None);
        };

        let Some(ctx) = self.store.test_context(test.id)? else {
            warn!(test = %test.id, "claimed test has no suite, project or tester");
            self.queue.reset(test.id)?;
            return Ok(Some(Recorded::TestMissing));
        };

        let request = ExecutionRequest::new(ctx);
        info!(test = %test.id, command = %request.command, "running test");

        let raw = match executor.run(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(test = %test.id, error = %e, "executor failed");
                let now = Utc::now();
                RawOutput {
                    output: e.to_string(),
                    success: false,
                    started_at: now,
                    ended_at: now,
                }
            }
        };

        Ok(Some(self.recorder.record(test.id, raw)?))
    }

    /// Latest result of every test, in listing order.
    pub fn latest_results(
        &self,
        project: Option<ProjectId>,
    ) -> Result<Vec<TestResult>, EngineError> {
        Ok(self.notifications.latest_results(project)?)
    }

    /// Delivers eligible results and marks them notified.
    pub async fn notify(
        &self,
        notifier: &dyn Notifier,
        project: Option<ProjectId>,
    ) -> Result<usize, EngineError> {
        Ok(self.notifications.deliver(notifier, project).await?)
    }

    /// Editor command for a file referenced from a suite's output.
    pub fn edit_command(
        &self,
        suite: SuiteId,
        file: &str,
        line: Option<u32>,
    ) -> Result<String, EngineError> {
        let suite = self.store.get_suite(suite)?;
        let project = match &suite {
            Some(suite) => self.store.get_project(suite.project_id)?,
            None => None,
        };

        Ok(editor::edit_command(
            &self.config,
            suite.as_ref(),
            project.as_ref(),
            file,
            line,
        )?)
    }
}

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),
}
