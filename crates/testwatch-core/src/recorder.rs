//! Ingestion of executor output into stored runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::model::{NewRun, Run, TestId};
use crate::output::OutputInterpreter;
use crate::state::TestState;
use crate::store::{Store, StoreError};

/// What an executor produced for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutput {
    pub output: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Outcome of recording a result.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Stored(Run),
    /// The test was deleted while it ran; nothing was written.
    TestMissing,
}

/// Turns raw output into a [`Run`] and finishes the test's lifecycle.
pub struct ResultRecorder<S: Store> {
    store: Arc<S>,
    interpreter: OutputInterpreter,
}

impl<S: Store> ResultRecorder<S> {
    pub fn new(store: Arc<S>, interpreter: OutputInterpreter) -> Self {
        Self { store, interpreter }
    }

    /// Stores the run, moves the test to `ok` or `failed`, points it at the
    /// new run and removes its queue entry.
    pub fn record(&self, test: TestId, raw: RawOutput) -> Result<Recorded, StoreError> {
        let Some(ctx) = self.store.test_context(test)? else {
            warn!(test = %test, "test vanished before its result was recorded");
            return Ok(Recorded::TestMissing);
        };

        let log = self.interpreter.format_log(&raw.output, &ctx);
        let html = self.interpreter.html_artifact(&ctx);
        let screenshots = self.interpreter.screenshots(&ctx, &raw.output);

        let run = self.store.insert_run(NewRun {
            test_id: test,
            success: raw.success,
            log,
            html,
            screenshots,
            started_at: raw.started_at,
            ended_at: raw.ended_at,
        })?;

        let state = TestState::from_outcome(raw.success);
        if !self.store.finish_test(test, run.id, state)? {
            // Deleted between lookup and write; the run stays orphaned.
            warn!(test = %test, run = %run.id, "test vanished while recording");
            return Ok(Recorded::TestMissing);
        }
        self.store.delete_queue_entry(test)?;

        info!(
            test = %test,
            name = %ctx.test.name,
            %state,
            duration_ms = run.duration().num_milliseconds(),
            "recorded run"
        );
        Ok(Recorded::Stored(run))
    }
}
