mod error;
mod file;
mod memory;
mod tables;

pub use error::StoreError;
pub use file::{FileStore, JsonFile};
pub use memory::{InMemory, MemoryStore};
pub use tables::{Persistence, TableStore, Tables};

use chrono::{DateTime, Utc};

use crate::model::{
    NewProject, NewRun, NewSuite, NewTest, NewTester, Project, ProjectId, QueueEntry, Run, RunId,
    Suite, SuiteId, Test, TestContext, TestFilter, TestId, TestUpsert, Tester, TesterId,
};
use crate::queue::Admission;
use crate::state::TestState;

/// Trait for durable storage backends.
///
/// Every method is a single atomic step: compound operations such as
/// [`Store::enqueue_test`] and [`Store::claim_next_queued`] must not
/// interleave with other calls. Deleting a project removes its suites,
/// deleting a suite removes its tests, deleting a test removes its queue
/// entry. Runs are never removed by cascades.
pub trait Store: Send + Sync {
    // --- Projects ---

    /// Creates or updates a project by name. `enabled` and `id` survive updates.
    fn upsert_project(&self, project: NewProject) -> Result<Project, StoreError>;

    fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError>;

    fn list_projects(&self) -> Result<Vec<Project>, StoreError>;

    fn set_project_enabled(&self, id: ProjectId, enabled: bool) -> Result<(), StoreError>;

    fn delete_project(&self, id: ProjectId) -> Result<(), StoreError>;

    // --- Testers ---

    /// Creates or updates a tester by name.
    fn upsert_tester(&self, tester: NewTester) -> Result<Tester, StoreError>;

    fn get_tester(&self, id: TesterId) -> Result<Option<Tester>, StoreError>;

    fn find_tester_by_name(&self, name: &str) -> Result<Option<Tester>, StoreError>;

    fn list_testers(&self) -> Result<Vec<Tester>, StoreError>;

    /// Deletes a tester and every suite bound to it.
    fn delete_tester(&self, id: TesterId) -> Result<(), StoreError>;

    // --- Suites ---

    /// Creates or updates a suite by (name, project).
    fn upsert_suite(&self, suite: NewSuite) -> Result<Suite, StoreError>;

    fn get_suite(&self, id: SuiteId) -> Result<Option<Suite>, StoreError>;

    fn find_suite_by_name(
        &self,
        name: &str,
        project: ProjectId,
    ) -> Result<Option<Suite>, StoreError>;

    fn list_suites(&self, project: Option<ProjectId>) -> Result<Vec<Suite>, StoreError>;

    fn delete_suite(&self, id: SuiteId) -> Result<(), StoreError>;

    // --- Tests ---

    /// Creates or updates a test by (name, suite), using the fingerprint to
    /// tell whether its contents changed.
    fn upsert_test(&self, test: NewTest) -> Result<(Test, TestUpsert), StoreError>;

    fn get_test(&self, id: TestId) -> Result<Option<Test>, StoreError>;

    fn find_test_by_name(&self, name: &str, suite: SuiteId) -> Result<Option<Test>, StoreError>;

    fn list_tests(&self, filter: &TestFilter) -> Result<Vec<Test>, StoreError>;

    /// Moves a test to `to` if its current state is one of `from`
    /// (any state when `from` is empty). Returns whether the write happened.
    fn transition_state(
        &self,
        id: TestId,
        from: &[TestState],
        to: TestState,
    ) -> Result<bool, StoreError>;

    /// Sets the enabled flag. Disabling also removes the queue entry.
    fn set_test_enabled(&self, id: TestId, enabled: bool) -> Result<Option<Test>, StoreError>;

    /// Removes the queue entry and puts the test back to idle.
    fn reset_test(&self, id: TestId) -> Result<bool, StoreError>;

    /// Points the test at its newest run and stores the resulting state.
    /// Returns false when the test no longer exists.
    fn finish_test(&self, id: TestId, run: RunId, state: TestState) -> Result<bool, StoreError>;

    fn delete_test(&self, id: TestId) -> Result<(), StoreError>;

    // --- Queue ---

    /// Applies the admission rule and, when admitted, upserts the single
    /// queue entry for the test and writes the queued state.
    fn enqueue_test(&self, id: TestId, force: bool) -> Result<Admission, StoreError>;

    /// Creates the queue entry for a test if there is none.
    fn upsert_queue_entry(&self, test: TestId) -> Result<QueueEntry, StoreError>;

    fn find_queue_entry(&self, test: TestId) -> Result<Option<QueueEntry>, StoreError>;

    /// Returns true if an entry was removed.
    fn delete_queue_entry(&self, test: TestId) -> Result<bool, StoreError>;

    /// Queue entries in admission order.
    fn list_queue(&self) -> Result<Vec<QueueEntry>, StoreError>;

    /// Oldest-admitted test that is enabled and not running.
    fn next_queued(&self) -> Result<Option<Test>, StoreError>;

    /// Same selection as [`Store::next_queued`], marking the test running
    /// before any other caller can select it.
    fn claim_next_queued(&self) -> Result<Option<Test>, StoreError>;

    // --- Runs ---

    fn insert_run(&self, run: NewRun) -> Result<Run, StoreError>;

    fn get_run(&self, id: RunId) -> Result<Option<Run>, StoreError>;

    /// The most recently created run of a test.
    fn latest_run(&self, test: TestId) -> Result<Option<Run>, StoreError>;

    fn mark_run_notified(&self, id: RunId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Deletes every run and clears the tests' last-run pointers.
    fn clear_runs(&self) -> Result<usize, StoreError>;

    /// Resolves a test together with its suite, project and tester.
    fn test_context(&self, id: TestId) -> Result<Option<TestContext>, StoreError> {
        let Some(test) = self.get_test(id)? else {
            return Ok(None);
        };
        let Some(suite) = self.get_suite(test.suite_id)? else {
            return Ok(None);
        };
        let Some(project) = self.get_project(suite.project_id)? else {
            return Ok(None);
        };
        let Some(tester) = self.get_tester(suite.tester_id)? else {
            return Ok(None);
        };

        Ok(Some(TestContext {
            test,
            suite,
            project,
            tester,
        }))
    }
}
