//! Admission to, selection from and removal from the run queue.
//!
//! The admission rule itself is a pure function ([`admission`]); the store
//! evaluates it and applies the result under one lock so that concurrent
//! admissions of the same test leave exactly one queue entry.

use std::sync::Arc;
use tracing::{debug, info};

use crate::model::{Project, ProjectId, SuiteId, Test, TestFilter, TestId};
use crate::state::TestState;
use crate::store::{Store, StoreError};

/// Result of asking to admit a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// An entry exists for the test and it is waiting to run
    Queued,
    /// Already queued and not forced
    AlreadyEnqueued,
    /// The test or its project is disabled
    Disabled,
    /// No such test
    Missing,
}

/// Decides whether a test may be admitted.
pub fn admission(test: &Test, project_enabled: bool, has_entry: bool, force: bool) -> Admission {
    if !test.enabled || !project_enabled {
        return Admission::Disabled;
    }
    if !force && is_enqueued(test, has_entry) {
        return Admission::AlreadyEnqueued;
    }
    Admission::Queued
}

/// A test is enqueued only when its state says so and an entry exists.
pub fn is_enqueued(test: &Test, has_entry: bool) -> bool {
    test.state == TestState::Queued && has_entry
}

/// Whether a queued test may be handed to an executor.
pub fn is_selectable(test: &Test) -> bool {
    test.enabled && test.state != TestState::Running
}

/// Queue operations over a shared store.
pub struct QueueManager<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for QueueManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> QueueManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Admits a test. `force` re-queues a test that is already queued or running.
    pub fn admit(&self, test: TestId, force: bool) -> Result<Admission, StoreError> {
        let admission = self.store.enqueue_test(test, force)?;
        debug!(test = %test, force, ?admission, "admission");
        Ok(admission)
    }

    /// Oldest-admitted enabled test that is not running.
    pub fn select_next(&self) -> Result<Option<Test>, StoreError> {
        self.store.next_queued()
    }

    /// Selects the next test and marks it running in one step.
    pub fn claim_next(&self) -> Result<Option<Test>, StoreError> {
        let claimed = self.store.claim_next_queued()?;
        if let Some(test) = &claimed {
            info!(test = %test.id, name = %test.name, "claimed test");
        }
        Ok(claimed)
    }

    /// Marks a queued test as running. Returns false if it was not queued.
    pub fn mark_running(&self, test: TestId) -> Result<bool, StoreError> {
        self.store
            .transition_state(test, &[TestState::Queued], TestState::Running)
    }

    /// Deletes the queue entry for a test. Idempotent.
    pub fn remove(&self, test: TestId) -> Result<(), StoreError> {
        self.store.delete_queue_entry(test)?;
        Ok(())
    }

    pub fn is_enqueued(&self, test: TestId) -> Result<bool, StoreError> {
        let Some(found) = self.store.get_test(test)? else {
            return Ok(false);
        };
        let has_entry = self.store.find_queue_entry(test)?.is_some();
        Ok(is_enqueued(&found, has_entry))
    }

    /// Back to idle with no queue entry. Run history is untouched.
    pub fn reset(&self, test: TestId) -> Result<bool, StoreError> {
        self.store.reset_test(test)
    }

    /// Admits every test.
    pub fn queue_all(&self) -> Result<usize, StoreError> {
        info!("adding every test to the queue");
        self.admit_all(&TestFilter::all(), false)
    }

    /// Admits every test of a suite.
    pub fn queue_suite(&self, suite: SuiteId) -> Result<usize, StoreError> {
        self.admit_all(&TestFilter::suite(suite), false)
    }

    /// Admits a single test on request, enabling it first. `force` requeues
    /// a test that is already running.
    pub fn run_test(&self, test: TestId, force: bool) -> Result<Admission, StoreError> {
        if self.store.set_test_enabled(test, true)?.is_none() {
            return Ok(Admission::Missing);
        }
        self.admit(test, force)
    }

    /// Enables every test (of a project, or everywhere) and forces it into
    /// the queue.
    pub fn run_all(&self, project: Option<ProjectId>) -> Result<usize, StoreError> {
        let mut admitted = 0;
        for test in self.store.list_tests(&TestFilter::project(project))? {
            self.store.set_test_enabled(test.id, true)?;
            if self.admit(test.id, true)? == Admission::Queued {
                admitted += 1;
            }
        }
        Ok(admitted)
    }

    pub fn reset_all(&self, project: Option<ProjectId>) -> Result<usize, StoreError> {
        let mut count = 0;
        for test in self.store.list_tests(&TestFilter::project(project))? {
            if self.reset(test.id)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Enables or disables tests selected by project and/or id.
    ///
    /// Disabling removes the queue entry. Enabling admits the test unless
    /// its last run passed.
    pub fn enable_tests(
        &self,
        enable: bool,
        project: Option<ProjectId>,
        test: Option<TestId>,
    ) -> Result<Vec<Test>, StoreError> {
        let filter = TestFilter::project(project).with_test(test);
        let mut updated = Vec::new();

        for found in self.store.list_tests(&filter)? {
            let Some(found) = self.store.set_test_enabled(found.id, enable)? else {
                continue;
            };
            if enable && found.state != TestState::Ok {
                self.admit(found.id, false)?;
            }
            updated.push(found);
        }

        Ok(updated)
    }

    /// Enables or disables one project, or every project when `project` is `None`.
    pub fn enable_projects(
        &self,
        enable: bool,
        project: Option<ProjectId>,
    ) -> Result<Vec<Project>, StoreError> {
        let mut updated = Vec::new();
        for mut found in self.store.list_projects()? {
            if project.is_some_and(|id| id != found.id) {
                continue;
            }
            self.store.set_project_enabled(found.id, enable)?;
            found.enabled = enable;
            updated.push(found);
        }
        Ok(updated)
    }

    fn admit_all(&self, filter: &TestFilter, force: bool) -> Result<usize, StoreError> {
        let mut admitted = 0;
        for test in self.store.list_tests(filter)? {
            if self.admit(test.id, force)? == Admission::Queued {
                admitted += 1;
            }
        }
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewProject, NewSuite, NewTest, NewTester, SuiteSettings};
    use crate::store::MemoryStore;
    use std::path::PathBuf;

    struct Fixture {
        store: Arc<MemoryStore>,
        queue: QueueManager<MemoryStore>,
        project: ProjectId,
        suite: SuiteId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let project = store
            .upsert_project(NewProject {
                name: "app".to_string(),
                path: PathBuf::from("/srv/app"),
                tests_path: PathBuf::from("tests"),
                ..NewProject::default()
            })
            .unwrap();
        let tester = store
            .upsert_tester(NewTester {
                name: "phpunit".to_string(),
                ..NewTester::default()
            })
            .unwrap();
        let suite = store
            .upsert_suite(NewSuite {
                name: "unit".to_string(),
                project_id: project.id,
                tester_id: tester.id,
                settings: SuiteSettings::default(),
            })
            .unwrap();

        Fixture {
            queue: QueueManager::new(Arc::clone(&store)),
            store,
            project: project.id,
            suite: suite.id,
        }
    }

    fn add_test(f: &Fixture, name: &str) -> TestId {
        let (test, _) = f
            .store
            .upsert_test(NewTest {
                fingerprint: format!("sha-{}", name),
                path: PathBuf::from("/srv/app/tests"),
                name: name.to_string(),
                suite_id: f.suite,
            })
            .unwrap();
        test.id
    }

    fn state(f: &Fixture, id: TestId) -> TestState {
        f.store.get_test(id).unwrap().unwrap().state
    }

    #[test]
    fn test_admit_queues_once() {
        let f = fixture();
        let id = add_test(&f, "ATest.php");

        assert_eq!(f.queue.admit(id, false).unwrap(), Admission::Queued);
        assert_eq!(f.queue.admit(id, false).unwrap(), Admission::AlreadyEnqueued);
        assert_eq!(f.store.list_queue().unwrap().len(), 1);
        assert!(f.queue.is_enqueued(id).unwrap());
    }

    #[test]
    fn test_disabled_project_never_admits() {
        let f = fixture();
        let id = add_test(&f, "ATest.php");
        f.store.set_project_enabled(f.project, false).unwrap();

        assert_eq!(f.queue.admit(id, true).unwrap(), Admission::Disabled);
        assert!(f.store.list_queue().unwrap().is_empty());
        assert_eq!(state(&f, id), TestState::Idle);
    }

    #[test]
    fn test_missing_test() {
        let f = fixture();
        assert_eq!(f.queue.admit(TestId(999), false).unwrap(), Admission::Missing);
        assert!(!f.queue.is_enqueued(TestId(999)).unwrap());
    }

    #[test]
    fn test_select_is_fifo_and_skips_running() {
        let f = fixture();
        let a = add_test(&f, "ATest.php");
        let b = add_test(&f, "BTest.php");
        f.queue.admit(a, false).unwrap();
        f.queue.admit(b, false).unwrap();

        assert_eq!(f.queue.select_next().unwrap().unwrap().id, a);
        assert!(f.queue.mark_running(a).unwrap());
        assert_eq!(f.queue.select_next().unwrap().unwrap().id, b);
    }

    #[test]
    fn test_claim_marks_running() {
        let f = fixture();
        let a = add_test(&f, "ATest.php");
        f.queue.admit(a, false).unwrap();

        let claimed = f.queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, a);
        assert_eq!(claimed.state, TestState::Running);
        assert!(f.queue.claim_next().unwrap().is_none());
    }

    #[test]
    fn test_force_requeues_running_test() {
        let f = fixture();
        let a = add_test(&f, "ATest.php");
        f.queue.admit(a, false).unwrap();
        f.queue.claim_next().unwrap();

        assert_eq!(f.queue.admit(a, false).unwrap(), Admission::Queued);
        assert_eq!(state(&f, a), TestState::Running);

        assert_eq!(f.queue.admit(a, true).unwrap(), Admission::Queued);
        assert_eq!(state(&f, a), TestState::Queued);
        assert_eq!(f.store.list_queue().unwrap().len(), 1);
    }

    #[test]
    fn test_run_test_enables_and_forces() {
        let f = fixture();
        let a = add_test(&f, "ATest.php");
        f.store.set_test_enabled(a, false).unwrap();

        assert_eq!(f.queue.run_test(a, false).unwrap(), Admission::Queued);
        assert!(f.store.get_test(a).unwrap().unwrap().enabled);
        assert_eq!(f.queue.run_test(a, false).unwrap(), Admission::AlreadyEnqueued);

        f.queue.claim_next().unwrap();
        assert_eq!(f.queue.run_test(a, true).unwrap(), Admission::Queued);
        assert_eq!(state(&f, a), TestState::Queued);
        assert_eq!(f.queue.run_test(TestId(999), true).unwrap(), Admission::Missing);
    }

    #[test]
    fn test_mark_running_requires_queued() {
        let f = fixture();
        let a = add_test(&f, "ATest.php");
        assert!(!f.queue.mark_running(a).unwrap());
        assert_eq!(state(&f, a), TestState::Idle);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let f = fixture();
        let a = add_test(&f, "ATest.php");
        f.queue.admit(a, false).unwrap();
        f.queue.remove(a).unwrap();
        f.queue.remove(a).unwrap();
        assert!(!f.queue.is_enqueued(a).unwrap());
    }

    #[test]
    fn test_enable_tests_skips_passing() {
        let f = fixture();
        let a = add_test(&f, "ATest.php");
        let b = add_test(&f, "BTest.php");
        f.store.transition_state(b, &[], TestState::Ok).unwrap();

        f.queue.enable_tests(false, Some(f.project), None).unwrap();
        let updated = f.queue.enable_tests(true, Some(f.project), None).unwrap();

        assert_eq!(updated.len(), 2);
        assert!(f.queue.is_enqueued(a).unwrap());
        assert!(!f.queue.is_enqueued(b).unwrap());
    }

    #[test]
    fn test_run_all_enables_and_forces() {
        let f = fixture();
        let a = add_test(&f, "ATest.php");
        let b = add_test(&f, "BTest.php");
        f.store.set_test_enabled(a, false).unwrap();
        f.store.transition_state(b, &[], TestState::Running).unwrap();

        assert_eq!(f.queue.run_all(None).unwrap(), 2);
        assert_eq!(state(&f, a), TestState::Queued);
        assert_eq!(state(&f, b), TestState::Queued);
    }

    #[test]
    fn test_reset_all() {
        let f = fixture();
        let a = add_test(&f, "ATest.php");
        f.queue.queue_suite(f.suite).unwrap();

        assert_eq!(f.queue.reset_all(Some(f.project)).unwrap(), 1);
        assert_eq!(state(&f, a), TestState::Idle);
        assert!(f.store.list_queue().unwrap().is_empty());
    }

    #[test]
    fn test_enable_projects() {
        let f = fixture();
        let updated = f.queue.enable_projects(false, None).unwrap();
        assert_eq!(updated.len(), 1);
        assert!(!f.store.get_project(f.project).unwrap().unwrap().enabled);
    }
}
