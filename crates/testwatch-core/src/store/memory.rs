use super::error::StoreError;
use super::tables::{Persistence, TableStore, Tables};

/// Keeps tables in memory only.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemory;

impl Persistence for InMemory {
    fn save(&self, _tables: &Tables) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Store that lives for the duration of the process.
pub type MemoryStore = TableStore<InMemory>;

impl MemoryStore {
    pub fn new() -> Self {
        TableStore::with_tables(Tables::default(), InMemory)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewProject, NewSuite, NewTest, NewTester, SuiteSettings, TestFilter};
    use crate::queue::Admission;
    use crate::state::TestState;
    use crate::store::Store;
    use std::path::PathBuf;

    fn seeded() -> (MemoryStore, crate::model::Suite) {
        let store = MemoryStore::new();
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
        (store, suite)
    }

    fn new_test(suite: &crate::model::Suite, name: &str, fingerprint: &str) -> NewTest {
        NewTest {
            fingerprint: fingerprint.to_string(),
            path: PathBuf::from("/srv/app/tests"),
            name: name.to_string(),
            suite_id: suite.id,
        }
    }

    #[test]
    fn test_upsert_project_keeps_id_and_enabled() {
        let store = MemoryStore::new();
        let first = store
            .upsert_project(NewProject {
                name: "app".to_string(),
                ..NewProject::default()
            })
            .unwrap();
        store.set_project_enabled(first.id, false).unwrap();

        let second = store
            .upsert_project(NewProject {
                name: "app".to_string(),
                path: PathBuf::from("/elsewhere"),
                ..NewProject::default()
            })
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(!second.enabled);
        assert_eq!(second.path, PathBuf::from("/elsewhere"));
        assert_eq!(store.list_projects().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_test_outcomes() {
        let (store, suite) = seeded();

        let (created, outcome) = store.upsert_test(new_test(&suite, "ATest.php", "aa")).unwrap();
        assert_eq!(outcome, crate::model::TestUpsert::Created);
        assert_eq!(created.state, TestState::Idle);

        let (_, outcome) = store.upsert_test(new_test(&suite, "ATest.php", "aa")).unwrap();
        assert_eq!(outcome, crate::model::TestUpsert::Unchanged);

        let (updated, outcome) = store.upsert_test(new_test(&suite, "ATest.php", "bb")).unwrap();
        assert_eq!(
            outcome,
            crate::model::TestUpsert::Updated {
                previous_fingerprint: "aa".to_string()
            }
        );
        assert_eq!(updated.id, created.id);
        assert_eq!(store.list_tests(&TestFilter::all()).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_suite_cascades_to_tests_and_queue() {
        let (store, suite) = seeded();
        let (test, _) = store.upsert_test(new_test(&suite, "ATest.php", "aa")).unwrap();
        assert_eq!(store.enqueue_test(test.id, false).unwrap(), Admission::Queued);

        store.delete_suite(suite.id).unwrap();

        assert!(store.get_test(test.id).unwrap().is_none());
        assert!(store.list_queue().unwrap().is_empty());
    }

    #[test]
    fn test_claim_skips_running_and_disabled() {
        let (store, suite) = seeded();
        let (a, _) = store.upsert_test(new_test(&suite, "ATest.php", "aa")).unwrap();
        let (b, _) = store.upsert_test(new_test(&suite, "BTest.php", "bb")).unwrap();
        store.enqueue_test(a.id, false).unwrap();
        store.enqueue_test(b.id, false).unwrap();

        let claimed = store.claim_next_queued().unwrap().unwrap();
        assert_eq!(claimed.id, a.id);
        assert_eq!(claimed.state, TestState::Running);

        let claimed = store.claim_next_queued().unwrap().unwrap();
        assert_eq!(claimed.id, b.id);

        assert!(store.claim_next_queued().unwrap().is_none());
    }

    #[test]
    fn test_clear_runs_resets_last_run() {
        let (store, suite) = seeded();
        let (test, _) = store.upsert_test(new_test(&suite, "ATest.php", "aa")).unwrap();
        let now = chrono::Utc::now();
        let run = store
            .insert_run(crate::model::NewRun {
                test_id: test.id,
                success: true,
                log: "ok".to_string(),
                html: None,
                screenshots: vec![],
                started_at: now,
                ended_at: now,
            })
            .unwrap();
        store.finish_test(test.id, run.id, TestState::Ok).unwrap();

        assert_eq!(store.clear_runs().unwrap(), 1);
        assert!(store.latest_run(test.id).unwrap().is_none());
        assert!(store.get_test(test.id).unwrap().unwrap().last_run_id.is_none());
    }
}
