//! Table-backed store shared by the in-memory and file backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::error::StoreError;
use super::Store;
use crate::model::{
    NewProject, NewRun, NewSuite, NewTest, NewTester, Project, ProjectId, QueueEntry,
    QueueEntryId, Run, RunId, Suite, SuiteId, Test, TestFilter, TestId, TestUpsert, Tester,
    TesterId,
};
use crate::queue::{self, Admission};
use crate::state::TestState;

/// All entities, keyed by id. Ids come from one monotonic counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    next_id: u64,
    projects: BTreeMap<ProjectId, Project>,
    testers: BTreeMap<TesterId, Tester>,
    suites: BTreeMap<SuiteId, Suite>,
    tests: BTreeMap<TestId, Test>,
    runs: BTreeMap<RunId, Run>,
    queue: BTreeMap<QueueEntryId, QueueEntry>,
    /// Set when a save failed: memory is ahead of disk until the next
    /// successful save.
    #[serde(skip)]
    unsaved: bool,
}

impl Tables {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn queue_entry_for(&self, test: TestId) -> Option<&QueueEntry> {
        self.queue.values().find(|e| e.test_id == test)
    }

    fn remove_queue_entry(&mut self, test: TestId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|_, e| e.test_id != test);
        before != self.queue.len()
    }

    fn project_of(&self, test: &Test) -> Option<&Project> {
        self.suites
            .get(&test.suite_id)
            .and_then(|s| self.projects.get(&s.project_id))
    }

    fn remove_test(&mut self, id: TestId) -> bool {
        let removed = self.tests.remove(&id).is_some();
        self.remove_queue_entry(id) | removed
    }

    fn remove_suite(&mut self, id: SuiteId) -> bool {
        let mut removed = self.suites.remove(&id).is_some();
        let tests: Vec<TestId> = self
            .tests
            .values()
            .filter(|t| t.suite_id == id)
            .map(|t| t.id)
            .collect();
        for test in tests {
            removed |= self.remove_test(test);
        }
        removed
    }

    fn remove_suites_where(&mut self, f: impl Fn(&Suite) -> bool) -> bool {
        let suites: Vec<SuiteId> = self.suites.values().filter(|s| f(s)).map(|s| s.id).collect();
        let mut removed = false;
        for suite in suites {
            removed |= self.remove_suite(suite);
        }
        removed
    }

    /// Queue entries ordered by admission time, ties broken by entry id.
    fn ordered_queue(&self) -> Vec<&QueueEntry> {
        let mut entries: Vec<&QueueEntry> = self.queue.values().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        entries
    }

    fn next_selectable(&self) -> Option<TestId> {
        self.ordered_queue()
            .into_iter()
            .filter_map(|e| self.tests.get(&e.test_id))
            .find(|t| queue::is_selectable(t))
            .map(|t| t.id)
    }

    fn matches(&self, test: &Test, filter: &TestFilter) -> bool {
        if filter.test.is_some_and(|id| id != test.id) {
            return false;
        }
        if filter.suite.is_some_and(|id| id != test.suite_id) {
            return false;
        }
        if let Some(project) = filter.project {
            return self
                .suites
                .get(&test.suite_id)
                .is_some_and(|s| s.project_id == project);
        }
        true
    }
}

/// Where a [`TableStore`] writes its tables after each mutation.
///
/// Writes that change nothing are not saved.
pub trait Persistence: Send + Sync {
    fn save(&self, tables: &Tables) -> Result<(), StoreError>;
}

/// A [`Store`] over in-process tables guarded by a single lock.
///
/// Every operation, including the compound queue operations, runs under one
/// lock acquisition, which makes each of them atomic.
pub struct TableStore<P> {
    tables: Mutex<Tables>,
    persistence: P,
}

impl<P: Persistence> TableStore<P> {
    pub fn with_tables(tables: Tables, persistence: P) -> Self {
        Self {
            tables: Mutex::new(tables),
            persistence,
        }
    }

    /// Copy of the current tables.
    pub fn snapshot(&self) -> Result<Tables, StoreError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError> {
        let tables = self.lock()?;
        Ok(f(&tables))
    }

    /// Runs a mutation and saves when it reports a change, or when an
    /// earlier save failed.
    fn write<R>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<(R, bool), StoreError>,
    ) -> Result<R, StoreError> {
        let mut tables = self.lock()?;
        let (out, changed) = f(&mut tables)?;
        if changed || tables.unsaved {
            if let Err(e) = self.persistence.save(&tables) {
                tables.unsaved = true;
                return Err(e);
            }
            tables.unsaved = false;
        }
        Ok(out)
    }
}

fn changed<R>(out: R) -> Result<(R, bool), StoreError> {
    Ok((out, true))
}

fn unchanged<R>(out: R) -> Result<(R, bool), StoreError> {
    Ok((out, false))
}

impl<P: Persistence> Store for TableStore<P> {
    fn upsert_project(&self, project: NewProject) -> Result<Project, StoreError> {
        self.write(|t| {
            if let Some(existing) = t.projects.values_mut().find(|p| p.name == project.name) {
                let same = existing.path == project.path
                    && existing.tests_path == project.tests_path
                    && existing.depends == project.depends
                    && existing.exclusions == project.exclusions;
                existing.path = project.path;
                existing.tests_path = project.tests_path;
                existing.depends = project.depends;
                existing.exclusions = project.exclusions;
                return Ok((existing.clone(), !same));
            }

            let id = ProjectId(t.alloc());
            let created = Project {
                id,
                name: project.name,
                path: project.path,
                tests_path: project.tests_path,
                enabled: true,
                depends: project.depends,
                exclusions: project.exclusions,
            };
            t.projects.insert(id, created.clone());
            changed(created)
        })
    }

    fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        self.read(|t| t.projects.get(&id).cloned())
    }

    fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        self.read(|t| t.projects.values().cloned().collect())
    }

    fn set_project_enabled(&self, id: ProjectId, enabled: bool) -> Result<(), StoreError> {
        self.write(|t| {
            let project = t
                .projects
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("project", id.0))?;
            let differs = project.enabled != enabled;
            project.enabled = enabled;
            Ok(((), differs))
        })
    }

    fn delete_project(&self, id: ProjectId) -> Result<(), StoreError> {
        self.write(|t| {
            let removed = t.projects.remove(&id).is_some();
            let cascaded = t.remove_suites_where(|s| s.project_id == id);
            Ok(((), removed | cascaded))
        })
    }

    fn upsert_tester(&self, tester: NewTester) -> Result<Tester, StoreError> {
        self.write(|t| {
            if let Some(existing) = t.testers.values_mut().find(|x| x.name == tester.name) {
                let differs = existing.profile != tester.profile;
                existing.profile = tester.profile;
                return Ok((existing.clone(), differs));
            }

            let id = TesterId(t.alloc());
            let created = Tester {
                id,
                name: tester.name,
                profile: tester.profile,
            };
            t.testers.insert(id, created.clone());
            changed(created)
        })
    }

    fn get_tester(&self, id: TesterId) -> Result<Option<Tester>, StoreError> {
        self.read(|t| t.testers.get(&id).cloned())
    }

    fn find_tester_by_name(&self, name: &str) -> Result<Option<Tester>, StoreError> {
        self.read(|t| t.testers.values().find(|x| x.name == name).cloned())
    }

    fn list_testers(&self) -> Result<Vec<Tester>, StoreError> {
        self.read(|t| t.testers.values().cloned().collect())
    }

    fn delete_tester(&self, id: TesterId) -> Result<(), StoreError> {
        self.write(|t| {
            let removed = t.testers.remove(&id).is_some();
            let cascaded = t.remove_suites_where(|s| s.tester_id == id);
            Ok(((), removed | cascaded))
        })
    }

    fn upsert_suite(&self, suite: NewSuite) -> Result<Suite, StoreError> {
        self.write(|t| {
            if !t.projects.contains_key(&suite.project_id) {
                return Err(StoreError::not_found("project", suite.project_id.0));
            }

            if let Some(existing) = t
                .suites
                .values_mut()
                .find(|s| s.name == suite.name && s.project_id == suite.project_id)
            {
                let differs =
                    existing.tester_id != suite.tester_id || existing.settings != suite.settings;
                existing.tester_id = suite.tester_id;
                existing.settings = suite.settings;
                return Ok((existing.clone(), differs));
            }

            let id = SuiteId(t.alloc());
            let created = Suite {
                id,
                name: suite.name,
                project_id: suite.project_id,
                tester_id: suite.tester_id,
                settings: suite.settings,
            };
            t.suites.insert(id, created.clone());
            changed(created)
        })
    }

    fn get_suite(&self, id: SuiteId) -> Result<Option<Suite>, StoreError> {
        self.read(|t| t.suites.get(&id).cloned())
    }

    fn find_suite_by_name(
        &self,
        name: &str,
        project: ProjectId,
    ) -> Result<Option<Suite>, StoreError> {
        self.read(|t| {
            t.suites
                .values()
                .find(|s| s.name == name && s.project_id == project)
                .cloned()
        })
    }

    fn list_suites(&self, project: Option<ProjectId>) -> Result<Vec<Suite>, StoreError> {
        self.read(|t| {
            t.suites
                .values()
                .filter(|s| project.map_or(true, |p| s.project_id == p))
                .cloned()
                .collect()
        })
    }

    fn delete_suite(&self, id: SuiteId) -> Result<(), StoreError> {
        self.write(|t| Ok(((), t.remove_suite(id))))
    }

    fn upsert_test(&self, test: NewTest) -> Result<(Test, TestUpsert), StoreError> {
        self.write(|t| {
            if !t.suites.contains_key(&test.suite_id) {
                return Err(StoreError::not_found("suite", test.suite_id.0));
            }

            if let Some(existing) = t
                .tests
                .values_mut()
                .find(|x| x.suite_id == test.suite_id && x.name == test.name)
            {
                if existing.fingerprint == test.fingerprint {
                    let moved = existing.path != test.path;
                    existing.path = test.path;
                    return Ok(((existing.clone(), TestUpsert::Unchanged), moved));
                }

                let previous_fingerprint =
                    std::mem::replace(&mut existing.fingerprint, test.fingerprint);
                existing.path = test.path;
                existing.updated_at = Utc::now();
                return changed((
                    existing.clone(),
                    TestUpsert::Updated {
                        previous_fingerprint,
                    },
                ));
            }

            let id = TestId(t.alloc());
            let now = Utc::now();
            let created = Test {
                id,
                fingerprint: test.fingerprint,
                path: test.path,
                name: test.name,
                suite_id: test.suite_id,
                state: TestState::Idle,
                enabled: true,
                last_run_id: None,
                created_at: now,
                updated_at: now,
            };
            t.tests.insert(id, created.clone());
            changed((created, TestUpsert::Created))
        })
    }

    fn get_test(&self, id: TestId) -> Result<Option<Test>, StoreError> {
        self.read(|t| t.tests.get(&id).cloned())
    }

    fn find_test_by_name(&self, name: &str, suite: SuiteId) -> Result<Option<Test>, StoreError> {
        self.read(|t| {
            t.tests
                .values()
                .find(|x| x.suite_id == suite && x.name == name)
                .cloned()
        })
    }

    fn list_tests(&self, filter: &TestFilter) -> Result<Vec<Test>, StoreError> {
        self.read(|t| {
            t.tests
                .values()
                .filter(|x| t.matches(x, filter))
                .cloned()
                .collect()
        })
    }

    fn transition_state(
        &self,
        id: TestId,
        from: &[TestState],
        to: TestState,
    ) -> Result<bool, StoreError> {
        self.write(|t| {
            let Some(test) = t.tests.get_mut(&id) else {
                return unchanged(false);
            };
            if !from.is_empty() && !from.contains(&test.state) {
                return unchanged(false);
            }
            test.set_state(to);
            changed(true)
        })
    }

    fn set_test_enabled(&self, id: TestId, enabled: bool) -> Result<Option<Test>, StoreError> {
        self.write(|t| {
            let Some(test) = t.tests.get_mut(&id) else {
                return unchanged(None);
            };
            let mut differs = test.enabled != enabled;
            test.enabled = enabled;
            let test = test.clone();
            if !enabled {
                differs |= t.remove_queue_entry(id);
            }
            Ok((Some(test), differs))
        })
    }

    fn reset_test(&self, id: TestId) -> Result<bool, StoreError> {
        self.write(|t| {
            let dequeued = t.remove_queue_entry(id);
            match t.tests.get_mut(&id) {
                Some(test) => {
                    let differs = test.state != TestState::Idle;
                    test.set_state(TestState::Idle);
                    Ok((true, dequeued | differs))
                }
                None => Ok((false, dequeued)),
            }
        })
    }

    fn finish_test(&self, id: TestId, run: RunId, state: TestState) -> Result<bool, StoreError> {
        self.write(|t| {
            let Some(test) = t.tests.get_mut(&id) else {
                return unchanged(false);
            };
            test.last_run_id = Some(run);
            test.set_state(state);
            changed(true)
        })
    }

    fn delete_test(&self, id: TestId) -> Result<(), StoreError> {
        self.write(|t| Ok(((), t.remove_test(id))))
    }

    fn enqueue_test(&self, id: TestId, force: bool) -> Result<Admission, StoreError> {
        self.write(|t| {
            let Some(test) = t.tests.get(&id) else {
                return unchanged(Admission::Missing);
            };
            let project_enabled = t.project_of(test).is_some_and(|p| p.enabled);
            let has_entry = t.queue_entry_for(id).is_some();

            let admission = queue::admission(test, project_enabled, has_entry, force);
            if admission != Admission::Queued {
                return unchanged(admission);
            }

            let mut differs = !has_entry;
            if !has_entry {
                let entry_id = QueueEntryId(t.alloc());
                t.queue.insert(
                    entry_id,
                    QueueEntry {
                        id: entry_id,
                        test_id: id,
                        created_at: Utc::now(),
                    },
                );
            }

            if let Some(test) = t.tests.get_mut(&id) {
                if test.state != TestState::Queued
                    && test.state.can_transition(TestState::Queued, force)
                {
                    test.set_state(TestState::Queued);
                    differs = true;
                }
            }

            Ok((Admission::Queued, differs))
        })
    }

    fn upsert_queue_entry(&self, test: TestId) -> Result<QueueEntry, StoreError> {
        self.write(|t| {
            if let Some(entry) = t.queue_entry_for(test) {
                return unchanged(entry.clone());
            }
            let id = QueueEntryId(t.alloc());
            let entry = QueueEntry {
                id,
                test_id: test,
                created_at: Utc::now(),
            };
            t.queue.insert(id, entry.clone());
            changed(entry)
        })
    }

    fn find_queue_entry(&self, test: TestId) -> Result<Option<QueueEntry>, StoreError> {
        self.read(|t| t.queue_entry_for(test).cloned())
    }

    fn delete_queue_entry(&self, test: TestId) -> Result<bool, StoreError> {
        self.write(|t| {
            let removed = t.remove_queue_entry(test);
            Ok((removed, removed))
        })
    }

    fn list_queue(&self) -> Result<Vec<QueueEntry>, StoreError> {
        self.read(|t| t.ordered_queue().into_iter().cloned().collect())
    }

    fn next_queued(&self) -> Result<Option<Test>, StoreError> {
        self.read(|t| t.next_selectable().and_then(|id| t.tests.get(&id).cloned()))
    }

    fn claim_next_queued(&self) -> Result<Option<Test>, StoreError> {
        self.write(|t| {
            let Some(id) = t.next_selectable() else {
                return unchanged(None);
            };
            let Some(test) = t.tests.get_mut(&id) else {
                return unchanged(None);
            };
            test.set_state(TestState::Running);
            changed(Some(test.clone()))
        })
    }

    fn insert_run(&self, run: NewRun) -> Result<Run, StoreError> {
        self.write(|t| {
            let id = RunId(t.alloc());
            let created = Run {
                id,
                test_id: run.test_id,
                success: run.success,
                log: run.log,
                html: run.html,
                screenshots: run.screenshots,
                started_at: run.started_at,
                ended_at: run.ended_at,
                notified_at: None,
                created_at: Utc::now(),
            };
            t.runs.insert(id, created.clone());
            changed(created)
        })
    }

    fn get_run(&self, id: RunId) -> Result<Option<Run>, StoreError> {
        self.read(|t| t.runs.get(&id).cloned())
    }

    fn latest_run(&self, test: TestId) -> Result<Option<Run>, StoreError> {
        self.read(|t| {
            t.runs
                .values()
                .filter(|r| r.test_id == test)
                .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
                .cloned()
        })
    }

    fn mark_run_notified(&self, id: RunId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.write(|t| {
            let run = t
                .runs
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("run", id.0))?;
            run.notified_at = Some(at);
            changed(())
        })
    }

    fn clear_runs(&self) -> Result<usize, StoreError> {
        self.write(|t| {
            let count = t.runs.len();
            let mut differs = count > 0;
            t.runs.clear();
            for test in t.tests.values_mut() {
                differs |= test.last_run_id.take().is_some();
            }
            Ok((count, differs))
        })
    }
}
