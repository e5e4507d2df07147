//! Reconciles stored tests with the files on disk.
//!
//! One pass per suite:
//!
//! 1. The suite's tests directory must exist, otherwise the pass fails.
//! 2. Every file under it (restricted by the suite's file mask) is visited.
//! 3. Excluded or non-testable files lose their stored test, if any.
//! 4. Testable files are fingerprinted and upserted. A file whose contents
//!    changed since the previous pass is admitted to the queue; a file seen
//!    for the first time is not.
//! 5. Stored tests whose file is gone are deleted.

mod testable;
mod walker;

pub use testable::{AbstractClassPredicate, NeverSkip, SkipPredicate};
pub use walker::{fingerprint, relative_name, walk_files, FileMask};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::exclusion::{is_excluded, Candidate};
use crate::message::Message;
use crate::model::{NewTest, Project, Suite, SuiteId, Test, TestFilter, TestUpsert};
use crate::queue::{Admission, QueueManager};
use crate::store::{Store, StoreError};

/// Errors that abort a synchronization pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Tests directory not found for suite {suite}: {}", path.display())]
    MissingTestsDirectory { suite: String, path: PathBuf },

    #[error("Suite not found: {0}")]
    SuiteNotFound(SuiteId),

    #[error("Invalid file mask {mask:?}: {source}")]
    InvalidFileMask {
        mask: String,
        #[source]
        source: globset::Error,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Counts and notes from one or more synchronization passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub admitted: usize,
    pub messages: Vec<Message>,
}

impl SyncReport {
    /// True when the pass changed nothing.
    pub fn is_unchanged(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0 && self.admitted == 0
    }

    pub fn merge(&mut self, other: SyncReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.admitted += other.admitted;
        self.messages.extend(other.messages);
    }
}

/// Keeps stored tests in line with the filesystem.
pub struct TestSynchronizer<S: Store> {
    store: Arc<S>,
    queue: QueueManager<S>,
    skip: Arc<dyn SkipPredicate>,
    suite_locks: Mutex<HashMap<SuiteId, Arc<Mutex<()>>>>,
}

impl<S: Store> TestSynchronizer<S> {
    /// Creates a synchronizer that skips abstract classes.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_predicate(store, Arc::new(AbstractClassPredicate::default()))
    }

    pub fn with_predicate(store: Arc<S>, skip: Arc<dyn SkipPredicate>) -> Self {
        Self {
            queue: QueueManager::new(Arc::clone(&store)),
            store,
            skip,
            suite_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Synchronizes every suite. Stops at the first failing suite.
    pub fn sync_all(&self, exclusions: &[PathBuf]) -> Result<SyncReport, SyncError> {
        let suites = self.store.list_suites(None)?;
        self.suite_locks
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .retain(|id, _| suites.iter().any(|s| s.id == *id));

        let mut report = SyncReport::default();
        for suite in suites {
            report.merge(self.sync_suite(suite.id, exclusions)?);
        }
        Ok(report)
    }

    /// Synchronizes one suite. Passes over the same suite never overlap.
    #[instrument(skip(self, exclusions))]
    pub fn sync_suite(
        &self,
        suite_id: SuiteId,
        exclusions: &[PathBuf],
    ) -> Result<SyncReport, SyncError> {
        let lock = self.suite_lock(suite_id)?;
        let _guard = lock.lock().map_err(|_| StoreError::Poisoned)?;

        let Some(suite) = self.store.get_suite(suite_id)? else {
            self.suite_locks
                .lock()
                .map_err(|_| StoreError::Poisoned)?
                .remove(&suite_id);
            return Err(SyncError::SuiteNotFound(suite_id));
        };
        let project = self
            .store
            .get_project(suite.project_id)?
            .ok_or_else(|| StoreError::not_found("project", suite.project_id.0))?;

        let dir = suite.tests_dir(&project);
        if !dir.is_dir() {
            return Err(SyncError::MissingTestsDirectory {
                suite: suite.name.clone(),
                path: dir,
            });
        }

        let mask = suite
            .settings
            .file_mask
            .as_deref()
            .map(FileMask::new)
            .transpose()?;
        let exclusions = project_exclusions(&project, exclusions);

        let mut report = SyncReport::default();
        for file in walk_files(&dir, mask.as_ref()) {
            self.sync_file(&suite, &dir, &file, &exclusions, &mut report)?;
        }

        for test in self.store.list_tests(&TestFilter::suite(suite.id))? {
            if !test.full_path().exists() {
                debug!(test = %test.id, name = %test.name, "file gone, deleting test");
                self.store.delete_test(test.id)?;
                report.deleted += 1;
            }
        }

        info!(
            suite = %suite.name,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            admitted = report.admitted,
            "synchronized suite"
        );
        Ok(report)
    }

    fn sync_file(
        &self,
        suite: &Suite,
        dir: &Path,
        file: &Path,
        exclusions: &[PathBuf],
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let name = relative_name(dir, file);

        let testable = if is_excluded(exclusions, dir, Candidate::Path(file)) {
            None
        } else {
            match fs::read(file) {
                Ok(contents) if !self.skip.should_skip(file, &contents) => Some(contents),
                Ok(_) => None,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "cannot read test file");
                    report
                        .messages
                        .push(Message::warning(format!("cannot read {}: {}", file.display(), e)));
                    return Ok(());
                }
            }
        };

        let Some(contents) = testable else {
            if let Some(existing) = self.store.find_test_by_name(&name, suite.id)? {
                debug!(test = %existing.id, %name, "no longer a test, deleting");
                self.store.delete_test(existing.id)?;
                report.deleted += 1;
            }
            return Ok(());
        };

        let (test, outcome) = self.store.upsert_test(NewTest {
            fingerprint: fingerprint(&contents),
            path: file.parent().unwrap_or(dir).to_path_buf(),
            name,
            suite_id: suite.id,
        })?;

        match outcome {
            TestUpsert::Created => report.created += 1,
            TestUpsert::Unchanged => {}
            TestUpsert::Updated { .. } => {
                report.updated += 1;
                if self.queue.admit(test.id, false)? == Admission::Queued {
                    report.admitted += 1;
                }
            }
        }

        Ok(())
    }

    /// Suites of the projects containing `path`, plus the suites of projects
    /// that depend on those.
    pub fn suites_for_path(&self, path: &Path) -> Result<Vec<Suite>, SyncError> {
        let projects = self.store.list_projects()?;
        let path = path.to_string_lossy();

        let touched: Vec<&Project> = projects
            .iter()
            .filter(|p| {
                let root = p.path.to_string_lossy();
                !root.is_empty() && path.contains(root.as_ref())
            })
            .collect();

        let mut selected: Vec<_> = touched.iter().map(|p| p.id).collect();
        for project in &projects {
            let depends_on_touched = project
                .depends
                .iter()
                .any(|name| touched.iter().any(|t| &t.name == name));
            if depends_on_touched && !selected.contains(&project.id) {
                selected.push(project.id);
            }
        }

        let mut suites = Vec::new();
        for project in selected {
            suites.extend(self.store.list_suites(Some(project))?);
        }
        Ok(suites)
    }

    /// The stored test whose file is `path`.
    pub fn find_test_by_path(&self, path: &Path) -> Result<Option<Test>, SyncError> {
        if !path.exists() {
            return Ok(None);
        }
        Ok(self
            .store
            .list_tests(&TestFilter::all())?
            .into_iter()
            .find(|t| t.full_path() == path))
    }

    fn suite_lock(&self, suite: SuiteId) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self.suite_locks.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(Arc::clone(locks.entry(suite).or_default()))
    }
}

/// Global exclusions plus the project's own, relative ones resolved against
/// the project root.
fn project_exclusions(project: &Project, global: &[PathBuf]) -> Vec<PathBuf> {
    global
        .iter()
        .cloned()
        .chain(project.exclusions.iter().map(|e| project.path.join(e)))
        .collect()
}
