//! Mirrors configured testers, projects and suites into the store.

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::message::Message;
use crate::model::{NewProject, NewSuite, NewTester};
use crate::store::{Store, StoreError};

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub testers: usize,
    pub projects: usize,
    pub suites: usize,
    pub removed: usize,
    pub messages: Vec<Message>,
}

/// Creates or updates every configured entity by name and deletes the ones
/// no longer configured. Suites naming an unknown tester are skipped with
/// an error message.
pub fn reconcile<S: Store + ?Sized>(
    store: &S,
    config: &Config,
) -> Result<ReconcileReport, StoreError> {
    let mut report = ReconcileReport::default();

    for (name, profile) in &config.testers {
        store.upsert_tester(NewTester {
            name: name.clone(),
            profile: profile.clone(),
        })?;
        report.testers += 1;
    }
    for tester in store.list_testers()? {
        if !config.testers.contains_key(&tester.name) {
            debug!(tester = %tester.name, "removing unconfigured tester");
            store.delete_tester(tester.id)?;
            report.removed += 1;
        }
    }

    for (name, project_config) in &config.projects {
        let project = store.upsert_project(NewProject {
            name: name.clone(),
            path: project_config.path.clone(),
            tests_path: project_config.tests_path.clone(),
            depends: project_config.depends.clone(),
            exclusions: project_config.exclusions.clone(),
        })?;
        report.projects += 1;

        for (suite_name, suite_config) in &project_config.suites {
            let Some(tester) = store.find_tester_by_name(&suite_config.tester)? else {
                warn!(suite = %suite_name, tester = %suite_config.tester, "unknown tester");
                report
                    .messages
                    .push(Message::error(format!("Tester {} not found.", suite_config.tester)));
                continue;
            };

            store.upsert_suite(NewSuite {
                name: suite_name.clone(),
                project_id: project.id,
                tester_id: tester.id,
                settings: suite_config.settings.clone(),
            })?;
            report.suites += 1;
        }

        for suite in store.list_suites(Some(project.id))? {
            if !project_config.suites.contains_key(&suite.name) {
                debug!(project = %name, suite = %suite.name, "removing unconfigured suite");
                store.delete_suite(suite.id)?;
                report.removed += 1;
            }
        }
    }

    for project in store.list_projects()? {
        if !config.projects.contains_key(&project.name) {
            debug!(project = %project.name, "removing unconfigured project");
            store.delete_project(project.id)?;
            report.removed += 1;
        }
    }

    info!(
        testers = report.testers,
        projects = report.projects,
        suites = report.suites,
        removed = report.removed,
        "reconciled configuration"
    );
    Ok(report)
}
