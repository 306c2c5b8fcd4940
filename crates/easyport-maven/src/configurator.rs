use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use easyport_core::{ProjectConfigurator, ProjectModel, ProjectModelError, ProjectRef};
use easyport_scheduler::{CoalescingWorker, Executor};

use crate::{is_maven_project_root, MavenProjectRegistry, UpdateMavenProjects};

pub const MAVEN_NATURE_ID: &str = "org.eclipse.m2e.core.maven2Nature";

pub const UPDATE_JOB_NAME: &str = "Update Maven projects configuration";

/// Conventional Maven directories that never contain nested projects worth importing.
pub const IGNORED_DIRECTORIES: [&str; 2] = ["src", "target"];

/// Makes the Maven nature the primary nature of `project`.
///
/// Returns `true` if the description had to be written.
pub fn ensure_maven_nature(
    model: &dyn ProjectModel,
    project: &ProjectRef,
) -> Result<bool, ProjectModelError> {
    let mut description = model.read_description(project)?;
    if !description.ensure_nature(MAVEN_NATURE_ID) {
        return Ok(false);
    }
    model.write_description(project, &description)?;
    Ok(true)
}

/// Builds the worker that runs [`UpdateMavenProjects`] for every configured project.
pub fn maven_update_worker(
    model: Arc<dyn ProjectModel>,
    registry: Arc<MavenProjectRegistry>,
    executor: Arc<dyn Executor>,
    batch_timeout: Option<Duration>,
) -> Arc<CoalescingWorker<ProjectRef>> {
    Arc::new(CoalescingWorker::new_with_timeout(
        UPDATE_JOB_NAME,
        UpdateMavenProjects::new(model, registry),
        executor,
        batch_timeout,
    ))
}

/// Configures imported Maven projects.
///
/// The nature is written synchronously; the expensive update is deferred to the shared worker so
/// that a bulk import schedules it once per batch of projects instead of once per project.
pub struct MavenProjectConfigurator {
    model: Arc<dyn ProjectModel>,
    worker: Arc<CoalescingWorker<ProjectRef>>,
}

impl MavenProjectConfigurator {
    pub fn new(model: Arc<dyn ProjectModel>, worker: Arc<CoalescingWorker<ProjectRef>>) -> Self {
        Self { model, worker }
    }

    pub fn worker(&self) -> &Arc<CoalescingWorker<ProjectRef>> {
        &self.worker
    }
}

impl ProjectConfigurator for MavenProjectConfigurator {
    fn id(&self) -> &str {
        "maven"
    }

    fn should_be_project(&self, container: &Path) -> bool {
        is_maven_project_root(container)
    }

    fn can_configure(&self, project: &ProjectRef) -> bool {
        self.model
            .location(project)
            .is_some_and(|root| is_maven_project_root(&root))
    }

    fn configure(&self, project: &ProjectRef) {
        match ensure_maven_nature(self.model.as_ref(), project) {
            Ok(true) => {
                tracing::debug!(target = "easyport.maven", project = %project, "added Maven nature");
            }
            Ok(false) => {}
            Err(err) => {
                // The nature may already be present from an earlier partial run; still request the
                // update below.
                tracing::error!(
                    target = "easyport.maven",
                    project = %project,
                    error = %err,
                    "failed to add Maven nature"
                );
            }
        }

        self.worker.submit(project.clone());
    }

    fn directories_to_ignore(&self, project: &ProjectRef) -> BTreeSet<PathBuf> {
        let root = self.model.location(project).unwrap_or_default();
        IGNORED_DIRECTORIES
            .iter()
            .map(|dir| root.join(dir))
            .collect()
    }
}
