use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use easyport_core::{ProjectModel, ProjectRef};
use easyport_scheduler::{BatchError, BatchOperation, JobMonitor};
use parking_lot::RwLock;
use serde::Serialize;

use crate::{parse_pom, MavenError, PomModel, POM_FILE_NAME, UPDATE_JOB_NAME};

/// What easyport knows about a Maven-enabled project after its last update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MavenProjectFacade {
    pub project: ProjectRef,
    pub pom: PathBuf,
    pub coordinates: Option<String>,
    pub model: PomModel,
}

/// Maven projects that completed at least one update, keyed by project.
#[derive(Debug, Default)]
pub struct MavenProjectRegistry {
    projects: RwLock<BTreeMap<ProjectRef, MavenProjectFacade>>,
}

impl MavenProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project: &ProjectRef) -> Option<MavenProjectFacade> {
        self.projects.read().get(project).cloned()
    }

    pub fn contains(&self, project: &ProjectRef) -> bool {
        self.projects.read().contains_key(project)
    }

    pub fn len(&self) -> usize {
        self.projects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.read().is_empty()
    }

    /// All facades, ordered by project name.
    pub fn projects(&self) -> Vec<MavenProjectFacade> {
        self.projects.read().values().cloned().collect()
    }

    fn insert(&self, facade: MavenProjectFacade) {
        self.projects.write().insert(facade.project.clone(), facade);
    }
}

/// Batch operation refreshing the Maven model of every project in the batch.
///
/// Projects are updated one by one; a broken POM only fails its own project and is reported as
/// part of a [`BatchError::Partial`] once the rest of the batch is done.
pub struct UpdateMavenProjects {
    model: Arc<dyn ProjectModel>,
    registry: Arc<MavenProjectRegistry>,
}

impl UpdateMavenProjects {
    pub fn new(model: Arc<dyn ProjectModel>, registry: Arc<MavenProjectRegistry>) -> Self {
        Self { model, registry }
    }

    fn update_project(&self, project: &ProjectRef) -> Result<MavenProjectFacade, MavenError> {
        let root = self
            .model
            .location(project)
            .ok_or_else(|| MavenError::UnknownProject(project.clone()))?;
        let pom = root.join(POM_FILE_NAME);
        let model = parse_pom(&pom)?;
        Ok(MavenProjectFacade {
            project: project.clone(),
            coordinates: model.coordinates(),
            pom,
            model,
        })
    }
}

impl BatchOperation<ProjectRef> for UpdateMavenProjects {
    fn run_batch(&self, batch: &HashSet<ProjectRef>, monitor: &JobMonitor) -> Result<(), BatchError> {
        let mut projects: Vec<&ProjectRef> = batch.iter().collect();
        projects.sort();

        let progress = monitor
            .progress()
            .begin(UPDATE_JOB_NAME, u32::try_from(projects.len()).ok());
        let mut failures = Vec::new();

        for project in projects {
            if monitor.is_cancelled() {
                failures.push(format!("{project}: cancelled"));
                continue;
            }

            match self.update_project(project) {
                Ok(facade) => {
                    tracing::info!(
                        target = "easyport.maven",
                        project = %project,
                        coordinates = facade.coordinates.as_deref().unwrap_or("<incomplete>"),
                        "updated Maven project"
                    );
                    self.registry.insert(facade);
                }
                Err(err) => {
                    tracing::warn!(
                        target = "easyport.maven",
                        project = %project,
                        error = %err,
                        "failed to update Maven project"
                    );
                    failures.push(format!("{project}: {err}"));
                }
            }
            progress.worked(1, Some(project.to_string()));
        }

        progress.finish(None);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BatchError::Partial { failures })
        }
    }
}
