use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use easyport_config::ImportConfig;
use easyport_core::{ProjectConfigurator, ProjectModel, ProjectRef};
use easyport_maven::{maven_update_worker, MavenProjectConfigurator, MavenProjectRegistry};
use easyport_scheduler::{CoalescingWorker, Executor, Scheduler, SchedulerConfig};
use rayon::prelude::*;
use serde::Serialize;

use crate::{FsProjectModel, ImportError, METADATA_DIR};

/// A directory claimed by a configurator during the tree walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedProject {
    pub name: String,
    pub root: PathBuf,
    pub configurator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedProject {
    pub name: String,
    pub root: PathBuf,
    pub natures: Vec<String>,
    /// Maven coordinates, once the background update has seen the project.
    pub maven: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub batches: u64,
    pub items: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub root: PathBuf,
    pub projects: Vec<ImportedProject>,
    /// Cumulative background update statistics of the session.
    pub maven_updates: BatchSummary,
    /// Whether background configuration finished before the wait timeout.
    pub settled: bool,
    pub elapsed_ms: u64,
}

/// Owns everything one import needs: the executor, the project model, and a single Maven update
/// worker shared by all configurations of the session.
pub struct ImportSession {
    scheduler: Arc<Scheduler>,
    model: Arc<FsProjectModel>,
    registry: Arc<MavenProjectRegistry>,
    maven_worker: Arc<CoalescingWorker<ProjectRef>>,
    configurators: Vec<Arc<dyn ProjectConfigurator>>,
    wait_timeout: Duration,
}

impl ImportSession {
    pub fn new(config: &ImportConfig) -> Self {
        let scheduler = Arc::new(Scheduler::new(SchedulerConfig {
            background_threads: config.background_threads,
            ..SchedulerConfig::default()
        }));
        let model = Arc::new(FsProjectModel::new());
        let registry = Arc::new(MavenProjectRegistry::new());
        let maven_worker = maven_update_worker(
            model.clone(),
            registry.clone(),
            scheduler.clone() as Arc<dyn Executor>,
            config.batch_timeout(),
        );
        let configurators: Vec<Arc<dyn ProjectConfigurator>> = vec![Arc::new(
            MavenProjectConfigurator::new(model.clone(), maven_worker.clone()),
        )];

        Self {
            scheduler,
            model,
            registry,
            maven_worker,
            configurators,
            wait_timeout: config.wait_timeout(),
        }
    }

    pub fn model(&self) -> &Arc<FsProjectModel> {
        &self.model
    }

    pub fn registry(&self) -> &Arc<MavenProjectRegistry> {
        &self.registry
    }

    pub fn maven_worker(&self) -> &Arc<CoalescingWorker<ProjectRef>> {
        &self.maven_worker
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Lists the project roots below `root` and registers them with the model.
    ///
    /// Nothing is configured; project descriptions are left untouched.
    pub fn detect(&self, root: &Path) -> Result<Vec<DetectedProject>, ImportError> {
        let root = canonical_dir(root)?;
        Ok(self
            .open_tree(&root)?
            .into_iter()
            .map(|(detected, _)| detected)
            .collect())
    }

    /// Imports every project below `root` and waits for background configuration to settle.
    pub fn import(&self, root: &Path) -> Result<ImportReport, ImportError> {
        let start = Instant::now();
        let root = canonical_dir(root)?;

        let opened: Vec<ProjectRef> = self
            .open_tree(&root)?
            .into_iter()
            .map(|(_, project)| project)
            .collect();
        tracing::info!(
            target = "easyport.workspace",
            root = %root.display(),
            detected = opened.len(),
            "detected projects"
        );

        opened.par_iter().for_each(|project| {
            for configurator in &self.configurators {
                if configurator.can_configure(project) {
                    configurator.configure(project);
                }
            }
        });

        let settled = self.maven_worker.wait_idle(self.wait_timeout);
        if !settled {
            tracing::warn!(
                target = "easyport.workspace",
                pending = self.maven_worker.pending_len(),
                timeout = ?self.wait_timeout,
                "background configuration still running"
            );
        }

        let mut projects: Vec<ImportedProject> = opened
            .iter()
            .map(|project| self.imported_project(project))
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));

        let stats = self.maven_worker.stats();
        Ok(ImportReport {
            root,
            projects,
            maven_updates: BatchSummary {
                batches: stats.batches,
                items: stats.items,
                failures: stats.failures,
            },
            settled,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn imported_project(&self, project: &ProjectRef) -> ImportedProject {
        let root = self.model.location(project).unwrap_or_default();
        let natures = match self.model.read_description(project) {
            Ok(description) => description.natures,
            Err(err) => {
                tracing::warn!(
                    target = "easyport.workspace",
                    project = %project,
                    error = %err,
                    "failed to read description for report"
                );
                Vec::new()
            }
        };
        ImportedProject {
            name: project.name().to_owned(),
            root,
            natures,
            maven: self
                .registry
                .get(project)
                .and_then(|facade| facade.coordinates),
        }
    }

    /// Walks `root` and opens every directory a configurator claims.
    ///
    /// Directories the claiming configurator asks to ignore are pruned from the rest of the walk,
    /// as is every per-project metadata directory. A project that fails to open is logged and
    /// skipped; the error only surfaces when no project could be opened at all.
    fn open_tree(&self, root: &Path) -> Result<Vec<(DetectedProject, ProjectRef)>, ImportError> {
        let mut opened = Vec::new();
        let mut open_error = None;
        let mut ignored = BTreeSet::new();
        let mut entries = walkdir::WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!(target = "easyport.workspace", error = %err, "skipping entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.path();
            if entry.depth() > 0 && (entry.file_name() == METADATA_DIR || ignored.contains(dir)) {
                entries.skip_current_dir();
                continue;
            }

            let Some(configurator) = self
                .configurators
                .iter()
                .find(|configurator| configurator.should_be_project(dir))
            else {
                continue;
            };

            match self.model.open_project(dir) {
                Ok(project) => {
                    ignored.extend(configurator.directories_to_ignore(&project));
                    opened.push((
                        DetectedProject {
                            name: project.name().to_owned(),
                            root: dir.to_path_buf(),
                            configurator: configurator.id().to_owned(),
                        },
                        project,
                    ));
                }
                Err(err) => {
                    tracing::error!(
                        target = "easyport.workspace",
                        root = %dir.display(),
                        error = %err,
                        "failed to open project"
                    );
                    open_error.get_or_insert(err);
                }
            }
        }

        match open_error {
            Some(err) if opened.is_empty() => Err(err.into()),
            _ => Ok(opened),
        }
    }
}

impl Drop for ImportSession {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

fn canonical_dir(root: &Path) -> Result<PathBuf, ImportError> {
    let root = std::fs::canonicalize(root).map_err(|source| ImportError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    if !root.is_dir() {
        return Err(ImportError::NotADirectory(root));
    }
    Ok(root)
}
