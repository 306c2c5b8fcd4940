use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use easyport_core::{ProjectDescription, ProjectModel, ProjectModelError, ProjectRef};
use parking_lot::RwLock;

/// Per-project metadata directory, created inside each project root.
pub const METADATA_DIR: &str = ".easyport";

pub const DESCRIPTION_FILE: &str = "project.json";

/// A [`ProjectModel`] that keeps each project's description as JSON inside the project.
#[derive(Debug, Default)]
pub struct FsProjectModel {
    roots: RwLock<BTreeMap<ProjectRef, PathBuf>>,
}

impl FsProjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description_path(root: &Path) -> PathBuf {
        root.join(METADATA_DIR).join(DESCRIPTION_FILE)
    }

    /// Registers the project rooted at `root`.
    ///
    /// Reopening a known root returns its existing ref. New projects are named after an existing
    /// description, or else the directory; clashes with other roots get a `-2`, `-3`, ...
    /// suffix.
    pub fn open_project(&self, root: &Path) -> Result<ProjectRef, ProjectModelError> {
        if let Some(project) = self.known_project(root) {
            return Ok(project);
        }

        // Disk I/O happens before the write lock; the lookups below are repeated under it.
        let dir_name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_owned());
        let existing =
            read_description_file(&Self::description_path(root), &ProjectRef::new(&dir_name))?;
        let preferred = match existing {
            Some(description) if !description.name.trim().is_empty() => description.name,
            _ => dir_name,
        };

        let mut roots = self.roots.write();
        if let Some((project, _)) = roots.iter().find(|(_, known)| known.as_path() == root) {
            return Ok(project.clone());
        }

        let mut name = preferred.clone();
        let mut suffix = 2;
        while roots.contains_key(&ProjectRef::new(&name)) {
            name = format!("{preferred}-{suffix}");
            suffix += 1;
        }

        let project = ProjectRef::new(&name);
        roots.insert(project.clone(), root.to_path_buf());
        tracing::debug!(
            target = "easyport.workspace",
            project = %project,
            root = %root.display(),
            "opened project"
        );
        Ok(project)
    }

    /// All open projects with their roots, ordered by name.
    pub fn projects(&self) -> Vec<(ProjectRef, PathBuf)> {
        self.roots
            .read()
            .iter()
            .map(|(project, root)| (project.clone(), root.clone()))
            .collect()
    }

    fn known_project(&self, root: &Path) -> Option<ProjectRef> {
        self.roots
            .read()
            .iter()
            .find(|(_, known)| known.as_path() == root)
            .map(|(project, _)| project.clone())
    }

    fn root(&self, project: &ProjectRef) -> Result<PathBuf, ProjectModelError> {
        self.location(project)
            .ok_or_else(|| ProjectModelError::UnknownProject(project.clone()))
    }
}

impl ProjectModel for FsProjectModel {
    fn location(&self, project: &ProjectRef) -> Option<PathBuf> {
        self.roots.read().get(project).cloned()
    }

    fn read_description(
        &self,
        project: &ProjectRef,
    ) -> Result<ProjectDescription, ProjectModelError> {
        let path = Self::description_path(&self.root(project)?);
        let description = read_description_file(&path, project)?;
        Ok(description.unwrap_or_else(|| ProjectDescription::new(project.name())))
    }

    fn write_description(
        &self,
        project: &ProjectRef,
        description: &ProjectDescription,
    ) -> Result<(), ProjectModelError> {
        let path = Self::description_path(&self.root(project)?);
        let io_err = |path: &Path, source| ProjectModelError::Io {
            project: project.clone(),
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
        }
        let json = serde_json::to_string_pretty(description).map_err(|err| {
            ProjectModelError::Malformed {
                project: project.clone(),
                message: err.to_string(),
            }
        })?;

        // Write-then-rename so readers never observe a truncated description.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| io_err(&tmp, source))?;
        std::fs::rename(&tmp, &path).map_err(|source| io_err(&path, source))
    }
}

/// `Ok(None)` if the project has no description yet.
fn read_description_file(
    path: &Path,
    project: &ProjectRef,
) -> Result<Option<ProjectDescription>, ProjectModelError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ProjectModelError::Io {
                project: project.clone(),
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|err| ProjectModelError::Malformed {
            project: project.clone(),
            message: format!("{}: {err}", path.display()),
        })
}
