use std::path::PathBuf;

use crate::{ProjectDescription, ProjectRef};

#[derive(Debug, thiserror::Error)]
pub enum ProjectModelError {
    #[error("unknown project `{0}`")]
    UnknownProject(ProjectRef),

    #[error("failed to access description of `{project}` at {path}: {source}")]
    Io {
        project: ProjectRef,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed description of `{project}`: {message}")]
    Malformed { project: ProjectRef, message: String },

    #[error("{0}")]
    Message(String),
}

impl ProjectModelError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Object-safe view of the host's project model.
pub trait ProjectModel: Send + Sync {
    /// Root directory of `project`, or `None` if the project is unknown.
    fn location(&self, project: &ProjectRef) -> Option<PathBuf>;

    fn read_description(&self, project: &ProjectRef)
        -> Result<ProjectDescription, ProjectModelError>;

    fn write_description(
        &self,
        project: &ProjectRef,
        description: &ProjectDescription,
    ) -> Result<(), ProjectModelError>;
}
