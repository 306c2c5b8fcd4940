//! Maven support for easyport imports.
//!
//! - [`is_maven_project_root`] decides which directories are Maven projects.
//! - [`MavenProjectConfigurator`] adds the Maven nature to detected projects and hands them to a
//!   shared [`CoalescingWorker`](easyport_scheduler::CoalescingWorker).
//! - [`UpdateMavenProjects`] is the batch operation that worker runs: it reads each project's POM
//!   into the [`MavenProjectRegistry`].

mod classifier;
mod configurator;
mod pom;
mod update;

use std::path::PathBuf;

use easyport_core::ProjectRef;

pub use classifier::{is_maven_project_root, POM_FILE_NAME};
pub use configurator::{
    ensure_maven_nature, maven_update_worker, MavenProjectConfigurator, IGNORED_DIRECTORIES,
    MAVEN_NATURE_ID, UPDATE_JOB_NAME,
};
pub use pom::{parse_pom, parse_pom_str, PomModel, PomParent};
pub use update::{MavenProjectFacade, MavenProjectRegistry, UpdateMavenProjects};

#[derive(Debug, thiserror::Error)]
pub enum MavenError {
    #[error("unknown project `{0}`")]
    UnknownProject(ProjectRef),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse XML in {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },

    #[error("{path} is not a Maven POM (root element `{root}`)")]
    NotAPom { path: PathBuf, root: String },
}
