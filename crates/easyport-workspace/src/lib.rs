//! Bulk import of project trees.
//!
//! [`ImportSession`] walks a directory tree, lets each configurator claim project roots, and
//! configures the claimed projects concurrently. Project metadata lives in [`FsProjectModel`].

mod model;
mod session;

use std::path::PathBuf;

pub use model::{FsProjectModel, DESCRIPTION_FILE, METADATA_DIR};
pub use session::{BatchSummary, DetectedProject, ImportReport, ImportSession, ImportedProject};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("import root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("failed to canonicalize {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Model(#[from] easyport_core::ProjectModelError),
}
