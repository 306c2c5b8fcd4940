use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::ProjectRef;

/// Interactive configuration step offered by a configurator.
///
/// The import driver only needs a title to present; configurators without user interaction
/// return `None` from [`ProjectConfigurator::configuration_wizard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationWizard {
    pub title: String,
}

/// A build-tool specific participant in bulk project import.
///
/// Implementations are invoked once per candidate project, potentially from several threads at
/// once. None of the methods report errors: configuration failures are logged by the
/// implementation so that one project can never abort the import of others.
pub trait ProjectConfigurator: Send + Sync {
    /// Stable identifier used in logs and reports.
    fn id(&self) -> &str;

    /// Whether `container` should be imported as a project of its own.
    fn should_be_project(&self, container: &Path) -> bool;

    fn can_configure(&self, project: &ProjectRef) -> bool;

    fn configure(&self, project: &ProjectRef);

    /// Directories below `project` that the import driver should not scan any further.
    fn directories_to_ignore(&self, project: &ProjectRef) -> BTreeSet<PathBuf>;

    fn configuration_wizard(&self) -> Option<ConfigurationWizard> {
        None
    }
}
