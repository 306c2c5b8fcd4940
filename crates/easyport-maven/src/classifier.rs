use std::path::Path;

pub const POM_FILE_NAME: &str = "pom.xml";

/// Returns `true` if `container` holds a `pom.xml`.
///
/// Missing or unreadable containers are simply not project roots. Aggregator POMs
/// (`<packaging>pom</packaging>`) count as project roots too; the packaging is not inspected.
pub fn is_maven_project_root(container: &Path) -> bool {
    container.join(POM_FILE_NAME).is_file()
}
