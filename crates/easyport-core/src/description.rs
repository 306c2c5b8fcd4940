use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a project in the host project model.
///
/// Projects are identified by their unique name. Cloning is cheap, so refs can be handed to
/// background work freely.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectRef(Arc<str>);

impl ProjectRef {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProjectRef").field(&self.name()).finish()
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for ProjectRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl Serialize for ProjectRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Persisted project metadata.
///
/// `natures` is ordered: the first entry is the project's primary nature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDescription {
    pub name: String,
    #[serde(default)]
    pub natures: Vec<String>,
}

impl ProjectDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            natures: Vec::new(),
        }
    }

    pub fn has_nature(&self, nature: &str) -> bool {
        self.natures.iter().any(|n| n == nature)
    }

    /// Makes `nature` the primary nature if it is not present yet.
    ///
    /// Returns `true` when the description changed. Existing natures keep their relative order.
    pub fn ensure_nature(&mut self, nature: &str) -> bool {
        if self.has_nature(nature) {
            return false;
        }
        self.natures.insert(0, nature.to_owned());
        true
    }
}
