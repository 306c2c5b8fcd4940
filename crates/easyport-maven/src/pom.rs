use std::path::Path;

use serde::Serialize;

use crate::MavenError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PomParent {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
}

/// The subset of a POM needed to identify a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PomModel {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: String,
    pub parent: Option<PomParent>,
    pub modules: Vec<String>,
}

impl Default for PomModel {
    fn default() -> Self {
        Self {
            group_id: None,
            artifact_id: None,
            version: None,
            packaging: "jar".to_owned(),
            parent: None,
            modules: Vec::new(),
        }
    }
}

impl PomModel {
    /// `groupId`, inherited from `<parent>` when not declared.
    pub fn effective_group_id(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or_else(|| self.parent.as_ref()?.group_id.as_deref())
    }

    /// `version`, inherited from `<parent>` when not declared.
    pub fn effective_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or_else(|| self.parent.as_ref()?.version.as_deref())
    }

    /// `groupId:artifactId:version`, if all three are known.
    pub fn coordinates(&self) -> Option<String> {
        Some(format!(
            "{}:{}:{}",
            self.effective_group_id()?,
            self.artifact_id.as_deref()?,
            self.effective_version()?
        ))
    }

    pub fn is_aggregator(&self) -> bool {
        self.packaging == "pom"
    }
}

pub fn parse_pom(path: &Path) -> Result<PomModel, MavenError> {
    let contents = std::fs::read_to_string(path).map_err(|source| MavenError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_pom_str(&contents, path)
}

/// Parses POM text; `path` is only used in errors.
pub fn parse_pom_str(contents: &str, path: &Path) -> Result<PomModel, MavenError> {
    let doc = roxmltree::Document::parse(contents).map_err(|source| MavenError::Xml {
        path: path.to_path_buf(),
        source,
    })?;

    let project = doc.root_element();
    if project.tag_name().name() != "project" {
        return Err(MavenError::NotAPom {
            path: path.to_path_buf(),
            root: project.tag_name().name().to_owned(),
        });
    }

    let mut pom = PomModel {
        group_id: child_text(&project, "groupId"),
        artifact_id: child_text(&project, "artifactId"),
        version: child_text(&project, "version"),
        ..PomModel::default()
    };
    if let Some(packaging) = child_text(&project, "packaging") {
        pom.packaging = packaging;
    }

    if let Some(parent_node) = child_element(&project, "parent") {
        pom.parent = Some(PomParent {
            group_id: child_text(&parent_node, "groupId"),
            artifact_id: child_text(&parent_node, "artifactId"),
            version: child_text(&parent_node, "version"),
        });
    }

    if let Some(modules_node) = child_element(&project, "modules") {
        pom.modules = modules_node
            .children()
            .filter(|n| n.is_element() && n.has_tag_name("module"))
            .filter_map(|n| n.text())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }

    Ok(pom)
}

fn child_element<'a>(
    node: &'a roxmltree::Node<'a, 'a>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: &roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
