//! New member project creation.

use std::fs;
use std::path::{Path, PathBuf};

use toml_edit::{value, Array, DocumentMut, Item, Table, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::manifest::{Manifest, FILE_NAME};
use crate::path_utils;
use crate::sync::{SyncOptions, SyncReport, Synchronizer};
use crate::workspace::Workspace;

pub const DEFAULT_PARENT: &str = "packages";
pub const INITIAL_VERSION: &str = "0";
pub const REQUIRES_PYTHON: &str = ">=3.6";

/// Request to scaffold a member project at `<path>/<name>`.
#[derive(Debug, Clone)]
pub struct CreateProject {
    pub name: String,
    /// Parent directory; relative paths are taken from the workspace root.
    pub path: PathBuf,
    /// Workspace projects the new member depends on.
    pub dependencies: Vec<String>,
}

impl CreateProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: PathBuf::from(DEFAULT_PARENT),
            dependencies: Vec::new(),
        }
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Writes the project and syncs it.
    ///
    /// Every check runs before anything is written.
    pub fn create(&self, workspace: &Workspace) -> Result<SyncReport> {
        validate_name(&self.name)?;

        let root = workspace.root_dir()?;
        let project_dir = project_dir(&root, &self.path, &self.name);
        if project_dir == path_utils::normalize(&root) || !path_utils::is_within(&project_dir, &root) {
            return Err(Error::InvalidPath {
                root,
                path: project_dir,
            });
        }

        let manifest_path = project_dir.join(FILE_NAME);
        if manifest_path.exists() {
            return Err(Error::ProjectExists(manifest_path));
        }

        let mut tree = workspace.tree()?;
        for dependency in &self.dependencies {
            if !tree.project_names().contains(dependency) {
                return Err(Error::InvalidDependency {
                    name: dependency.clone(),
                    available: tree.project_names().join(", "),
                });
            }
        }

        info!("Creating project: {} at {}", self.name, project_dir.display());
        let package_dir = project_dir.join("src").join(package_name(&self.name));
        fs::create_dir_all(&package_dir)?;
        fs::write(package_dir.join("__init__.py"), "")?;
        fs::write(
            &manifest_path,
            initial_manifest(&self.name, &self.dependencies).to_string(),
        )?;

        tree.insert_member(
            self.name.clone(),
            Manifest::new(&manifest_path, workspace.formatter()),
        );
        let mut tree = tree.filter(&[self.name.as_str()], true)?;
        Synchronizer::new(SyncOptions::default()).sync(&mut tree)
    }
}

/// Names start with a letter or digit and contain only `[A-Za-z0-9._-]`.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidProjectName(name.to_string()))
    }
}

/// Import package directory name for a project.
pub fn package_name(name: &str) -> String {
    name.replace('-', "_")
}

fn initial_manifest(name: &str, dependencies: &[String]) -> DocumentMut {
    let mut project = Table::new();
    project.insert("name", value(name));
    project.insert("version", value(INITIAL_VERSION));
    project.insert("requires-python", value(REQUIRES_PYTHON));
    if !dependencies.is_empty() {
        let mut array = Array::new();
        for dependency in dependencies {
            array.push_formatted(Value::from(dependency.as_str()).decorated("\n    ", ""));
        }
        array.set_trailing("\n");
        array.set_trailing_comma(true);
        project.insert("dependencies", value(array));
    }

    let mut document = DocumentMut::new();
    document.insert("project", Item::Table(project));
    document
}

/// Directory a project named `name` would occupy under `parent`.
pub fn project_dir(root: &Path, parent: &Path, name: &str) -> PathBuf {
    path_utils::resolve(root, parent).join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("pkg-a").is_ok());
        assert!(validate_name("Pkg.2_b").is_ok());
        assert!(matches!(validate_name(""), Err(Error::InvalidProjectName(_))));
        assert!(matches!(validate_name("-pkg"), Err(Error::InvalidProjectName(_))));
        assert!(matches!(validate_name("../pkg"), Err(Error::InvalidProjectName(_))));
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name("my-pkg"), "my_pkg");
    }

    #[test]
    fn test_initial_manifest_multiline_dependencies() {
        let document = initial_manifest("pkg-b", &["pkg-a".to_string(), "root".to_string()]);
        let content = document.to_string();
        assert!(content.contains("name = \"pkg-b\""));
        assert!(content.contains("version = \"0\""));
        assert!(content.contains("requires-python = \">=3.6\""));
        assert!(content.contains("dependencies = [\n    \"pkg-a\",\n    \"root\",\n]"));
    }

    #[test]
    fn test_initial_manifest_without_dependencies() {
        let document = initial_manifest("pkg-b", &[]);
        assert!(document["project"].get("dependencies").is_none());
    }
}
