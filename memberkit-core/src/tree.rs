//! The root manifest and all member manifests of a workspace.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::format::TomlFormatter;
use crate::manifest::Manifest;
use crate::vcs;
use crate::workspace::WorkspaceMetadata;

/// Root manifest plus member manifests keyed by member name.
#[derive(Debug)]
pub struct ManifestTree {
    pub name: String,
    pub root: Manifest,
    pub members: IndexMap<String, Manifest>,
    /// Every project name in the workspace, kept across filtering.
    workspace_projects: Vec<String>,
    filtered: bool,
}

impl ManifestTree {
    pub fn new(name: impl Into<String>, root: Manifest, members: IndexMap<String, Manifest>) -> Self {
        let name = name.into();
        let workspace_projects = std::iter::once(name.clone())
            .chain(members.keys().cloned())
            .collect();
        Self {
            name,
            root,
            members,
            workspace_projects,
            filtered: false,
        }
    }

    /// Builds the tree from workspace metadata.
    ///
    /// The member located at the workspace root becomes `root` and supplies
    /// the tree name. Without one, the name comes from the git `origin`
    /// remote, then from the root directory name.
    pub fn discover(metadata: &WorkspaceMetadata, formatter: Arc<dyn TomlFormatter>) -> Self {
        let root_dir = &metadata.workspace_root;
        let mut root_name = None;
        let mut members = IndexMap::new();
        for member in &metadata.members {
            if same_path(&member.path, root_dir) {
                root_name = Some(member.name.clone());
                continue;
            }
            members.insert(
                member.name.clone(),
                Manifest::new(&member.path, Arc::clone(&formatter)),
            );
        }

        let name = root_name
            .or_else(|| vcs::remote_repo_name(root_dir))
            .or_else(|| {
                root_dir
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_default();

        Self::new(name, Manifest::new(root_dir, formatter), members)
    }

    /// Whether this tree is a subset produced by [`filter`](Self::filter).
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    /// Names of every workspace project: the tree name followed by member
    /// names, including members dropped by filtering.
    pub fn project_names(&self) -> &[String] {
        &self.workspace_projects
    }

    /// Root first, then members.
    pub fn projects(&self) -> impl Iterator<Item = &Manifest> {
        std::iter::once(&self.root).chain(self.members.values())
    }

    pub fn projects_mut(&mut self) -> impl Iterator<Item = &mut Manifest> {
        std::iter::once(&mut self.root).chain(self.members.values_mut())
    }

    /// Registers a member the workspace metadata does not know about yet.
    pub fn insert_member(&mut self, name: impl Into<String>, manifest: Manifest) {
        let name = name.into();
        if !self.workspace_projects.contains(&name) {
            self.workspace_projects.push(name.clone());
        }
        self.members.insert(name, manifest);
    }

    /// Restricts members to `names`, in first-seen order.
    ///
    /// An empty `names` returns the tree unchanged. Unknown names fail with
    /// [`Error::MemberNotFound`] when `required`, and are skipped otherwise.
    pub fn filter<S: AsRef<str>>(mut self, names: &[S], required: bool) -> Result<Self> {
        if names.is_empty() {
            return Ok(self);
        }

        let available = self
            .members
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let mut selected = IndexMap::new();
        for name in names {
            let name = name.as_ref();
            if selected.contains_key(name) {
                continue;
            }
            match self.members.shift_remove(name) {
                Some(manifest) => {
                    selected.insert(name.to_string(), manifest);
                }
                None if required => {
                    return Err(Error::MemberNotFound {
                        name: name.to_string(),
                        available,
                    })
                }
                None => {}
            }
        }

        Ok(Self {
            name: self.name,
            root: self.root,
            members: selected,
            workspace_projects: self.workspace_projects,
            filtered: true,
        })
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
