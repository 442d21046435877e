//! Workspace metadata provided by `uv workspace metadata`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::format::TomlFormatter;
use crate::process::ProcessCommand;
use crate::tree::ManifestTree;

/// Root directory and member projects of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkspaceMetadata {
    pub workspace_root: PathBuf,
    pub members: Vec<WorkspaceMember>,
}

/// A member project registered in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkspaceMember {
    pub name: String,
    pub path: PathBuf,
}

impl WorkspaceMetadata {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Source of raw workspace metadata.
pub trait MetadataSource: Send + Sync {
    fn query(&self, directory: &Path) -> Result<WorkspaceMetadata>;
}

/// Queries the `uv` workspace manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct UvMetadataSource;

impl MetadataSource for UvMetadataSource {
    fn query(&self, directory: &Path) -> Result<WorkspaceMetadata> {
        let output = ProcessCommand::new("uv")
            .args(["workspace", "metadata"])
            .current_dir(directory)
            .run()?;
        WorkspaceMetadata::from_json(&output)
    }
}

/// Memoizes workspace metadata per absolute directory.
pub struct MetadataProvider {
    source: Box<dyn MetadataSource>,
    cache: Mutex<HashMap<PathBuf, Arc<WorkspaceMetadata>>>,
}

impl Default for MetadataProvider {
    fn default() -> Self {
        Self::new(UvMetadataSource)
    }
}

impl MetadataProvider {
    pub fn new(source: impl MetadataSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns metadata for the workspace containing `directory`.
    ///
    /// The external tool is invoked at most once per resolved directory.
    pub fn metadata(&self, directory: &Path) -> Result<Arc<WorkspaceMetadata>> {
        let key = absolute(directory)?;
        if let Some(cached) = self.lock().get(&key) {
            return Ok(Arc::clone(cached));
        }

        debug!("Querying workspace metadata: {}", key.display());
        let metadata = Arc::new(self.source.query(&key)?);
        self.lock().insert(key, Arc::clone(&metadata));
        Ok(metadata)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<WorkspaceMetadata>>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn absolute(directory: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = directory.canonicalize() {
        return Ok(canonical);
    }
    if directory.is_absolute() {
        Ok(directory.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(directory))
    }
}

/// Everything a command needs to operate on one workspace.
pub struct Workspace {
    directory: PathBuf,
    provider: MetadataProvider,
    formatter: Arc<dyn TomlFormatter>,
}

impl Workspace {
    pub fn new(
        directory: impl Into<PathBuf>,
        provider: MetadataProvider,
        formatter: Arc<dyn TomlFormatter>,
    ) -> Self {
        Self {
            directory: directory.into(),
            provider,
            formatter,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn formatter(&self) -> Arc<dyn TomlFormatter> {
        Arc::clone(&self.formatter)
    }

    pub fn metadata(&self) -> Result<Arc<WorkspaceMetadata>> {
        self.provider.metadata(&self.directory)
    }

    pub fn root_dir(&self) -> Result<PathBuf> {
        Ok(self.metadata()?.workspace_root.clone())
    }

    /// Discovers the manifest tree for this workspace.
    pub fn tree(&self) -> Result<ManifestTree> {
        let metadata = self.metadata()?;
        Ok(ManifestTree::discover(&metadata, self.formatter()))
    }
}
