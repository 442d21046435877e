//! Workspace settings and environment loading.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::manifest::FILE_NAME;
use crate::process::{ProcessCommand, StderrMode};

/// Names a dotenv file other than [`DEFAULT_DOTENV_FILE`].
pub const DOTENV_FILE_ENV: &str = "PYTHON_DOTENV_FILE";
pub const DEFAULT_DOTENV_FILE: &str = ".dev.env";
/// Explicit project root, checked before asking uv or git.
pub const PROJECT_ROOT_ENV: &str = "PROJECT_ROOT";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Synchronizer settings from the root manifest's `[tool.memberkit]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorkspaceSettings {
    /// Root sections copied into every member in addition to `build-system`.
    pub shared: Vec<String>,
    /// Stored baseline version for member version computation.
    pub version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RootDocument {
    #[serde(default)]
    tool: ToolSection,
}

#[derive(Debug, Default, Deserialize)]
struct ToolSection {
    #[serde(default)]
    memberkit: WorkspaceSettings,
}

impl WorkspaceSettings {
    /// Parses settings out of a full root manifest.
    pub fn from_manifest_str(content: &str, context: &Path) -> Result<Self> {
        let root: RootDocument = toml::from_str(content).map_err(|e| Error::Config {
            context: context.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(root.tool.memberkit)
    }
}

/// Process environment setup performed before any command runs.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// Dotenv files that were found and loaded, in load order.
    pub loaded: Vec<PathBuf>,
    pub project_root: Option<PathBuf>,
}

impl EnvConfig {
    /// Loads `$PYTHON_DOTENV_FILE` (default `.dev.env`) from the current
    /// directory and then from the project root. Variables already set are
    /// not overridden.
    pub fn load() -> Self {
        let file_name = env::var(DOTENV_FILE_ENV)
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DOTENV_FILE.to_string());

        let project_root = project_root();
        let mut loaded = Vec::new();
        let dirs = env::current_dir().ok().into_iter().chain(project_root.clone());
        for dir in dirs {
            let candidate = dir.join(&file_name);
            if !candidate.is_file() || loaded.contains(&candidate) {
                continue;
            }
            match dotenvy::from_path(&candidate) {
                Ok(()) => {
                    debug!("Loaded environment: {}", candidate.display());
                    loaded.push(candidate);
                }
                Err(e) => debug!("Failed to load {}: {}", candidate.display(), e),
            }
        }

        Self {
            loaded,
            project_root,
        }
    }
}

/// Resolves the project root: `$PROJECT_ROOT`, then `uv workspace dir`,
/// then the git top level, then the nearest ancestor with a `pyproject.toml`.
pub fn project_root() -> Option<PathBuf> {
    if let Some(dir) = env::var(PROJECT_ROOT_ENV).ok().and_then(existing_dir) {
        return Some(dir);
    }
    if let Some(dir) = dir_command("uv", &["workspace", "dir"]) {
        return Some(dir);
    }
    if let Some(dir) = dir_command("git", &["rev-parse", "--show-toplevel"]) {
        return Some(dir);
    }
    let cwd = env::current_dir().ok()?;
    nearest_manifest_dir(&cwd)
}

/// Nearest directory at or above `start` that contains a `pyproject.toml`.
pub fn nearest_manifest_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(FILE_NAME).is_file())
        .map(Path::to_path_buf)
}

fn dir_command(program: &str, args: &[&str]) -> Option<PathBuf> {
    ProcessCommand::new(program)
        .args(args)
        .stderr_mode(StderrMode::Discard)
        .stderr_log_level(None)
        .run()
        .ok()
        .and_then(existing_dir)
}

fn existing_dir(path: String) -> Option<PathBuf> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    let path = PathBuf::from(path);
    path.is_dir().then_some(path)
}
