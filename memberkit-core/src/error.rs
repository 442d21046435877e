//! Error types and result aliases.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start `{command}`: {source}")]
    ProcessSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` failed with exit code {}", code.map(|c| c.to_string()).unwrap_or_else(|| "<signal>".to_string()))]
    ProcessFailure { command: String, code: Option<i32> },

    #[error("Failed to read manifest {path}: {message}")]
    ManifestRead { path: PathBuf, message: String },

    #[error("Failed to format {path}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("Invalid workspace metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Member not found: {name}. Available members: {available}")]
    MemberNotFound { name: String, available: String },

    #[error("Invalid project dependency: {name}. Workspace projects: {available}")]
    InvalidDependency { name: String, available: String },

    #[error("Path must be inside the workspace root - root: {root} path: {path}")]
    InvalidPath { root: PathBuf, path: PathBuf },

    #[error("Project already exists: {0}")]
    ProjectExists(PathBuf),

    #[error("Invalid project name: {0}. Use letters, digits, '.', '_' or '-'.")]
    InvalidProjectName(String),

    #[error("README file not found at {0}")]
    ReadmeNotFound(PathBuf),

    #[error("Invalid command filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("Version error: {0}")]
    Version(String),

    #[error("Invalid configuration in {context}: {message}")]
    Config { context: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
