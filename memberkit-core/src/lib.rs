//! Core library for uv workspace maintenance.

pub mod config;
pub mod error;
pub mod format;
pub mod manifest;
pub mod path_utils;
pub mod process;
pub mod readme;
pub mod scaffold;
pub mod sync;
pub mod tree;
pub mod vcs;
pub mod workspace;

pub use config::{EnvConfig, WorkspaceSettings};
pub use error::{Error, Result};
pub use format::{ExternalFormatter, PassthroughFormatter, TomlFormatter};
pub use manifest::{Manifest, ManifestChange};
pub use process::{ProcessCommand, ProcessLines, StderrMode};
pub use readme::{ReadmeUpdate, ReadmeUpdater};
pub use scaffold::CreateProject;
pub use sync::{MemberReport, SyncOptions, SyncReport, Synchronizer};
pub use tree::ManifestTree;
pub use vcs::VcsDescriptor;
pub use workspace::{MetadataProvider, MetadataSource, UvMetadataSource, Workspace, WorkspaceMetadata, WorkspaceMember};
