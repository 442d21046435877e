//! Command implementations for the CLI.

mod create;
mod readme;
mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use memberkit_core::{ExternalFormatter, MetadataProvider, PassthroughFormatter, TomlFormatter, Workspace};

pub use create::cmd_create;
pub use readme::cmd_readme_update;
pub use sync::cmd_sync;

pub fn open_workspace(working_directory: Option<PathBuf>, no_format: bool) -> Result<Workspace> {
    let directory = match working_directory {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let formatter: Arc<dyn TomlFormatter> = if no_format {
        Arc::new(PassthroughFormatter)
    } else {
        Arc::new(ExternalFormatter::new())
    };
    Ok(Workspace::new(directory, MetadataProvider::default(), formatter))
}
