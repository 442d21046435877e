use std::path::PathBuf;

use anyhow::Result;
use memberkit_core::{CreateProject, Workspace};

use crate::formatting::{print_key_value, print_success};

pub fn cmd_create(
    workspace: &Workspace,
    name: String,
    path: PathBuf,
    dependencies: Vec<String>,
) -> Result<()> {
    let report = CreateProject::new(name.as_str())
        .path(path)
        .dependencies(dependencies)
        .create(workspace)?;

    print_success(&format!("Created {}", name));
    if let Some(member) = report.members.first() {
        print_key_value("Version", &member.version);
    }
    println!();
    Ok(())
}
