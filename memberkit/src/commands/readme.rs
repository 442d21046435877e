use std::path::PathBuf;

use anyhow::Result;
use memberkit_core::{ReadmeUpdater, Workspace};

use crate::formatting::{print_key_value, print_success, print_warning};

pub fn cmd_readme_update(
    workspace: &Workspace,
    readme: PathBuf,
    write: bool,
    jobs: Option<usize>,
    filter: Option<String>,
) -> Result<()> {
    let updater = ReadmeUpdater::new()?
        .jobs(jobs.unwrap_or(0))
        .filter(filter.as_deref())?
        .write(write);
    let update = updater.update(&readme, workspace)?;

    if update.commands.is_empty() {
        print_warning("No matching command blocks");
    } else if !update.changed {
        print_success("README already up to date");
    } else if write {
        print_success("README updated");
    } else {
        print_success("README changes logged, file not written");
    }
    print_key_value("Commands", &update.commands.len().to_string());
    println!();
    Ok(())
}
