use anyhow::Result;
use memberkit_core::sync::parse_version;
use memberkit_core::{SyncOptions, Synchronizer, Workspace};

use crate::formatting::{
    print_section_header, print_success, print_summary_box, print_sync_table, SectionStyle,
};

pub fn cmd_sync(
    workspace: &Workspace,
    members: Vec<String>,
    version: Option<String>,
    format_root: bool,
) -> Result<()> {
    let options = SyncOptions {
        version: version.as_deref().map(parse_version).transpose()?,
        format_root,
    };

    let mut tree = workspace.tree()?.filter(&members, true)?;
    if tree.members.is_empty() {
        print_success("No members to sync");
        println!();
        return Ok(());
    }

    let report = Synchronizer::new(options).sync(&mut tree)?;

    print_section_header(&format!("Synced {}", tree.name), SectionStyle::Primary);
    print_sync_table(&report.members);
    println!();

    let mut summary = vec![
        ("Members", report.members.len().to_string()),
        ("Changed", report.changed_count().to_string()),
    ];
    if format_root {
        summary.push(("Root formatted", report.root_changed.to_string()));
    }
    let items: Vec<(&str, &str)> = summary.iter().map(|(k, v)| (*k, v.as_str())).collect();
    print_summary_box("Summary", &items);
    Ok(())
}
