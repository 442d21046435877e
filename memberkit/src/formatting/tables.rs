//! Table formatting using comfy-table.

use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use memberkit_core::MemberReport;

/// Prints one row per synced member.
pub fn print_sync_table(members: &[MemberReport]) {
    let mut table = Table::new();
    table
        .set_header(vec![
            Cell::new("Member").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
        ])
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for member in members {
        let (status, color) = if member.changed {
            ("updated", Color::Green)
        } else {
            ("unchanged", Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&member.name).fg(Color::White),
            Cell::new(&member.version).fg(Color::Cyan),
            Cell::new(status).fg(color),
        ]);
    }

    println!("{}", table);
}
