//! Key-value and summary output.

use owo_colors::OwoColorize;

/// Prints a titled box of key-value lines.
pub fn print_summary_box(title: &str, items: &[(&str, &str)]) {
    println!("┌─ {} {}", title.cyan().bold(), "─".repeat(50).bright_black());
    for (key, value) in items {
        println!("│ {} {}", key.bright_black().bold(), value.bold().white());
    }
    println!("└{}", "─".repeat(60).bright_black());
}

/// Prints an indented key-value pair.
pub fn print_key_value(key: &str, value: &str) {
    println!("  {} {}", key.bright_black().bold(), value.bold().white());
}
