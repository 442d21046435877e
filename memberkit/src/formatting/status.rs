//! Status indicators and message formatting.

use owo_colors::OwoColorize;

/// Outcome shown next to a message.
#[derive(Debug, Clone, Copy)]
pub enum Status {
    Success,
    Warning,
}

impl Status {
    /// Returns the symbol for this status.
    pub fn symbol(&self) -> &'static str {
        match self {
            Status::Success => "✓",
            Status::Warning => "⚠",
        }
    }

    /// Formats a status message with symbol and color.
    pub fn format(&self, message: &str) -> String {
        match self {
            Status::Success => format!("{} {}", self.symbol().green(), message.green().bold()),
            Status::Warning => format!("{} {}", self.symbol().yellow(), message.yellow().bold()),
        }
    }
}

/// Prints a success message.
pub fn print_success(message: &str) {
    println!("  {}", Status::Success.format(message));
}

/// Prints a warning message.
pub fn print_warning(message: &str) {
    println!("  {}", Status::Warning.format(message));
}
