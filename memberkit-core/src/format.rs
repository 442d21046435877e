//! External TOML formatting.

use std::path::Path;

use once_cell::sync::OnceCell;
use tracing::{debug, Level};

use crate::error::{Error, Result};
use crate::process::{ProcessCommand, StderrMode};

const MAX_BLANK_LINES: usize = 1;
const INDENT: &str = "    ";

/// Rewrites a TOML file in place in canonical style.
pub trait TomlFormatter: Send + Sync {
    fn format(&self, path: &Path) -> Result<()>;
}

/// Leaves files exactly as serialized.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughFormatter;

impl TomlFormatter for PassthroughFormatter {
    fn format(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Formats with `taplo` when available, `tombi` otherwise.
#[derive(Debug, Default)]
pub struct ExternalFormatter {
    taplo: OnceCell<Option<Vec<String>>>,
}

impl ExternalFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The command prefix that runs taplo, probed once.
    fn taplo_command(&self) -> Option<&[String]> {
        self.taplo.get_or_init(detect_taplo).as_deref()
    }
}

fn detect_taplo() -> Option<Vec<String>> {
    let candidates: [&[&str]; 2] = [&["taplo"], &["uv", "tool", "run", "--", "taplo"]];
    for candidate in candidates {
        let probe = ProcessCommand::new(candidate[0])
            .args(&candidate[1..])
            .arg("--version")
            .stderr_mode(StderrMode::Discard)
            .stderr_log_level(None)
            .run();
        if let Ok(version) = probe {
            if !version.is_empty() {
                debug!("Using formatter: {} ({})", candidate.join(" "), version);
                return Some(candidate.iter().map(|s| s.to_string()).collect());
            }
        }
    }
    debug!("Taplo unavailable");
    None
}

impl TomlFormatter for ExternalFormatter {
    fn format(&self, path: &Path) -> Result<()> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let command = match self.taplo_command() {
            Some(taplo) => ProcessCommand::new(&taplo[0])
                .args(&taplo[1..])
                .args([
                    "fmt".to_string(),
                    "--option".to_string(),
                    format!("allowed_blank_lines={}", MAX_BLANK_LINES),
                    "--option".to_string(),
                    format!("indent_string={}", INDENT),
                ])
                .arg(&absolute)
                .program_name("taplo"),
            None => ProcessCommand::new("uv")
                .args(["tool", "run", "--", "tombi", "format"])
                .arg(&absolute)
                .program_name("tombi"),
        };

        command
            .stdout_log_level(Some(Level::DEBUG))
            .run()
            .map(|_| ())
            .map_err(|e| Error::Format {
                path: absolute.clone(),
                message: e.to_string(),
            })
    }
}
