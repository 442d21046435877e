//! Refreshes `<!-- BEGIN:cmd ... -->` blocks in README files.
//!
//! Each block names a shell command. Its body is replaced with the
//! command's stdout wrapped in a `shell` code fence:
//!
//! ````markdown
//! <!-- BEGIN:cmd memberkit --help -->
//! ```shell
//! ...
//! ```
//! <!-- END:cmd -->
//! ````
//!
//! Blocks that sit entirely inside a fenced code region are left alone, so
//! documentation can show the syntax itself.

use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::process::ProcessCommand;
use crate::workspace::Workspace;

pub const DEFAULT_README: &str = "README.md";

const BLOCK_PATTERN: &str =
    r"(?s)\s*<!--\s*BEGIN:cmd\s+(?P<cmd>[^>]+?)\s*-->\s*(?P<body>.*?)\s*<!--\s*END:cmd\s*-->\s*";

/// Result of refreshing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadmeUpdate {
    pub content: String,
    /// Distinct commands that were executed, in document order.
    pub commands: Vec<String>,
    pub changed: bool,
}

pub struct ReadmeUpdater {
    jobs: usize,
    filter: Option<Regex>,
    write: bool,
    pattern: Regex,
}

impl ReadmeUpdater {
    pub fn new() -> Result<Self> {
        Ok(Self {
            jobs: default_jobs(),
            filter: None,
            write: true,
            pattern: Regex::new(BLOCK_PATTERN)?,
        })
    }

    /// Worker count for running commands; zero means the default.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = if jobs == 0 { default_jobs() } else { jobs };
        self
    }

    /// Only refresh blocks whose command matches `pattern`.
    pub fn filter(mut self, pattern: Option<&str>) -> Result<Self> {
        self.filter = pattern.map(Regex::new).transpose()?;
        Ok(self)
    }

    /// When unset, the refreshed document is logged instead of written.
    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Refreshes the README at `path`, falling back to the same relative
    /// path under the workspace root.
    pub fn update(&self, path: &Path, workspace: &Workspace) -> Result<ReadmeUpdate> {
        let path = locate(path, workspace)?;
        self.update_file(&path)
    }

    /// Refreshes a README file in place. Commands run in its directory.
    pub fn update_file(&self, path: &Path) -> Result<ReadmeUpdate> {
        let content = fs::read_to_string(path)?;
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let update = self.render(&content, dir)?;

        if !update.changed {
            debug!("README unchanged: {}", path.display());
        } else if self.write {
            fs::write(path, &update.content)?;
            info!("Updated README: {}", path.display());
        } else {
            info!("Updated README (not written): {}\n{}", path.display(), update.content);
        }
        Ok(update)
    }

    /// Returns `content` with every selected block refreshed.
    pub fn render(&self, content: &str, dir: &Path) -> Result<ReadmeUpdate> {
        let code = code_regions(content);
        let mut blocks = Vec::new();
        for captures in self.pattern.captures_iter(content) {
            let (Some(whole), Some(cmd)) = (captures.get(0), captures.name("cmd")) else {
                continue;
            };
            let text = whole.as_str();
            let begin = whole.start() + (text.len() - text.trim_start().len());
            let end = whole.start() + text.trim_end().len();
            if code.iter().any(|region| region.start <= begin && end <= region.end) {
                debug!("Skipping block in code region: {}", cmd.as_str());
                continue;
            }
            let cmd = cmd.as_str().trim().to_string();
            if self.filter.as_ref().is_some_and(|filter| !filter.is_match(&cmd)) {
                continue;
            }
            blocks.push((whole.range(), cmd));
        }

        let mut commands: Vec<String> = Vec::new();
        for (_, cmd) in &blocks {
            if !commands.contains(cmd) {
                commands.push(cmd.clone());
            }
        }
        let outputs = self.run_commands(&commands, dir)?;

        let mut rendered = String::with_capacity(content.len());
        let mut last = 0;
        for (range, cmd) in &blocks {
            let Some(output) = outputs.get(cmd) else {
                continue;
            };
            rendered.push_str(&content[last..range.start]);
            rendered.push_str(&format!(
                "\n\n<!-- BEGIN:cmd {} -->\n```shell\n{}\n```\n<!-- END:cmd -->\n\n",
                cmd, output
            ));
            last = range.end;
        }
        rendered.push_str(&content[last..]);

        Ok(ReadmeUpdate {
            changed: rendered != content,
            content: rendered,
            commands,
        })
    }

    fn run_commands(&self, commands: &[String], dir: &Path) -> Result<HashMap<String, String>> {
        if commands.is_empty() {
            return Ok(HashMap::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("memberkit-readme-{}", i))
            .build()
            .map_err(std::io::Error::other)?;

        let results: Vec<Result<(String, String)>> = pool.install(|| {
            commands
                .par_iter()
                .map(|cmd| -> Result<(String, String)> {
                    info!("Running: {}", cmd);
                    let output = ProcessCommand::new("sh")
                        .args(["-c", cmd.as_str()])
                        .program_name(cmd.clone())
                        .current_dir(dir)
                        .run()?;
                    Ok((cmd.clone(), output))
                })
                .collect()
        });
        results.into_iter().collect()
    }
}

/// Resolves a README path against the workspace directory, then the
/// workspace root. Absolute paths are taken as given.
pub fn locate(path: &Path, workspace: &Workspace) -> Result<PathBuf> {
    if path.is_absolute() {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(Error::ReadmeNotFound(path.to_path_buf()))
        };
    }

    let candidate = workspace.directory().join(path);
    if candidate.is_file() {
        return Ok(candidate);
    }
    let candidate = workspace.root_dir()?.join(path);
    if candidate.is_file() {
        return Ok(candidate);
    }
    Err(Error::ReadmeNotFound(path.to_path_buf()))
}

/// Available parallelism minus one, at least one.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Byte ranges of closed fenced code regions.
///
/// A fence is a line starting with three or more backticks or tildes. It is
/// closed by a later line starting with at least as many of the same
/// character and nothing else. An unclosed fence opens no region.
pub fn code_regions(content: &str) -> Vec<Range<usize>> {
    let mut regions = Vec::new();
    let mut open: Option<(usize, char, usize)> = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let trimmed = line.trim();
        let Some((fence, count)) = fence_run(trimmed) else {
            continue;
        };
        match open {
            None => open = Some((start, fence, count)),
            Some((open_start, open_fence, open_count)) => {
                let closes = fence == open_fence
                    && count >= open_count
                    && trimmed[count * fence.len_utf8()..].trim().is_empty();
                if closes {
                    regions.push(open_start..offset);
                    open = None;
                }
            }
        }
    }
    regions
}

fn fence_run(line: &str) -> Option<(char, usize)> {
    let first = line.chars().next().filter(|c| matches!(c, '`' | '~'))?;
    let count = line.chars().take_while(|c| *c == first).count();
    (count >= 3).then_some((first, count))
}
