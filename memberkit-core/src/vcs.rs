//! Git queries used for naming and versioning.
//!
//! Every query tolerates git being absent or the directory not being a
//! repository; missing information is reported as `None`.

use std::path::Path;

use tracing::debug;

use crate::process::{ProcessCommand, StderrMode};

/// Sync rewrites the member manifest itself; it never counts as a change.
const EXCLUDE_MANIFEST: &str = ":(exclude)pyproject.toml";

/// Repository state relevant to a member directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcsDescriptor {
    /// Most recent tag reachable from HEAD.
    pub tag: Option<String>,
    /// Commits touching the directory since `tag` (or since the root commit),
    /// ignoring commits that only touch its `pyproject.toml`.
    pub commits_since_tag: u64,
    /// Abbreviated HEAD commit hash.
    pub short_hash: Option<String>,
    /// Uncommitted or untracked changes under the directory, other than its
    /// `pyproject.toml`.
    pub dirty: bool,
}

impl VcsDescriptor {
    /// Reads the descriptor for `dir`.
    pub fn describe(dir: &Path) -> Self {
        let Some(short_hash) = git(dir, &["rev-parse", "--short", "HEAD"]) else {
            debug!("No git history at {}", dir.display());
            return Self::default();
        };

        let tag = git(dir, &["describe", "--tags", "--abbrev=0"]);
        let range = match tag {
            Some(ref tag) => format!("{}..HEAD", tag),
            None => "HEAD".to_string(),
        };
        let commits_since_tag = git(
            dir,
            &["rev-list", "--count", &range, "--", ".", EXCLUDE_MANIFEST],
        )
        .and_then(|count| count.parse().ok())
        .unwrap_or(0);
        let dirty = git(dir, &["status", "--porcelain", "--", ".", EXCLUDE_MANIFEST])
            .is_some_and(|status| !status.is_empty());

        Self {
            tag,
            commits_since_tag,
            short_hash: Some(short_hash),
            dirty,
        }
    }

    /// Whether the working tree has moved on from the last tag.
    pub fn is_ahead_or_dirty(&self) -> bool {
        self.tag.is_none() || self.commits_since_tag > 0 || self.dirty
    }
}

/// Repository name derived from the `origin` remote URL.
pub fn remote_repo_name(dir: &Path) -> Option<String> {
    let url = git(dir, &["remote", "get-url", "origin"]);
    let name = url.as_deref().and_then(repo_name_from_url);
    if name.is_none() {
        debug!("Git remote url not found - url: {:?} dir: {}", url, dir.display());
    }
    name
}

/// Extracts `repo` from `https://host/owner/repo.git` or `git@host:owner/repo.git`.
pub fn repo_name_from_url(url: &str) -> Option<String> {
    let url = url.trim();
    let path = if let Some(rest) = url.strip_prefix("git@") {
        rest.split_once(':').map(|(_, path)| path)?
    } else if let Some((_, rest)) = url.split_once("://") {
        rest.split_once('/').map(|(_, path)| path)?
    } else {
        url
    };
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let name = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()?
        .trim_end_matches(".git");
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = ProcessCommand::new("git")
        .args(args)
        .current_dir(dir)
        .stderr_mode(StderrMode::Discard)
        .stderr_log_level(None)
        .run()
        .ok()?;
    if output.is_empty() {
        None
    } else {
        Some(output)
    }
}
