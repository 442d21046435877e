//! Propagates root configuration and computed versions into members.
//!
//! For every member of a (possibly filtered) tree:
//!
//! 1. shared root sections (always `build-system`) replace the member's,
//! 2. `[tool.member-project]` defaults are merged into `[project]`,
//! 3. workspace-internal dependencies get a `{ workspace = true }` source,
//! 4. `project.version` is set from the baseline and repository state,
//! 5. the manifest is persisted.
//!
//! Members are written one at a time. A failure leaves earlier members
//! updated.

use semver::{BuildMetadata, Version};
use toml_edit::{value, InlineTable, Item, TableLike, Value};
use tracing::{debug, info};

use crate::config::WorkspaceSettings;
use crate::error::{Error, Result};
use crate::manifest::{walk_tables, Manifest};
use crate::tree::ManifestTree;
use crate::vcs::VcsDescriptor;

pub const BUILD_SYSTEM: &str = "build-system";
/// Root table whose entries are merged into every member's `[project]`.
pub const MEMBER_PROJECT: [&str; 2] = ["tool", "member-project"];

/// Knobs for a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Baseline version overriding stored settings and git tags.
    pub version: Option<Version>,
    /// Also run the root manifest through the formatter.
    pub format_root: bool,
}

/// Outcome for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberReport {
    pub name: String,
    pub version: String,
    pub changed: bool,
}

/// Outcome of a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub members: Vec<MemberReport>,
    pub root_changed: bool,
}

impl SyncReport {
    pub fn changed_count(&self) -> usize {
        self.members.iter().filter(|m| m.changed).count()
    }
}

/// Root-derived values applied to each member.
struct SharedConfig {
    sections: Vec<(Vec<String>, Item)>,
    member_project: Option<Item>,
    baseline: Option<Version>,
}

pub struct Synchronizer {
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    pub fn sync(&self, tree: &mut ManifestTree) -> Result<SyncReport> {
        let shared = self.shared_config(&mut tree.root)?;
        let workspace_projects: Vec<String> = tree.project_names().to_vec();

        let mut report = SyncReport::default();
        for (name, manifest) in tree.members.iter_mut() {
            let member = self.sync_member(name, manifest, &shared, &workspace_projects)?;
            info!(
                "Synced {} - version: {} changed: {}",
                member.name, member.version, member.changed
            );
            report.members.push(member);
        }

        if self.options.format_root {
            report.root_changed = tree.root.persist(true)?.is_some();
        } else {
            tree.root.unload();
        }
        Ok(report)
    }

    fn shared_config(&self, root: &mut Manifest) -> Result<SharedConfig> {
        let path = root.path().to_path_buf();
        let document = root.load()?;
        let settings = WorkspaceSettings::from_manifest_str(&document.to_string(), &path)?;

        let mut section_names = vec![BUILD_SYSTEM.to_string()];
        for section in settings.shared {
            if !section_names.contains(&section) {
                section_names.push(section);
            }
        }

        let mut sections = Vec::new();
        for section in section_names {
            let keys: Vec<String> = section.split('.').map(str::to_string).collect();
            match lookup(document.as_item(), &keys) {
                Some(item) => sections.push((keys, item.clone())),
                None => debug!("Root manifest has no [{}] to share", section),
            }
        }

        let member_project = lookup(
            document.as_item(),
            &MEMBER_PROJECT.map(str::to_string),
        )
        .filter(|item| item.is_table_like())
        .cloned();

        let baseline = match (&self.options.version, settings.version) {
            (Some(version), _) => Some(version.clone()),
            (None, Some(stored)) => Some(parse_version(&stored)?),
            (None, None) => None,
        };

        Ok(SharedConfig {
            sections,
            member_project,
            baseline,
        })
    }

    fn sync_member(
        &self,
        name: &str,
        manifest: &mut Manifest,
        shared: &SharedConfig,
        workspace_projects: &[String],
    ) -> Result<MemberReport> {
        let descriptor = VcsDescriptor::describe(manifest.dir());
        let baseline = match shared.baseline {
            Some(ref baseline) => baseline.clone(),
            None => descriptor
                .tag
                .as_deref()
                .and_then(|tag| parse_version(tag).ok())
                .unwrap_or_else(|| Version::new(0, 0, 0)),
        };
        let version = next_version(&baseline, &descriptor)?.to_string();

        let document = manifest.load()?;
        let root = document.as_table_mut();

        for (keys, item) in &shared.sections {
            let Some((last, parents)) = keys.split_last() else {
                continue;
            };
            let parents: Vec<&str> = parents.iter().map(String::as_str).collect();
            if let Some(parent) = walk_tables(root, &parents, true) {
                parent.insert(last, item.clone());
            }
        }

        if let Some(defaults) = shared.member_project.as_ref().and_then(Item::as_table_like) {
            if let Some(project) = walk_tables(root, &["project"], true) {
                merge_tables(project, defaults);
            }
        }

        link_workspace_sources(root, name, workspace_projects);

        if let Some(project) = walk_tables(root, &["project"], true) {
            project.insert("version", value(version.clone()));
        }

        let changed = manifest.persist(false)?.is_some();
        Ok(MemberReport {
            name: name.to_string(),
            version,
            changed,
        })
    }
}

/// Next patch version after `baseline`, with `g<hash>[.dirty]` build
/// metadata when the repository has moved past its last tag.
pub fn next_version(baseline: &Version, descriptor: &VcsDescriptor) -> Result<Version> {
    let mut version = Version::new(baseline.major, baseline.minor, baseline.patch + 1);

    if let (true, Some(hash)) = (descriptor.is_ahead_or_dirty(), &descriptor.short_hash) {
        let mut metadata = format!("g{}", hash);
        if descriptor.dirty {
            metadata.push_str(".dirty");
        }
        version.build = BuildMetadata::new(&metadata)
            .map_err(|e| Error::Version(format!("invalid build metadata {}: {}", metadata, e)))?;
    }
    Ok(version)
}

/// Parses `1.2.3` or `v1.2.3`.
pub fn parse_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).map_err(|e| Error::Version(format!("invalid version {}: {}", raw, e)))
}

fn lookup<'a>(item: &'a Item, keys: &[String]) -> Option<&'a Item> {
    let mut current = item;
    for key in keys {
        current = current.as_table_like()?.get(key)?;
    }
    Some(current)
}

/// Arrays are union-appended, tables merged recursively, scalars replaced.
fn merge_tables(target: &mut dyn TableLike, source: &dyn TableLike) {
    for (key, item) in source.iter() {
        if let Some(existing) = target.get_mut(key) {
            if let (Some(dst), Some(src)) = (existing.as_table_like_mut(), item.as_table_like()) {
                merge_tables(dst, src);
                continue;
            }
            if let (Some(dst), Some(src)) = (existing.as_array_mut(), item.as_array()) {
                for element in src.iter() {
                    if !dst.iter().any(|present| same_value(present, element)) {
                        dst.push(element.clone());
                    }
                }
                continue;
            }
        }
        target.insert(key, item.clone());
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => a == b,
        _ => a.to_string().trim() == b.to_string().trim(),
    }
}

fn link_workspace_sources(root: &mut dyn TableLike, member: &str, workspace_projects: &[String]) {
    let dependencies: Vec<String> = walk_tables(root, &["project"], false)
        .and_then(|project| project.get("dependencies"))
        .and_then(Item::as_array)
        .map(|array| {
            array
                .iter()
                .filter_map(Value::as_str)
                .filter_map(requirement_name)
                .collect()
        })
        .unwrap_or_default();

    let internal: Vec<String> = dependencies
        .into_iter()
        .filter(|dep| normalize_name(dep) != normalize_name(member))
        .filter(|dep| {
            workspace_projects
                .iter()
                .any(|project| normalize_name(project) == normalize_name(dep))
        })
        .collect();
    if internal.is_empty() {
        return;
    }

    let Some(sources) = walk_tables(root, &["tool", "uv", "sources"], true) else {
        return;
    };
    for dep in internal {
        if sources.contains_key(&dep) {
            continue;
        }
        debug!("Linking workspace source: {} -> {}", member, dep);
        let mut source = InlineTable::new();
        source.insert("workspace", Value::from(true));
        sources.insert(&dep, Item::Value(Value::InlineTable(source)));
    }
}

/// Distribution name at the start of a PEP 508 requirement.
pub fn requirement_name(requirement: &str) -> Option<String> {
    let name: String = requirement
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// PEP 503 normalization: lowercase, runs of `-_.` collapsed to `-`.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            separator = true;
            continue;
        }
        if separator && !normalized.is_empty() {
            normalized.push('-');
        }
        separator = false;
        normalized.push(c.to_ascii_lowercase());
    }
    normalized
}
