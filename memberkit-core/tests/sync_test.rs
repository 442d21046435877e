use memberkit_core::format::PassthroughFormatter;
use memberkit_core::sync::{SyncOptions, Synchronizer};
use memberkit_core::tree::ManifestTree;
use memberkit_core::workspace::{WorkspaceMember, WorkspaceMetadata};
use memberkit_core::Error;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use toml_edit::DocumentMut;

const ROOT: &str = r#"[project]
name = "workspace-root"
version = "0.1.0"

[build-system]
requires = ["hatchling"]
build-backend = "hatchling.build"

[tool.ruff]
line-length = 100
"#;

fn setup(root_content: &str, members: &[(&str, &str)]) -> (TempDir, ManifestTree) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join("pyproject.toml"), root_content).unwrap();

    let mut workspace_members = vec![WorkspaceMember {
        name: "workspace-root".to_string(),
        path: root.to_path_buf(),
    }];
    for (name, content) in members {
        let dir = root.join("packages").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("pyproject.toml"), content).unwrap();
        workspace_members.push(WorkspaceMember {
            name: name.to_string(),
            path: dir,
        });
    }

    let metadata = WorkspaceMetadata {
        workspace_root: root.to_path_buf(),
        members: workspace_members,
    };
    let tree = ManifestTree::discover(&metadata, Arc::new(PassthroughFormatter));
    (temp_dir, tree)
}

fn read_member(root: &Path, name: &str) -> DocumentMut {
    fs::read_to_string(root.join("packages").join(name).join("pyproject.toml"))
        .unwrap()
        .parse()
        .unwrap()
}

fn member(name: &str) -> String {
    format!("[project]\nname = \"{}\"\nversion = \"0\"\n", name)
}

#[test]
fn test_sync_copies_build_system_and_sets_version() {
    let (temp_dir, mut tree) = setup(ROOT, &[("pkg-a", member("pkg-a").as_str())]);

    let report = Synchronizer::new(SyncOptions::default())
        .sync(&mut tree)
        .unwrap();
    assert_eq!(report.members.len(), 1);
    assert_eq!(report.members[0].name, "pkg-a");
    assert!(report.members[0].changed);

    let doc = read_member(temp_dir.path(), "pkg-a");
    assert_eq!(
        doc["build-system"]["build-backend"].as_str(),
        Some("hatchling.build")
    );
    assert_eq!(
        doc["build-system"]["requires"].as_array().map(|a| a.len()),
        Some(1)
    );

    let version = doc["project"]["version"].as_str().unwrap();
    let pattern = Regex::new(r"^0\.0\.1(\+.*)?$").unwrap();
    assert!(pattern.is_match(version), "unexpected version {}", version);
    assert_eq!(report.members[0].version, version);
}

#[test]
fn test_sync_overwrites_member_build_system() {
    let content = format!(
        "{}\n[build-system]\nrequires = [\"setuptools\"]\nbuild-backend = \"setuptools.build_meta\"\n",
        member("pkg-a")
    );
    let (temp_dir, mut tree) = setup(ROOT, &[("pkg-a", content.as_str())]);

    Synchronizer::new(SyncOptions::default())
        .sync(&mut tree)
        .unwrap();

    let doc = read_member(temp_dir.path(), "pkg-a");
    assert_eq!(
        doc["build-system"]["build-backend"].as_str(),
        Some("hatchling.build")
    );
    assert_eq!(
        doc["build-system"]["requires"][0].as_str(),
        Some("hatchling")
    );
}

#[test]
fn test_sync_is_idempotent() {
    let (temp_dir, mut tree) = setup(ROOT, &[("pkg-a", member("pkg-a").as_str())]);
    let synchronizer = Synchronizer::new(SyncOptions::default());

    synchronizer.sync(&mut tree).unwrap();
    let first = fs::read_to_string(temp_dir.path().join("packages/pkg-a/pyproject.toml")).unwrap();

    let report = synchronizer.sync(&mut tree).unwrap();
    assert_eq!(report.changed_count(), 0);
    let second = fs::read_to_string(temp_dir.path().join("packages/pkg-a/pyproject.toml")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_sync_explicit_version_override() {
    let (temp_dir, mut tree) = setup(ROOT, &[("pkg-a", member("pkg-a").as_str())]);

    let options = SyncOptions {
        version: Some(semver::Version::new(2, 3, 4)),
        format_root: false,
    };
    Synchronizer::new(options).sync(&mut tree).unwrap();

    let doc = read_member(temp_dir.path(), "pkg-a");
    assert!(doc["project"]["version"]
        .as_str()
        .unwrap()
        .starts_with("2.3.5"));
}

#[test]
fn test_sync_stored_version_and_shared_sections() {
    let root = format!(
        "{}\n[tool.memberkit]\nshared = [\"tool.ruff\"]\nversion = \"1.4.0\"\n",
        ROOT
    );
    let (temp_dir, mut tree) = setup(&root, &[("pkg-a", member("pkg-a").as_str())]);

    Synchronizer::new(SyncOptions::default())
        .sync(&mut tree)
        .unwrap();

    let doc = read_member(temp_dir.path(), "pkg-a");
    assert!(doc["project"]["version"]
        .as_str()
        .unwrap()
        .starts_with("1.4.1"));
    assert_eq!(doc["tool"]["ruff"]["line-length"].as_integer(), Some(100));
    assert!(doc["tool"].get("memberkit").is_none());
}

#[test]
fn test_sync_invalid_stored_version() {
    let root = format!("{}\n[tool.memberkit]\nversion = \"latest\"\n", ROOT);
    let (_temp_dir, mut tree) = setup(&root, &[("pkg-a", member("pkg-a").as_str())]);

    let result = Synchronizer::new(SyncOptions::default()).sync(&mut tree);
    assert!(matches!(result, Err(Error::Version(_))));
}

#[test]
fn test_sync_merges_member_project_defaults() {
    let root = format!(
        "{}\n[tool.member-project]\nlicense = \"MIT\"\nclassifiers = [\"Typing :: Typed\", \"Framework :: Pytest\"]\n\n[tool.member-project.urls]\nHomepage = \"https://example.com\"\n",
        ROOT
    );
    let content = format!(
        "{}license = \"Proprietary\"\nclassifiers = [\"Framework :: Pytest\", \"Private :: Do Not Upload\"]\n",
        member("pkg-a")
    );
    let (temp_dir, mut tree) = setup(&root, &[("pkg-a", content.as_str())]);

    Synchronizer::new(SyncOptions::default())
        .sync(&mut tree)
        .unwrap();

    let doc = read_member(temp_dir.path(), "pkg-a");
    assert_eq!(doc["project"]["license"].as_str(), Some("MIT"));
    let classifiers: Vec<&str> = doc["project"]["classifiers"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|value| value.as_str())
        .collect();
    assert_eq!(
        classifiers,
        vec![
            "Framework :: Pytest",
            "Private :: Do Not Upload",
            "Typing :: Typed"
        ]
    );
    assert_eq!(
        doc["project"]["urls"]["Homepage"].as_str(),
        Some("https://example.com")
    );
}

#[test]
fn test_sync_links_workspace_dependencies() {
    let content_b = format!(
        "{}dependencies = [\"pkg-a>=0.1\", \"requests\"]\n",
        member("pkg-b")
    );
    let (temp_dir, mut tree) = setup(
        ROOT,
        &[("pkg-a", member("pkg-a").as_str()), ("pkg-b", content_b.as_str())],
    );

    Synchronizer::new(SyncOptions::default())
        .sync(&mut tree)
        .unwrap();

    let doc = read_member(temp_dir.path(), "pkg-b");
    assert_eq!(
        doc["tool"]["uv"]["sources"]["pkg-a"]["workspace"].as_bool(),
        Some(true)
    );
    assert!(doc["tool"]["uv"]["sources"].get("requests").is_none());

    let doc_a = read_member(temp_dir.path(), "pkg-a");
    assert!(doc_a.get("tool").is_none());
}

#[test]
fn test_sync_filtered_tree_only_touches_selection() {
    let (temp_dir, tree) = setup(
        ROOT,
        &[("pkg-a", member("pkg-a").as_str()), ("pkg-b", member("pkg-b").as_str())],
    );
    let mut tree = tree.filter(&["pkg-b"], true).unwrap();

    let report = Synchronizer::new(SyncOptions::default())
        .sync(&mut tree)
        .unwrap();
    assert_eq!(report.members.len(), 1);

    let untouched =
        fs::read_to_string(temp_dir.path().join("packages/pkg-a/pyproject.toml")).unwrap();
    assert_eq!(untouched, member("pkg-a"));
    assert!(read_member(temp_dir.path(), "pkg-b").contains_key("build-system"));
}

#[test]
fn test_sync_leaves_root_unchanged() {
    let (temp_dir, mut tree) = setup(ROOT, &[("pkg-a", member("pkg-a").as_str())]);

    let options = SyncOptions {
        version: None,
        format_root: true,
    };
    let report = Synchronizer::new(options).sync(&mut tree).unwrap();
    assert!(!report.root_changed);
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("pyproject.toml")).unwrap(),
        ROOT
    );
}

fn git(dir: &Path, args: &[&str]) -> bool {
    std::process::Command::new("git")
        .args([
            "-c",
            "user.name=memberkit",
            "-c",
            "user.email=memberkit@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[test]
fn test_sync_is_stable_in_tagged_repository() {
    let (temp_dir, mut tree) = setup(ROOT, &[("pkg-a", member("pkg-a").as_str())]);
    let root = temp_dir.path();
    if !git(root, &["init", "-q"]) {
        eprintln!("git unavailable, skipping");
        return;
    }
    assert!(git(root, &["add", "-A"]));
    assert!(git(root, &["commit", "-q", "-m", "initial"]));
    assert!(git(root, &["tag", "v1.0.0"]));

    let synchronizer = Synchronizer::new(SyncOptions::default());
    let first = synchronizer.sync(&mut tree).unwrap();
    assert!(first.members[0].changed);
    assert_eq!(first.members[0].version, "1.0.1");

    let second = synchronizer.sync(&mut tree).unwrap();
    assert!(!second.members[0].changed);
    assert_eq!(second.members[0].version, "1.0.1");

    assert!(git(root, &["commit", "-q", "-a", "-m", "sync"]));
    let third = synchronizer.sync(&mut tree).unwrap();
    assert!(!third.members[0].changed);
    assert_eq!(third.members[0].version, "1.0.1");

    fs::write(root.join("packages/pkg-a/module.py"), "").unwrap();
    let dirty = synchronizer.sync(&mut tree).unwrap();
    assert!(dirty.members[0].changed);
    assert!(dirty.members[0].version.ends_with(".dirty"));
}
