//! End-to-end tests against the built binary. They need `uv` on PATH.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn create_workspace(dir: &Path) {
    fs::write(
        dir.join("pyproject.toml"),
        r#"[project]
name = "demo-workspace"
version = "0.1.0"
requires-python = ">=3.8"

[build-system]
requires = ["hatchling"]
build-backend = "hatchling.build"

[tool.uv.workspace]
members = ["packages/*"]
"#,
    )
    .unwrap();

    let pkg_dir = dir.join("packages").join("pkg-a");
    fs::create_dir_all(pkg_dir.join("src").join("pkg_a")).unwrap();
    fs::write(pkg_dir.join("src").join("pkg_a").join("__init__.py"), "").unwrap();
    fs::write(
        pkg_dir.join("pyproject.toml"),
        r#"[project]
name = "pkg-a"
version = "0"
requires-python = ">=3.8"
"#,
    )
    .unwrap();
}

fn get_memberkit_binary() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop();
    path.join("target").join("debug").join("memberkit")
}

fn memberkit(dir: &Path) -> Command {
    let mut command = Command::new(get_memberkit_binary());
    command.arg("--working-directory").arg(dir).arg("--no-format");
    command
}

#[test]
#[ignore]
fn test_sync_command() {
    let temp_dir = TempDir::new().unwrap();
    create_workspace(temp_dir.path());

    let output = memberkit(temp_dir.path())
        .arg("sync")
        .output()
        .expect("Failed to execute memberkit sync");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pkg-a"));

    let manifest =
        fs::read_to_string(temp_dir.path().join("packages/pkg-a/pyproject.toml")).unwrap();
    assert!(manifest.contains("build-backend = \"hatchling.build\""));
    assert!(manifest.contains("version = \"0.0.1"));
}

#[test]
#[ignore]
fn test_sync_unknown_member_fails() {
    let temp_dir = TempDir::new().unwrap();
    create_workspace(temp_dir.path());

    let output = memberkit(temp_dir.path())
        .arg("sync")
        .arg("pkg-missing")
        .output()
        .expect("Failed to execute memberkit sync");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pkg-missing"));
}

#[test]
#[ignore]
fn test_create_command() {
    let temp_dir = TempDir::new().unwrap();
    create_workspace(temp_dir.path());

    let output = memberkit(temp_dir.path())
        .args(["create", "pkg-b", "-d", "pkg-a"])
        .output()
        .expect("Failed to execute memberkit create");

    assert!(output.status.success());
    let project_dir = temp_dir.path().join("packages").join("pkg-b");
    assert!(project_dir.join("src/pkg_b/__init__.py").is_file());
    let manifest = fs::read_to_string(project_dir.join("pyproject.toml")).unwrap();
    assert!(manifest.contains("\"pkg-a\""));
    assert!(manifest.contains("workspace = true"));
}

#[test]
#[ignore]
fn test_readme_update_command() {
    let temp_dir = TempDir::new().unwrap();
    create_workspace(temp_dir.path());
    fs::write(
        temp_dir.path().join("README.md"),
        "# Demo\n\n<!-- BEGIN:cmd echo 'hi' -->\n<!-- END:cmd -->\n",
    )
    .unwrap();

    let output = memberkit(temp_dir.path())
        .args(["readme", "update-cmd", "--readme"])
        .arg(temp_dir.path().join("README.md"))
        .output()
        .expect("Failed to execute memberkit readme update-cmd");

    assert!(output.status.success());
    let readme = fs::read_to_string(temp_dir.path().join("README.md")).unwrap();
    assert!(readme.contains("```shell\nhi\n```"));
}
