// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Integration tests for the stew and pypi command lines
//!
//! Only commands that never shell out to poetry are exercised here.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

fn make_test_project(root: &Path, folder: &str, name: &str, extra: &str) -> PathBuf {
    let path = root.join(folder);
    fs::create_dir_all(&path).unwrap();
    fs::write(
        path.join("pyproject.toml"),
        format!(
            "[tool.poetry]\nname = \"{name}\"\nversion = \"0.1.0\"\ndescription = \"\"\nauthors = []\n\n\
             [tool.poetry.dependencies]\npython = \"^3.8\"\n{extra}"
        ),
    )
    .unwrap();
    path
}

/// A library, an app using it, and a pydev project gathering both
fn make_test_repo() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join(".git")).unwrap();
    make_test_project(
        temp.path(),
        "libs/core-lib",
        "core-lib",
        "\n[tool.poetry.dev-dependencies]\npytest = \"^7.0\"\n",
    );
    make_test_project(
        temp.path(),
        "apps/web-app",
        "web-app",
        "core-lib = { path = \"../../libs/core-lib\" }\n\n[tool.poetry.dev-dependencies]\nmypy = \"^1.0\"\n",
    );
    make_test_project(
        temp.path(),
        "pydev",
        "pydev",
        "core-lib = { path = \"../libs/core-lib\" }\nweb-app = { path = \"../apps/web-app\" }\n\n\
         [tool.stew]\npydev = true\n",
    );
    temp
}

fn stew(repo: &TempDir) -> Command {
    let mut command = Command::cargo_bin("stew").unwrap();
    command
        .arg("--path")
        .arg(repo.path())
        .arg("--no-color")
        .env_remove("STEW_DRY_RUN")
        .env_remove("STEW_CI_MODE")
        .env_remove("VIRTUAL_ENV");
    command
}

// =============================================================================
// stew
// =============================================================================

#[test]
fn test_locate_prints_the_project_folder() {
    let repo = make_test_repo();
    stew(&repo)
        .args(["locate", "core_lib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("core-lib"))
        .stdout(predicate::str::contains("\u{2728}").not());
}

#[test]
fn test_locate_suggests_partial_matches() {
    let repo = make_test_repo();
    stew(&repo)
        .args(["locate", "core"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Exact match required but partial matches were found:"))
        .stderr(predicate::str::contains("core-lib"));
}

#[test]
fn test_locate_unknown_project() {
    let repo = make_test_repo();
    stew(&repo)
        .args(["locate", "nothing"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("nothing cannot be found"));
}

#[test]
fn test_fresh_eggs() {
    let repo = make_test_repo();
    let egg = repo.path().join("libs/core-lib/core_lib.egg-info");
    fs::create_dir_all(&egg).unwrap();

    stew(&repo)
        .arg("fresh-eggs")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted:"))
        .stdout(predicate::str::contains("You may want to call 'poetry install'."));
    assert!(!egg.exists());
}

#[test]
fn test_pull_dev_requirements_dry_run() {
    let repo = make_test_repo();
    let toml_path = repo.path().join("pydev/pyproject.toml");
    let before = fs::read_to_string(&toml_path).unwrap();

    stew(&repo)
        .args(["pull-dev-requirements", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(dry run) Updated pydev with new dev requirements."));
    assert_eq!(fs::read_to_string(&toml_path).unwrap(), before);
}

#[test]
fn test_check_outdated_without_locks() {
    let repo = make_test_repo();
    stew(&repo)
        .arg("check-outdated")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("outdated file(s)."))
        .stderr(predicate::str::contains("Run \"stew fix-outdated\" to update all outdated files."));
}

#[test]
fn test_missing_projects_is_a_controlled_failure() {
    let empty = TempDir::new().unwrap();
    stew(&empty)
        .arg("fresh-eggs")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No python projects were found."))
        .stderr(predicate::str::contains("unhandled").not());
}

#[test]
fn test_completions() {
    Command::cargo_bin("stew")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pull-dev-requirements"));
}

// =============================================================================
// pypi
// =============================================================================

#[test]
fn test_pypi_rejects_prerelease_minimum() {
    Command::cargo_bin("pypi")
        .unwrap()
        .args(["next-version", "some-package", "--minimum-version", "1.0a1", "--no-color"])
        .assert()
        .failure();
}

#[test]
fn test_pypi_help_lists_commands() {
    Command::cargo_bin("pypi")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("current-version"))
        .stdout(predicate::str::contains("raise-if-exists"));
}
