//! Integration tests for the projzip binary
//!
//! Every test points HOME and the XDG directories at a scratch directory so
//! settings and logs never touch the user's real ones.

use assert_cmd::Command;
use camino::{Utf8Path, Utf8PathBuf};
use predicates::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use tempfile::TempDir;

#[allow(deprecated)]
fn projzip(home: &Utf8Path) -> Command {
    let mut cmd = Command::cargo_bin("projzip").unwrap();
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_STATE_HOME", home.join("state"))
        .env_remove("PROJZIP_CONFIG_DIR")
        .env_remove("PROJZIP_LOG_DIR")
        .env_remove("RUST_LOG");
    cmd
}

fn create_test_dirs() -> (TempDir, Utf8PathBuf, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let base = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let root = base.join("root");
    let home = base.join("home");
    fs::create_dir_all(&root).unwrap();
    fs::create_dir_all(&home).unwrap();
    (temp_dir, root, home)
}

fn write(path: Utf8PathBuf, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Every path under `root`, relative and `/`-separated
fn tree_entries(root: &Utf8Path) -> BTreeSet<String> {
    let mut entries = BTreeSet::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in dir.read_dir_utf8().unwrap() {
            let path = entry.unwrap().into_path();
            entries.insert(path.strip_prefix(root).unwrap().as_str().replace('\\', "/"));
            if path.is_dir() {
                stack.push(path);
            }
        }
    }
    entries
}

#[test]
fn help_lists_options() {
    let (_temp, _root, home) = create_test_dirs();
    projzip(&home).arg("--help").assert().success().stdout(
        predicate::str::contains("--dry-run")
            .and(predicate::str::contains("--force"))
            .and(predicate::str::contains("--no-clobber"))
            .and(predicate::str::contains("--exclude-ext")),
    );
}

#[test]
fn force_conflicts_with_no_clobber() {
    let (_temp, root, home) = create_test_dirs();
    projzip(&home)
        .args(["--force", "--no-clobber", root.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn dry_run_from_inside_root_changes_nothing() {
    let (_temp, root, home) = create_test_dirs();
    write(root.join("ProjA/README.md"), "# A");
    write(root.join("ProjA/node_modules/dep/index.js"), "");
    write(root.join("ProjB/.zipignore"), "");
    write(root.join("ProjB/package.json"), "{}");
    let before = tree_entries(&root);

    projzip(&home)
        .current_dir(&root)
        .args(["--dry-run", "--no-console", "--archiver", "library", "."])
        .assert()
        .success();

    assert_eq!(tree_entries(&root), before);
    assert!(!home.join("config/projzip").exists());
    if cfg!(target_os = "linux") {
        assert!(home.join("state/projzip/logs").is_dir());
    }
}

#[test]
fn run_from_inside_root_only_adds_archives() {
    let (_temp, root, home) = create_test_dirs();
    write(root.join("ProjA/README.md"), "# A");
    write(root.join("ProjA/src/main.rs"), "fn main() {}");

    projzip(&home)
        .current_dir(&root)
        .args(["--no-console", "--archiver", "library", "."])
        .assert()
        .success();

    let expected: BTreeSet<String> = ["compressed", "compressed/ProjA.zip"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(tree_entries(&root), expected);
}

#[test]
fn write_config_creates_settings_file() {
    let (_temp, _root, home) = create_test_dirs();
    let config_dir = home.join("custom");

    projzip(&home)
        .args(["--write-config", "--config-dir", config_dir.as_str(), "--exclude-ext", "log"])
        .assert()
        .success()
        .stdout(predicate::str::contains("projzip.yaml"));

    let yaml = fs::read_to_string(config_dir.join("projzip.yaml")).unwrap();
    assert!(yaml.contains("- log"));
}

#[test]
fn missing_root_fails() {
    let (_temp, root, home) = create_test_dirs();
    projzip(&home)
        .args(["--no-console", root.join("missing").as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not accessible"));
}
