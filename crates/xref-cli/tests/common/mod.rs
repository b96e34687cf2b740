//! Shared test harness for gitxref integration tests.
//!
//! Drives real git with a fully pinned environment so fixture repositories
//! hash identically across machines and CI runners, and runs the compiled
//! gitxref binary against them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

/// Captured output from running a command.
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Discover the path to the compiled `gitxref` binary.
pub fn gitxref_bin() -> PathBuf {
    let mut path = std::env::current_exe()
        .expect("current_exe")
        .parent()
        .expect("deps dir")
        .parent()
        .expect("target dir")
        .to_path_buf();
    path.push("gitxref");
    path
}

/// Apply the full set of pinned environment variables to a `Command`.
fn pin_env(cmd: &mut Command, dir: &Path) {
    cmd.env("GIT_AUTHOR_NAME", "Test Author")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_AUTHOR_DATE", "1234567890 +0000")
        .env("GIT_COMMITTER_NAME", "Test Committer")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_DATE", "1234567890 +0000")
        .env("TZ", "UTC")
        .env("LC_ALL", "C")
        .env("LANG", "C")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("HOME", dir.parent().unwrap_or(dir));
}

fn capture(mut cmd: Command) -> CommandResult {
    let output = cmd.output().expect("failed to run command");
    CommandResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    }
}

/// Run C git in `dir` with the given arguments.
pub fn git(dir: &Path, args: &[&str]) -> CommandResult {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    pin_env(&mut cmd, dir);
    let result = capture(cmd);
    assert_eq!(
        result.exit_code, 0,
        "git {args:?} failed in {}: {}",
        dir.display(),
        result.stderr
    );
    result
}

/// Run the gitxref binary with the given arguments.
pub fn gitxref(dir: &Path, args: &[&str]) -> CommandResult {
    let mut cmd = Command::new(gitxref_bin());
    cmd.args(args).current_dir(dir);
    pin_env(&mut cmd, dir);
    capture(cmd)
}

/// Initialise an empty repository with pinned identity.
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-q", "-b", "main"]);
    git(dir, &["config", "user.name", "Test Author"]);
    git(dir, &["config", "user.email", "test@example.com"]);
}

/// Write a file, creating parent directories as needed.
pub fn write_file(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(path, contents).expect("write file");
}

/// Stage everything and commit; returns the full commit hex OID.
pub fn commit_all(dir: &Path, message: &str) -> String {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "--allow-empty", "-m", message]);
    head_oid(dir)
}

/// The full hex OID of HEAD.
pub fn head_oid(dir: &Path) -> String {
    git(dir, &["rev-parse", "HEAD"]).stdout.trim().to_string()
}

/// Short (12 hex digit) form of a full OID, as gitxref prints it.
pub fn short(oid: &str) -> String {
    oid[..12].to_string()
}

/// Split a gitxref report into (header, indented-path) line groups.
pub fn parse_report(stdout: &str) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for line in stdout.lines() {
        if let Some(path) = line.strip_prefix("    ") {
            groups
                .last_mut()
                .expect("indented line before any group header")
                .1
                .push(path.to_string());
        } else {
            groups.push((line.to_string(), Vec::new()));
        }
    }
    groups
}
