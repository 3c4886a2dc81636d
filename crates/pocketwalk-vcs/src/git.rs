//! Thin wrappers over the `git` CLI. Every call shells out rather than
//! linking a git library, matching how the rest of the workspace talks to
//! version control.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

/// One parsed line of `git status --porcelain` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEntry {
    Deleted(String),
    Untracked(String),
    Modified(String),
    Other,
}

pub async fn status_porcelain(repo_root: &Path) -> Result<Vec<StatusEntry>> {
    let output = Command::new("git")
        .arg("status")
        .arg("--porcelain")
        .current_dir(repo_root)
        .output()
        .await
        .context("running git status --porcelain")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().map(parse_status_line).collect())
}

fn parse_status_line(line: &str) -> StatusEntry {
    let trimmed = line.trim_start();
    let path = trimmed
        .split_once(' ')
        .map(|(_, rest)| rest.trim())
        .unwrap_or(trimmed)
        .to_string();

    if trimmed.starts_with("??") {
        StatusEntry::Untracked(path)
    } else if trimmed.starts_with('D') {
        StatusEntry::Deleted(path)
    } else if trimmed.starts_with('M') {
        StatusEntry::Modified(path)
    } else {
        StatusEntry::Other
    }
}

pub async fn diff_color(repo_root: &Path, paths: &[String]) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.arg("diff").arg("--color").arg("--").current_dir(repo_root);
    cmd.args(paths);
    let output = cmd.output().await.context("running git diff --color")?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub async fn rm(repo_root: &Path, paths: &[String]) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let status = Command::new("git")
        .arg("rm")
        .args(paths)
        .current_dir(repo_root)
        .status()
        .await
        .context("running git rm")?;
    anyhow::ensure!(status.success(), "git rm exited with {status}");
    Ok(())
}

pub async fn add(repo_root: &Path, paths: &[String]) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let status = Command::new("git")
        .arg("add")
        .args(paths)
        .current_dir(repo_root)
        .status()
        .await
        .context("running git add")?;
    anyhow::ensure!(status.success(), "git add exited with {status}");
    Ok(())
}

pub async fn commit(repo_root: &Path, message: &str) -> Result<()> {
    let status = Command::new("git")
        .arg("commit")
        .arg("-m")
        .arg(message)
        .current_dir(repo_root)
        .status()
        .await
        .context("running git commit")?;
    anyhow::ensure!(status.success(), "git commit exited with {status}");
    Ok(())
}
