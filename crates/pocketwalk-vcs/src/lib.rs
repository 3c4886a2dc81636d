//! `VcsController`: decides when to stage and commit changes, and runs the
//! commit flow (status, diff, commit-message prompt, commit) as a
//! cancellable background task.

mod git;

use anyhow::Result;
use pocketwalk_core::{AggregateToolState, Config};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

pub use git::StatusEntry;

struct RunningCommit {
    cancel: Arc<Notify>,
    handle: JoinHandle<Result<()>>,
}

pub struct VcsController {
    repo_root: PathBuf,
    running: Option<RunningCommit>,
    notified: bool,
}

#[derive(Debug, Default, Clone)]
struct VcsChanges {
    to_remove: Vec<String>,
    to_add: Vec<String>,
    changed: Vec<String>,
}

impl VcsChanges {
    fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty() && self.changed.is_empty()
    }
}

impl VcsController {
    pub fn new(repo_root: PathBuf) -> Self {
        Self {
            repo_root,
            running: None,
            notified: false,
        }
    }

    pub fn vcs_running(&self) -> bool {
        self.running.is_some()
    }

    /// Cancel any in-flight commit task (e.g. on shutdown).
    pub async fn cleanup(&mut self) {
        if let Some(running) = self.running.take() {
            info!("cleaning up vcs tasks...");
            running.cancel.notify_one();
            let _ = running.handle.await;
            info!("done");
        }
    }

    /// Advance the commit state machine for this tick. Propagates a failed
    /// commit task's error the next time it is observed.
    pub async fn update(
        &mut self,
        config: &Config,
        tool_state: &AggregateToolState,
    ) -> Result<()> {
        if let Some(running) = &self.running {
            if running.handle.is_finished() {
                let running = self.running.take().unwrap();
                running.handle.await??;
                self.notified = true;
                return Ok(());
            }
        }

        let any_running = any_tools_running(tool_state);
        let not_all_passed = not_all_tools_passed(tool_state);

        if self.vcs_running()
            && (any_running
                || not_all_passed
                || !self.paths_changed(config).await?
                || config.no_vcs)
        {
            self.stop_vcs().await;
            self.notified = false;
        } else if !config.no_vcs
            && !self.vcs_running()
            && !(any_running || not_all_passed)
            && self.paths_changed(config).await?
        {
            self.start_vcs(config).await?;
            self.notified = false;
        } else if !config.no_vcs
            && !self.vcs_running()
            && !any_running
            && !not_all_passed
            && !self.notified
        {
            info!("no changes detected - no updates to commit.");
            self.notified = true;
        }

        Ok(())
    }

    async fn stop_vcs(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.notify_one();
            let _ = running.handle.await;
        }
    }

    async fn start_vcs(&mut self, config: &Config) -> Result<()> {
        let cancel = Arc::new(Notify::new());
        let repo_root = self.repo_root.clone();
        let tracked = config.tracked_paths();
        let task_cancel = Arc::clone(&cancel);
        let handle = tokio::spawn(async move { run_commit_flow(repo_root, tracked, task_cancel).await });
        self.running = Some(RunningCommit { cancel, handle });
        Ok(())
    }

    async fn paths_changed(&self, config: &Config) -> Result<bool> {
        let changes = compute_vcs_changes(&self.repo_root, &config.tracked_paths()).await?;
        Ok(!changes.is_empty())
    }
}

fn any_tools_running(tool_state: &AggregateToolState) -> bool {
    tool_state.values().any(|s| s.running)
}

fn not_all_tools_passed(tool_state: &AggregateToolState) -> bool {
    !tool_state.values().all(|s| s.return_code == Some(0))
}

async fn compute_vcs_changes(repo_root: &std::path::Path, tracked: &[String]) -> Result<VcsChanges> {
    let status = git::status_porcelain(repo_root).await?;
    let tracked_set: BTreeSet<&str> = tracked.iter().map(String::as_str).collect();

    let mut to_remove = Vec::new();
    let mut untracked = Vec::new();
    let mut modified = Vec::new();
    for entry in &status {
        match entry {
            StatusEntry::Deleted(path) => to_remove.push(path.clone()),
            StatusEntry::Untracked(path) => untracked.push(path.clone()),
            StatusEntry::Modified(path) => modified.push(path.clone()),
            StatusEntry::Other => {}
        }
    }

    let tracked_to_add: Vec<String> = untracked
        .iter()
        .filter(|p| tracked_set.contains(p.as_str()))
        .cloned()
        .collect();
    let new_dirs: Vec<&String> = untracked.iter().filter(|p| p.ends_with('/')).collect();
    let in_new_dir: Vec<String> = tracked
        .iter()
        .filter(|t| new_dirs.iter().any(|d| t.starts_with(d.as_str())))
        .cloned()
        .collect();
    let to_add: Vec<String> = tracked_to_add.into_iter().chain(in_new_dir).collect();

    let changed: Vec<String> = modified
        .into_iter()
        .filter(|p| tracked_set.contains(p.as_str()))
        .collect();

    Ok(VcsChanges {
        to_remove,
        to_add,
        changed,
    })
}

async fn run_commit_flow(
    repo_root: PathBuf,
    tracked: Vec<String>,
    cancel: Arc<Notify>,
) -> Result<()> {
    let changes = compute_vcs_changes(&repo_root, &tracked).await?;

    info!(to_remove = ?changes.to_remove, "removing");
    info!(to_add = ?changes.to_add, "adding");
    let diff = git::diff_color(&repo_root, &changes.changed).await?;
    if !diff.is_empty() {
        println!("{diff}");
    }

    println!("your files are still being monitored for changes.");
    println!(
        "if changes are made, the commit will be cancelled and you will be reprompted when all the checks pass again."
    );

    let message = tokio::select! {
        line = prompt_commit_message() => line?,
        _ = cancel.notified() => {
            info!("commit prompt cancelled");
            return Ok(());
        }
    };

    git::rm(&repo_root, &changes.to_remove).await?;
    let mut to_add = changes.to_add;
    to_add.extend(changes.changed);
    git::add(&repo_root, &to_add).await?;
    git::commit(&repo_root, &message).await?;
    Ok(())
}

async fn prompt_commit_message() -> Result<String> {
    use std::io::Write;
    print!("commit message: ");
    std::io::stdout().flush().ok();

    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    reader.read_line(&mut line).await?;
    Ok(line.trim_end().to_string())
}
