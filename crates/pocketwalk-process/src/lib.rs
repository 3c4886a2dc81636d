//! `ToolRunner`: spawns configured tools concurrently, tracks their running
//! and completed state, and replays cached results for unchanged tools.

mod rc_cache;
mod spawn;

use anyhow::Result;
use indexmap::IndexMap;
use pocketwalk_core::{AggregateToolState, Context, ContextDelta, Tool, ToolStatus};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Sent once per tool as its run completes, letting a caller (the
/// Supervisor, in practice) persist the finished context via `ContextEngine`
/// without `ToolRunner` depending on it directly.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub tool: String,
    pub context: Context,
    pub return_code: i32,
}

struct RunningTool {
    context: Context,
    cancel: Arc<Notify>,
    handle: JoinHandle<()>,
}

pub struct ToolRunner {
    cache_dir: PathBuf,
    running: BTreeMap<String, RunningTool>,
    return_codes: BTreeMap<String, i32>,
    reported_tools: BTreeMap<String, Context>,
}

impl ToolRunner {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            running: BTreeMap::new(),
            return_codes: BTreeMap::new(),
            reported_tools: BTreeMap::new(),
        }
    }

    /// Snapshot of every known tool's running/return-code state.
    pub fn tool_state(&self) -> AggregateToolState {
        let mut state = AggregateToolState::new();
        for (tool, rc) in &self.return_codes {
            state.insert(
                tool.clone(),
                ToolStatus {
                    running: false,
                    return_code: Some(*rc),
                },
            );
        }
        for tool in self.running.keys() {
            state.insert(
                tool.clone(),
                ToolStatus {
                    running: true,
                    return_code: None,
                },
            );
        }
        state
    }

    pub fn all_tools_passed(&self, tools: &[String]) -> bool {
        tools.iter().all(|t| self.return_codes.get(t) == Some(&0))
    }

    pub fn any_tools_not_done(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn return_codes(&self, tools: &[String]) -> Vec<i32> {
        tools
            .iter()
            .filter_map(|t| self.return_codes.get(t).copied())
            .collect()
    }

    /// Start every tool in `contexts_for_tools` that is not already running,
    /// each as an independently cancellable task.
    pub fn ensure_tools_running(
        &mut self,
        contexts_for_tools: &BTreeMap<String, ContextDelta>,
        tools: &IndexMap<String, Tool>,
        on_completion: mpsc::UnboundedSender<CompletionEvent>,
    ) {
        let to_start: Vec<String> = contexts_for_tools
            .keys()
            .filter(|t| !self.running.contains_key(*t))
            .cloned()
            .collect();

        if !to_start.is_empty() {
            info!(tools = ?to_start, "starting tools");
        }

        for tool_name in to_start {
            self.return_codes.remove(&tool_name);
            let Some(delta) = contexts_for_tools.get(&tool_name) else {
                continue;
            };
            let Some(tool) = tools.get(&tool_name) else {
                continue;
            };

            let cancel = Arc::new(Notify::new());
            let context = delta.current.clone();
            let handle = spawn_tool_task(
                tool_name.clone(),
                tool.clone(),
                delta.clone(),
                self.cache_dir.clone(),
                Arc::clone(&cancel),
                on_completion.clone(),
            );

            self.running.insert(
                tool_name,
                RunningTool {
                    context,
                    cancel,
                    handle,
                },
            );
        }
    }

    /// Tools whose current context fails a precondition: either the
    /// precondition tool itself hasn't returned 0, or the precondition tool
    /// is about to re-run this tick.
    pub fn tools_failing_preconditions(
        &self,
        current_state: &BTreeMap<String, ContextDelta>,
        tools_to_run: &[String],
    ) -> BTreeMap<String, ContextDelta> {
        let mut failing = BTreeMap::new();
        for (tool, delta) in current_state {
            let preconditions_passed = delta
                .current
                .preconditions
                .iter()
                .all(|p| self.return_codes.get(p) == Some(&0));
            let precondition_about_to_rerun = delta
                .current
                .preconditions
                .iter()
                .any(|p| tools_to_run.contains(p));
            if !preconditions_passed || precondition_about_to_rerun {
                failing.insert(tool.clone(), delta.clone());
            }
        }
        failing
    }

    /// Tools whose context has already been reported to the caller, so a
    /// duplicate "replay" can be skipped.
    pub fn filter_out_reported_tools(
        &self,
        tools_with_contexts: &BTreeMap<String, Context>,
    ) -> BTreeMap<String, Context> {
        tools_with_contexts
            .iter()
            .filter(|(tool, context)| self.reported_tools.get(*tool) != Some(context))
            .map(|(tool, context)| (tool.clone(), context.clone()))
            .collect()
    }

    /// Absorb a tool's natural-completion event: drop its running entry,
    /// record the return code it reported, and mark its context reported so
    /// a later tick with the same context replays rather than re-runs.
    ///
    /// Callers are expected to persist the context via `ContextEngine`
    /// themselves (see `CompletionEvent`'s docs) -- `ToolRunner` never calls
    /// into `ContextEngine` directly.
    pub async fn record_completion(&mut self, event: &CompletionEvent) {
        if let Some(running) = self.running.remove(&event.tool) {
            let _ = running.handle.await;
        }
        self.return_codes
            .insert(event.tool.clone(), event.return_code);
        self.reported_tools
            .insert(event.tool.clone(), event.context.clone());
    }

    /// Cancel every running tool, marking each as return code 130 (the
    /// conventional SIGINT exit status).
    pub async fn cleanup(&mut self) {
        info!("cleaning up tools");
        let tools_to_stop: Vec<String> = self.running.keys().cloned().collect();
        for tool in &tools_to_stop {
            self.stop_one(tool).await;
            self.return_codes.insert(tool.clone(), 130);
        }
        if !tools_to_stop.is_empty() {
            info!(tools = ?tools_to_stop, "cancelled running tools");
        }
        info!("done");
    }

    /// Stop any running tool whose live context no longer matches the
    /// context it was started with.
    pub async fn ensure_stale_tools_stopped(
        &mut self,
        contexts_for_tools: &BTreeMap<String, ContextDelta>,
    ) {
        let stale: Vec<String> = self
            .running
            .iter()
            .filter(|(tool, running)| {
                contexts_for_tools
                    .get(*tool)
                    .is_some_and(|delta| delta.current != running.context)
            })
            .map(|(tool, _)| tool.clone())
            .collect();

        for tool in &stale {
            self.stop_one(tool).await;
        }
        if !stale.is_empty() {
            info!(tools = ?stale, "stopped stale tools");
        }
    }

    /// Stop every currently running tool named in `contexts_for_tools`, for
    /// an arbitrary caller-supplied `reason` (used for logging only).
    pub async fn ensure_tools_stopped(
        &mut self,
        contexts_for_tools: &BTreeMap<String, ContextDelta>,
        reason: &str,
    ) {
        let to_stop: Vec<String> = self
            .running
            .keys()
            .filter(|t| contexts_for_tools.contains_key(*t))
            .cloned()
            .collect();
        for tool in &to_stop {
            self.stop_one(tool).await;
        }
        if !to_stop.is_empty() {
            info!(tools = ?to_stop, reason, "stopped tools");
        }
    }

    /// Stop any running tool that is no longer present in the configured
    /// tool set at all (e.g. removed from the config file).
    pub async fn ensure_removed_tools_stopped(&mut self, configured_tools: &[String]) {
        let removed: Vec<String> = self
            .running
            .keys()
            .filter(|t| !configured_tools.contains(t))
            .cloned()
            .collect();
        for tool in &removed {
            self.stop_one(tool).await;
        }
        if !removed.is_empty() {
            info!(tools = ?removed, "stopped removed tools");
        }
    }

    /// Replay the last cached output and return code for every tool in
    /// `tools` without re-running it, marking each as reported.
    pub async fn replay_previous_results_for(
        &mut self,
        tools: &BTreeMap<String, Context>,
    ) -> Result<Vec<i32>> {
        let mut codes = Vec::with_capacity(tools.len());
        for (tool, context) in tools {
            let output = rc_cache::load_output(&self.cache_dir, tool).await?;
            let previous_rcs =
                rc_cache::load_return_codes(&self.cache_dir, tool, &context.target_files).await?;
            let return_code = previous_rcs.values().copied().max().unwrap_or(0);

            info!(tool, "unchanged, replaying last output");
            if let Some(output) = output {
                print_output(&output);
            }
            report_result(tool, return_code);

            self.return_codes.insert(tool.clone(), return_code);
            codes.push(return_code);
        }
        for (tool, context) in tools {
            self.reported_tools.insert(tool.clone(), context.clone());
        }
        Ok(codes)
    }

    async fn stop_one(&mut self, tool: &str) {
        if let Some(running) = self.running.remove(tool) {
            running.cancel.notify_one();
            let _ = running.handle.await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_tool_task(
    tool_name: String,
    tool: Tool,
    delta: ContextDelta,
    cache_dir: PathBuf,
    cancel: Arc<Notify>,
    on_completion: mpsc::UnboundedSender<CompletionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let previous_rcs =
            match rc_cache::load_return_codes(&cache_dir, &tool_name, &delta.current.target_files)
                .await
            {
                Ok(rcs) => rcs,
                Err(err) => {
                    warn!(tool = %tool_name, error = %err, "failed to load cached return codes");
                    BTreeMap::new()
                }
            };

        let mut targets_used: Vec<String> = rc_cache::failing_paths(&previous_rcs);
        let uses_affected_targets = tool.argv_template.iter().any(|a| a == "{affected_targets}");
        if uses_affected_targets {
            targets_used.extend(delta.affected_files.iter().cloned());
        }
        targets_used.sort();
        targets_used.dedup();

        let mut argv = vec![tool_name.clone()];
        for arg in &tool.argv_template {
            if arg == "{affected_targets}" {
                argv.extend(targets_used.iter().cloned());
            } else {
                argv.push(arg.clone());
            }
        }

        let saved_targets_used = if targets_used.is_empty() {
            vec!["*".to_string()]
        } else {
            targets_used
        };

        let (exit_code, output) = if !spawn::is_executable_available(&tool_name) {
            // Synthetic failed outcome: non-zero rc, no crash, surfaced and
            // cached exactly like a real run so the next tick's "unchanged"
            // classification replays it rather than retrying every tick.
            let message =
                format!("cannot run command ({tool_name}) - no such executable found.\n");
            warn!(tool = %tool_name, "tool is not executable");
            (127, message.into_bytes())
        } else {
            let process = match spawn::spawn(&argv) {
                Ok(process) => process,
                Err(err) => {
                    warn!(tool = %tool_name, error = %err, "failed to spawn tool");
                    return;
                }
            };
            let pid = process.pid();
            let idle_timeout = tool.idle_timeout_secs.map(std::time::Duration::from_secs);

            tokio::select! {
                result = spawn::capture(process, idle_timeout) => {
                    match result {
                        Ok(result) => result,
                        Err(err) => {
                            warn!(tool = %tool_name, error = %err, "tool process capture failed");
                            return;
                        }
                    }
                }
                _ = cancel.notified() => {
                    if let Some(pid) = pid {
                        if !spawn::kill_process_group(pid).await {
                            warn!(tool = %tool_name, pid, "subprocess did not die after SIGTERM+SIGKILL");
                        }
                    }
                    return;
                }
            }
        };

        report_result(&tool_name, exit_code);

        if let Err(err) = rc_cache::save_output(&cache_dir, &tool_name, &output).await {
            warn!(tool = %tool_name, error = %err, "failed to save tool output");
        }
        if let Err(err) = rc_cache::save_return_codes(
            &cache_dir,
            &tool_name,
            &saved_targets_used,
            exit_code,
            &previous_rcs,
        )
        .await
        {
            warn!(tool = %tool_name, error = %err, "failed to save return codes");
        }

        let _ = on_completion.send(CompletionEvent {
            tool: tool_name.clone(),
            context: delta.current.clone(),
            return_code: exit_code,
        });
    })
}

fn report_result(tool: &str, return_code: i32) {
    if return_code == 0 {
        info!(tool, "passed");
    } else {
        warn!(tool, return_code, "failed");
    }
}

fn print_output(output: &[u8]) {
    use std::io::Write;
    let _ = std::io::stdout().write_all(output);
}

/// Check whether `executable` resolves on `PATH`, for precondition/config
/// validation ahead of the first tick.
pub fn check_tool_installed(executable: &str) -> bool {
    spawn::is_executable_available(executable)
}

pub fn default_cache_dir() -> PathBuf {
    Path::new(".pocketwalk.cache").to_path_buf()
}
