//! The supervisor's tick loop: one reconciliation per iteration, binding
//! `ConfigSource`, `ContextEngine`, `ToolRunner`, `VcsController`, and
//! `Cancellation` together exactly as laid out in the core design.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use pocketwalk_cancel::Cancellation;
use pocketwalk_config::ConfigSource;
use pocketwalk_context::ContextEngine;
use pocketwalk_core::ContextDelta;
use pocketwalk_process::{CompletionEvent, ToolRunner};
use pocketwalk_vcs::VcsController;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const TICK_SLEEP: Duration = Duration::from_secs(1);
const TICK_RETRY_ATTEMPTS: u32 = 3;
const TICK_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct Supervisor {
    cwd: PathBuf,
    argv: Vec<String>,
    cancellation: Cancellation,
    context_engine: ContextEngine,
    tool_runner: ToolRunner,
    vcs: VcsController,
    loop_forever: bool,
    loop_till_pass: bool,
    completion_tx: mpsc::UnboundedSender<CompletionEvent>,
    completion_rx: mpsc::UnboundedReceiver<CompletionEvent>,
}

impl Supervisor {
    pub fn new(cwd: PathBuf, argv: Vec<String>, cancellation: Cancellation) -> Self {
        let cache_dir = cwd.join(pocketwalk_context::DEFAULT_CACHE_DIR);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            context_engine: ContextEngine::new(cache_dir.clone()),
            tool_runner: ToolRunner::new(cache_dir),
            vcs: VcsController::new(cwd.clone()),
            cwd,
            argv,
            cancellation,
            loop_forever: false,
            loop_till_pass: false,
            completion_tx,
            completion_rx,
        }
    }

    /// Drive the reconciliation loop to completion and return the maximum
    /// return code observed across the final configured tool set.
    pub async fn run(mut self) -> Result<i32> {
        let mut last_tools: Vec<String> = Vec::new();

        loop {
            last_tools = retry_tick(|| self.tick()).await?;

            if !self.should_continue(&last_tools) {
                break;
            }
        }

        self.vcs.cleanup().await;
        self.tool_runner.cleanup().await;

        let final_codes = self.tool_runner.return_codes(&last_tools);
        let cancelled_while_running = self.cancellation.cancelled() && final_codes.contains(&130);
        let max_rc = final_codes.into_iter().max().unwrap_or(0);

        Ok(if cancelled_while_running { 130 } else { max_rc })
    }

    fn should_continue(&self, tools: &[String]) -> bool {
        if self.cancellation.cancelled() {
            return false;
        }
        self.loop_forever
            || self.vcs.vcs_running()
            || (self.loop_till_pass && !self.tool_runner.all_tools_passed(tools))
            || self.tool_runner.any_tools_not_done()
    }

    /// One reconciliation tick, matching the ordering in the core design
    /// exactly: sleep, read config, derive deltas, partition, replay,
    /// stop, start, aggregate, update VCS.
    async fn tick(&mut self) -> Result<Vec<String>> {
        tokio::select! {
            _ = tokio::time::sleep(TICK_SLEEP) => {}
            _ = wait_for_cancellation(&self.cancellation) => {}
        }

        // Completions from subprocesses that finished since the previous
        // tick are observed now, happens-before this tick's own decisions --
        // this is the callback-as-data indirection that lets `ContextEngine`
        // learn about a run without `ToolRunner` depending on it directly.
        while let Ok(event) = self.completion_rx.try_recv() {
            self.context_engine
                .save_context(&event.tool, &event.context)
                .await?;
            self.tool_runner.record_completion(&event).await;
        }

        let config = ConfigSource::get_effective_config(&self.argv, &self.cwd).await?;
        self.loop_forever = ConfigSource::loop_forever(&config);
        self.loop_till_pass = ConfigSource::loop_till_pass(&config);

        let tool_names = ConfigSource::get_tools(&config);
        let last_saved = self.context_engine.load_last_contexts(&tool_names).await?;
        let current = self.context_engine.compute_current_contexts(&config).await?;
        let deltas = ContextEngine::diff(&current, &last_saved);

        let changed = ContextEngine::tools_changed(&deltas);
        let unchanged = ContextEngine::tools_unchanged(&deltas);
        let unreported_unchanged = self.tool_runner.filter_out_reported_tools(&unchanged);

        let changed_names: Vec<String> = changed.keys().cloned().collect();
        let failing_preconditions = self
            .tool_runner
            .tools_failing_preconditions(&deltas, &changed_names);

        let to_run: BTreeMap<String, ContextDelta> = deltas
            .iter()
            .filter(|(tool, delta)| delta.changed && !failing_preconditions.contains_key(*tool))
            .map(|(tool, delta)| (tool.clone(), delta.clone()))
            .collect();

        // Replay first: cached results for tools whose context hasn't moved.
        self.tool_runner
            .replay_previous_results_for(&unreported_unchanged)
            .await?;

        // Stop, in the order the design specifies: failing preconditions,
        // stale running contexts, reverted-to-unchanged tools, then tools
        // dropped from the config entirely.
        self.tool_runner
            .ensure_tools_stopped(&failing_preconditions, "failing preconditions")
            .await;
        self.tool_runner.ensure_stale_tools_stopped(&deltas).await;
        let unchanged_deltas: BTreeMap<String, ContextDelta> = deltas
            .iter()
            .filter(|(_, delta)| !delta.changed)
            .map(|(tool, delta)| (tool.clone(), delta.clone()))
            .collect();
        self.tool_runner
            .ensure_tools_stopped(&unchanged_deltas, "reverted files")
            .await;
        self.tool_runner
            .ensure_removed_tools_stopped(&tool_names)
            .await;

        // Start.
        self.tool_runner
            .ensure_tools_running(&to_run, &config.tools, self.completion_tx.clone());

        let tool_state = self.tool_runner.tool_state();
        self.vcs.update(&config, &tool_state).await?;

        debug!(tools = ?tool_names, "tick complete");
        Ok(tool_names)
    }
}

async fn wait_for_cancellation(cancellation: &Cancellation) {
    loop {
        if cancellation.cancelled() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Retry a tick body up to [`TICK_RETRY_ATTEMPTS`] times with a short pause
/// between attempts, matching the original's `@retry`-decorated tick.
async fn retry_tick<F, Fut>(mut body: F) -> Result<Vec<String>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<String>>>,
{
    let mut attempts = 0;
    loop {
        match body().await {
            Ok(tools) => return Ok(tools),
            Err(err) if attempts + 1 < TICK_RETRY_ATTEMPTS => {
                attempts += 1;
                warn!(error = %err, attempts, "tick failed, retrying");
                tokio::time::sleep(TICK_RETRY_DELAY).await;
            }
            Err(err) => return Err(err),
        }
    }
}
