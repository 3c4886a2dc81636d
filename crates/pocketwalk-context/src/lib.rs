//! `ContextEngine`: computes, diffs, and persists per-tool contexts.

mod cache;
mod hash;

use anyhow::Result;
use pocketwalk_core::{Config, Context, ContextDelta};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default cache directory name, relative to CWD.
pub const DEFAULT_CACHE_DIR: &str = ".pocketwalk.cache";

pub struct ContextEngine {
    cache_dir: PathBuf,
}

impl ContextEngine {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Read `<tool>.context` for every tool, skipping tools with no saved
    /// context.
    pub async fn load_last_contexts(
        &self,
        tools: &[String],
    ) -> Result<BTreeMap<String, Context>> {
        let mut loaded = BTreeMap::new();
        for tool in tools {
            if let Some(context) = cache::load_context(&self.cache_dir, tool).await? {
                loaded.insert(tool.clone(), context);
            }
        }
        Ok(loaded)
    }

    /// Hash every configured tool's target/trigger globs and assemble its
    /// current `Context`.
    pub async fn compute_current_contexts(
        &self,
        config: &Config,
    ) -> Result<BTreeMap<String, Context>> {
        let mut current = BTreeMap::new();
        for (name, tool) in &config.tools {
            let target_files = hash::hash_files(&tool.target_paths).await?;
            let mut trigger_inputs = tool.trigger_paths.clone();
            trigger_inputs.extend(tool.aux_config_path.iter().cloned());
            let trigger_files = hash::hash_files(&trigger_inputs).await?;
            current.insert(
                name.clone(),
                Context {
                    target_files,
                    trigger_files,
                    config: tool.argv_template.clone(),
                    preconditions: tool.preconditions.clone(),
                },
            );
        }
        Ok(current)
    }

    /// Compare every tool's current context against its last-saved one,
    /// producing a [`ContextDelta`] per tool.
    ///
    /// `affected_files`: if a last context exists, the context changed, and
    /// `trigger_files`/`config`/`preconditions` are unchanged, affected files
    /// are just the target paths whose hash differs. Otherwise affected
    /// files default to the full current target keyset.
    pub fn diff(
        current: &BTreeMap<String, Context>,
        last_saved: &BTreeMap<String, Context>,
    ) -> BTreeMap<String, ContextDelta> {
        let mut deltas = BTreeMap::new();
        for (tool, current_context) in current {
            let last = last_saved.get(tool);
            let changed = last != Some(current_context);

            let affected_files = match last {
                Some(last_context)
                    if changed
                        && last_context.trigger_files == current_context.trigger_files
                        && last_context.config == current_context.config
                        && last_context.preconditions == current_context.preconditions =>
                {
                    current_context
                        .target_files
                        .iter()
                        .filter(|(path, hash)| {
                            last_context.target_files.get(*path) != Some(*hash)
                        })
                        .map(|(path, _)| path.clone())
                        .collect()
                }
                _ => current_context.target_files.keys().cloned().collect(),
            };

            deltas.insert(
                tool.clone(),
                ContextDelta {
                    current: current_context.clone(),
                    changed,
                    affected_files,
                },
            );
        }
        deltas
    }

    /// Tools whose current context differs from their last-saved context.
    pub fn tools_changed(deltas: &BTreeMap<String, ContextDelta>) -> BTreeMap<String, Context> {
        deltas
            .iter()
            .filter(|(_, delta)| delta.changed)
            .map(|(tool, delta)| (tool.clone(), delta.current.clone()))
            .collect()
    }

    /// Tools whose current context equals their last-saved context.
    pub fn tools_unchanged(deltas: &BTreeMap<String, ContextDelta>) -> BTreeMap<String, Context> {
        deltas
            .iter()
            .filter(|(_, delta)| !delta.changed)
            .map(|(tool, delta)| (tool.clone(), delta.current.clone()))
            .collect()
    }

    /// Tools present in `a` but not in `b`.
    pub fn subtract(
        a: &BTreeMap<String, Context>,
        b: &BTreeMap<String, Context>,
    ) -> BTreeMap<String, Context> {
        a.iter()
            .filter(|(tool, _)| !b.contains_key(*tool))
            .map(|(tool, context)| (tool.clone(), context.clone()))
            .collect()
    }

    /// Persist `context` as the new last-saved context for `tool`.
    pub async fn save_context(&self, tool: &str, context: &Context) -> Result<()> {
        cache::save_context(&self.cache_dir, tool, context).await
    }
}
