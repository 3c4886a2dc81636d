//! The shape of `.pocketwalk.toml` as written to disk, before glob expansion
//! or CLI overlay. Field names match the file format exactly.

use indexmap::IndexMap;
use pocketwalk_core::{ArgvTemplate, RunMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub run: RunMode,
    #[serde(default)]
    pub no_vcs: bool,
    /// `IndexMap` so `[tools.*]` tables deserialize in TOML declaration
    /// order instead of being re-sorted alphabetically.
    #[serde(default)]
    pub tools: IndexMap<String, RawTool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTool {
    #[serde(default)]
    pub target_paths: Vec<String>,
    #[serde(default)]
    pub trigger_paths: Vec<String>,
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub config: ArgvTemplate,
    #[serde(default)]
    pub aux_config_path: Option<String>,
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}
