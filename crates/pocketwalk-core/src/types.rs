//! The shared data model: tool configuration, fingerprints, and run state.
//!
//! These types have no behavior of their own beyond equality/serialization;
//! every collaborator (config, context, process, vcs) builds and consumes
//! them without owning a canonical copy.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How long the Supervisor should keep looping, read from the `run` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Forever,
    TillPass,
    #[default]
    Once,
}

/// The argv template for a tool's `config` field: either a TOML list of
/// strings, or a single string split on ASCII whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgvTemplate {
    List(Vec<String>),
    Words(String),
}

impl ArgvTemplate {
    pub fn into_words(self) -> Vec<String> {
        match self {
            ArgvTemplate::List(words) => words,
            ArgvTemplate::Words(s) => s.split_whitespace().map(str::to_owned).collect(),
        }
    }
}

impl Default for ArgvTemplate {
    fn default() -> Self {
        ArgvTemplate::List(Vec::new())
    }
}

/// A configured tool's raw (pre-glob-expansion) settings, as read from TOML
/// or overridden from the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub target_paths: Vec<String>,
    #[serde(default)]
    pub trigger_paths: Vec<String>,
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub config: ArgvTemplate,
    /// Optional path to an auxiliary config file the tool itself reads
    /// (e.g. an `.eslintrc`), tracked the same way as a trigger file: its
    /// hash feeds `Context::trigger_files` and it is included in
    /// `Config::tracked_paths` so a VCS commit picks it up.
    #[serde(default)]
    pub aux_config_path: Option<String>,
    /// Kill the subprocess if it produces no stdout/stderr output for this
    /// many seconds. `None` (the default) disables idle-timeout enforcement
    /// entirely, matching the core spec's silence on the subject.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

/// A fully resolved tool: globs expanded, argv template expanded, ready for
/// `ContextEngine` to hash and `ToolRunner` to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub name: String,
    pub argv_template: Vec<String>,
    pub target_paths: Vec<String>,
    pub trigger_paths: Vec<String>,
    pub preconditions: Vec<String>,
    pub aux_config_path: Option<String>,
    pub idle_timeout_secs: Option<u64>,
}

/// The effective, already-expanded configuration snapshot a tick operates on.
#[derive(Debug, Clone)]
pub struct Config {
    pub run: RunMode,
    pub no_vcs: bool,
    pub config_path: std::path::PathBuf,
    /// `IndexMap` rather than `BTreeMap` so iteration preserves TOML
    /// declaration order (see `tool_names`), not alphabetical order.
    pub tools: IndexMap<String, Tool>,
}

impl Config {
    /// Configured tool names in declaration order (the order they appear in
    /// the `[tools.*]` TOML table, overridden-order on `--tools`).
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// All paths any configured tool considers "tracked" plus the config
    /// file itself.
    pub fn tracked_paths(&self) -> Vec<String> {
        let mut tracked: Vec<String> = self
            .tools
            .values()
            .flat_map(|t| {
                t.target_paths
                    .iter()
                    .chain(t.trigger_paths.iter())
                    .chain(t.aux_config_path.iter())
                    .cloned()
            })
            .collect();
        tracked.push(self.config_path.to_string_lossy().into_owned());
        tracked.sort();
        tracked.dedup();
        tracked
    }
}

/// The fingerprint deciding whether a tool must re-run. Field order in the
/// struct is irrelevant; field *contents* for `target_files`/`trigger_files`
/// use `BTreeMap` so key ordering never affects equality or serialization —
/// ordering of mapping keys is immaterial for equality.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Context {
    pub target_files: BTreeMap<String, String>,
    pub trigger_files: BTreeMap<String, String>,
    pub config: Vec<String>,
    pub preconditions: Vec<String>,
}

/// Derived comparison between a tool's current and last-saved `Context`.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDelta {
    pub current: Context,
    pub changed: bool,
    pub affected_files: Vec<String>,
}

/// Per-tool outcome of the most recent completed run. Live (running) state
/// is tracked separately by `ToolRunner` since it carries a subprocess
/// handle that has no meaningful `Clone`/`Serialize`.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub return_code: i32,
    pub output: Vec<u8>,
    pub context: Context,
}

/// Per-tool snapshot exposed to `VCSController` each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolStatus {
    pub running: bool,
    pub return_code: Option<i32>,
}

pub type AggregateToolState = BTreeMap<String, ToolStatus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_template_words_splits_on_whitespace() {
        let tmpl = ArgvTemplate::Words("fmt  --check   {affected_targets}".to_string());
        assert_eq!(
            tmpl.into_words(),
            vec!["fmt", "--check", "{affected_targets}"]
        );
    }

    #[test]
    fn argv_template_list_passes_through() {
        let tmpl = ArgvTemplate::List(vec!["fmt".into(), "{affected_targets}".into()]);
        assert_eq!(tmpl.into_words(), vec!["fmt", "{affected_targets}"]);
    }

    #[test]
    fn context_equality_ignores_map_insertion_order() {
        let mut a_files = BTreeMap::new();
        a_files.insert("b.py".to_string(), "hash_b".to_string());
        a_files.insert("a.py".to_string(), "hash_a".to_string());
        let mut b_files = BTreeMap::new();
        b_files.insert("a.py".to_string(), "hash_a".to_string());
        b_files.insert("b.py".to_string(), "hash_b".to_string());

        let a = Context {
            target_files: a_files,
            ..Default::default()
        };
        let b = Context {
            target_files: b_files,
            ..Default::default()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn context_equality_is_sensitive_to_preconditions_order() {
        let a = Context {
            preconditions: vec!["fmt".into(), "lint".into()],
            ..Default::default()
        };
        let b = Context {
            preconditions: vec!["lint".into(), "fmt".into()],
            ..Default::default()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn tool_names_preserves_insertion_order_not_sorted_order() {
        let mut tools = IndexMap::new();
        tools.insert(
            "zlint".to_string(),
            Tool {
                name: "zlint".to_string(),
                argv_template: vec![],
                target_paths: vec![],
                trigger_paths: vec![],
                preconditions: vec![],
                aux_config_path: None,
                idle_timeout_secs: None,
            },
        );
        tools.insert(
            "afmt".to_string(),
            Tool {
                name: "afmt".to_string(),
                argv_template: vec![],
                target_paths: vec![],
                trigger_paths: vec![],
                preconditions: vec![],
                aux_config_path: None,
                idle_timeout_secs: None,
            },
        );
        let config = Config {
            run: RunMode::Once,
            no_vcs: false,
            config_path: ".pocketwalk.toml".into(),
            tools,
        };
        assert_eq!(
            config.tool_names(),
            vec!["zlint".to_string(), "afmt".to_string()]
        );
    }

    #[test]
    fn tracked_paths_dedupes_and_includes_config_path() {
        let mut tools = IndexMap::new();
        tools.insert(
            "fmt".to_string(),
            Tool {
                name: "fmt".to_string(),
                argv_template: vec!["fmt".into()],
                target_paths: vec!["a.py".into()],
                trigger_paths: vec!["a.py".into()],
                preconditions: vec![],
                aux_config_path: None,
                idle_timeout_secs: None,
            },
        );
        let config = Config {
            run: RunMode::Once,
            no_vcs: false,
            config_path: ".pocketwalk.toml".into(),
            tools,
        };
        assert_eq!(
            config.tracked_paths(),
            vec![".pocketwalk.toml".to_string(), "a.py".to_string()]
        );
    }

    #[test]
    fn tracked_paths_includes_aux_config_path() {
        let mut tools = IndexMap::new();
        tools.insert(
            "lint".to_string(),
            Tool {
                name: "lint".to_string(),
                argv_template: vec!["lint".into()],
                target_paths: vec!["a.py".into()],
                trigger_paths: vec![],
                preconditions: vec![],
                aux_config_path: Some(".eslintrc".into()),
                idle_timeout_secs: None,
            },
        );
        let config = Config {
            run: RunMode::Once,
            no_vcs: false,
            config_path: ".pocketwalk.toml".into(),
            tools,
        };
        assert_eq!(
            config.tracked_paths(),
            vec![
                ".eslintrc".to_string(),
                ".pocketwalk.toml".to_string(),
                "a.py".to_string(),
            ]
        );
    }
}
