//! `ConfigSource`: reads `.pocketwalk.toml`, overlays CLI overrides, and
//! expands globs in every target/trigger/argv-template entry to produce the
//! effective [`pocketwalk_core::Config`] a tick operates on.

pub mod cli;
mod glob_expand;
mod raw;

pub use raw::{RawConfig, RawTool};

use anyhow::{Context as _, Result};
use indexmap::IndexMap;
use pocketwalk_core::{AppError, ArgvTemplate, Config, RunMode, Tool, ToolConfig};
use std::path::{Path, PathBuf};

pub struct ConfigSource;

impl ConfigSource {
    /// Read the config file named on the CLI (or the default path), overlay
    /// CLI overrides, expand every glob relative to `cwd`, and return the
    /// effective snapshot a tick will operate on.
    pub async fn get_effective_config(argv: &[String], cwd: &Path) -> Result<Config> {
        let base = cli::parse_base_overrides(argv)?;
        let config_path = base
            .config_path
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(cli::DEFAULT_CONFIG_PATH));

        let raw = load_raw_config(&config_path).await?;

        let requested_tools: Vec<String> = base
            .tools
            .clone()
            .unwrap_or_else(|| raw.tools.keys().cloned().collect());
        for name in &requested_tools {
            if !raw.tools.contains_key(name) {
                return Err(AppError::UnknownTool(name.clone()).into());
            }
        }

        let overrides = cli::parse_tool_overrides(argv, &requested_tools)?;

        let mut tools = IndexMap::new();
        for name in &requested_tools {
            let raw_tool = raw.tools.get(name).cloned().unwrap_or_default();
            let tool_overrides = overrides.get(name);
            let merged = merge_tool(raw_tool, tool_overrides);
            tools.insert(name.clone(), expand_tool(name, merged, cwd));
        }

        Ok(Config {
            run: base.run.unwrap_or(raw.run),
            no_vcs: raw.no_vcs || base.no_vcs,
            config_path,
            tools,
        })
    }

    pub fn loop_forever(config: &Config) -> bool {
        config.run == RunMode::Forever
    }

    pub fn loop_till_pass(config: &Config) -> bool {
        config.run == RunMode::TillPass
    }

    pub fn get_tools(config: &Config) -> Vec<String> {
        config.tool_names()
    }
}

async fn load_raw_config(path: &Path) -> Result<RawConfig> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => {
            toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::ConfigNotFound(path.display().to_string()).into())
        }
        Err(err) => Err(err).with_context(|| format!("reading config file {}", path.display())),
    }
}

/// CLI-supplied values win field-by-field over the file's raw tool entry.
fn merge_tool(raw: RawTool, overrides: Option<&cli::ToolOverrides>) -> ToolConfig {
    let mut merged = ToolConfig {
        target_paths: raw.target_paths,
        trigger_paths: raw.trigger_paths,
        preconditions: raw.preconditions,
        config: raw.config,
        aux_config_path: raw.aux_config_path,
        idle_timeout_secs: raw.idle_timeout_secs,
    };
    if let Some(overrides) = overrides {
        if let Some(target_paths) = &overrides.target_paths {
            merged.target_paths = target_paths.clone();
        }
        if let Some(trigger_paths) = &overrides.trigger_paths {
            merged.trigger_paths = trigger_paths.clone();
        }
        if let Some(preconditions) = &overrides.preconditions {
            merged.preconditions = preconditions.clone();
        }
        if let Some(config) = &overrides.config {
            merged.config = ArgvTemplate::List(config.clone());
        }
    }
    merged
}

fn expand_tool(name: &str, merged: ToolConfig, cwd: &Path) -> Tool {
    Tool {
        name: name.to_string(),
        argv_template: glob_expand::expand_words(&merged.config.into_words(), cwd),
        target_paths: glob_expand::expand_words(&merged.target_paths, cwd),
        trigger_paths: glob_expand::expand_words(&merged.trigger_paths, cwd),
        preconditions: merged.preconditions,
        aux_config_path: merged.aux_config_path,
        idle_timeout_secs: merged.idle_timeout_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    async fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join(".pocketwalk.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn reads_minimal_config_with_no_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "").unwrap();
        write_config(
            dir.path(),
            r#"
            run = "till-pass"

            [tools.fmt]
            target_paths = ["a.py"]
            config = ["fmt", "{affected_targets}"]
        "#,
        )
        .await;

        let argv = vec!["pocketwalk".to_string()];
        let config = ConfigSource::get_effective_config(&argv, dir.path())
            .await
            .unwrap();
        assert_eq!(config.run, RunMode::TillPass);
        assert!(ConfigSource::loop_till_pass(&config));
        assert_eq!(config.tool_names(), vec!["fmt".to_string()]);
        assert_eq!(
            config.tools["fmt"].argv_template,
            vec!["fmt".to_string(), "{affected_targets}".to_string()]
        );
    }

    #[tokio::test]
    async fn tool_names_follow_toml_declaration_order_not_alphabetical() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
            [tools.zlint]
            target_paths = []

            [tools.afmt]
            target_paths = []
        "#,
        )
        .await;

        let argv = vec!["pocketwalk".to_string()];
        let config = ConfigSource::get_effective_config(&argv, dir.path())
            .await
            .unwrap();
        assert_eq!(
            config.tool_names(),
            vec!["zlint".to_string(), "afmt".to_string()]
        );
    }

    #[tokio::test]
    async fn cli_tools_flag_restricts_active_set() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
            [tools.fmt]
            target_paths = []

            [tools.lint]
            target_paths = []
            preconditions = ["fmt"]
        "#,
        )
        .await;

        let argv = vec![
            "pocketwalk".to_string(),
            "--tools".to_string(),
            "fmt".to_string(),
        ];
        let config = ConfigSource::get_effective_config(&argv, dir.path())
            .await
            .unwrap();
        assert_eq!(config.tool_names(), vec!["fmt".to_string()]);
    }

    #[tokio::test]
    async fn unknown_tool_on_cli_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "[tools.fmt]\ntarget_paths = []\n").await;

        let argv = vec![
            "pocketwalk".to_string(),
            "--tools".to_string(),
            "nope".to_string(),
        ];
        let err = ConfigSource::get_effective_config(&argv, dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn per_tool_cli_override_replaces_file_value() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.py"), "").unwrap();
        write_config(
            dir.path(),
            "[tools.fmt]\ntarget_paths = [\"a.py\"]\nconfig = [\"fmt\"]\n",
        )
        .await;

        let argv = vec![
            "pocketwalk".to_string(),
            "--fmt-targets".to_string(),
            "b.py".to_string(),
        ];
        let config = ConfigSource::get_effective_config(&argv, dir.path())
            .await
            .unwrap();
        assert_eq!(config.tools["fmt"].target_paths, vec!["b.py".to_string()]);
    }

    #[tokio::test]
    async fn no_vcs_flag_merges_with_file_setting() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "no_vcs = false\n").await;

        let argv = vec!["pocketwalk".to_string(), "--no-vcs".to_string()];
        let config = ConfigSource::get_effective_config(&argv, dir.path())
            .await
            .unwrap();
        assert!(config.no_vcs);
    }

    #[tokio::test]
    async fn missing_config_file_is_reported_clearly() {
        let dir = tempfile::tempdir().unwrap();
        let argv = vec!["pocketwalk".to_string()];
        let err = ConfigSource::get_effective_config(&argv, dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
