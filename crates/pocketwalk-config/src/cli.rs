//! CLI surface. Only `-c/--config`, `-1/--once`, `--run`, `--tools`, and
//! `--no-vcs` are known ahead of time; each configured tool additionally gets its own
//! `--<tool>-targets` / `--<tool>-triggers` / `--<tool>-preconditions` /
//! `--<tool>-args` flags, which clap's derive macro cannot express since the
//! flag names are not known until the config file and `--tools` are read.
//! So parsing happens in two passes, mirroring the original's
//! `parse_known_args` followed by a second parser built with the resolved
//! tool list.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use pocketwalk_core::RunMode;
use std::collections::BTreeMap;

pub const DEFAULT_CONFIG_PATH: &str = ".pocketwalk.toml";

#[derive(Debug, Default)]
pub struct BaseOverrides {
    pub run: Option<RunMode>,
    pub tools: Option<Vec<String>>,
    pub no_vcs: bool,
    pub config_path: Option<String>,
}

#[derive(Debug, Default)]
pub struct ToolOverrides {
    pub target_paths: Option<Vec<String>>,
    pub trigger_paths: Option<Vec<String>>,
    pub preconditions: Option<Vec<String>>,
    pub config: Option<Vec<String>>,
}

fn base_command() -> Command {
    Command::new("pocketwalk")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs static-analysis tools against a project, caching results and committing clean runs.")
        .ignore_errors(true)
        .disable_help_flag(true)
        .arg(
            Arg::new("run")
                .long("run")
                .value_parser(["forever", "till-pass", "once"])
                .help("How long to run and loop pocketwalk."),
        )
        .arg(
            Arg::new("tools")
                .long("tools")
                .value_name("EXECUTABLE")
                .num_args(0..)
                .help("Tools to run."),
        )
        .arg(
            Arg::new("once")
                .short('1')
                .long("once")
                .action(ArgAction::SetTrue)
                .help("Override `run` to `once`, regardless of the config file."),
        )
        .arg(
            Arg::new("no_vcs")
                .long("no-vcs")
                .action(ArgAction::SetTrue)
                .help("Disable VCS commits."),
        )
        .arg(
            Arg::new("config_path")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Path to the pocketwalk config file."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log verbosity. Repeatable (-vv, -vvv)."),
        )
}

/// Count `-v`/`--verbose` occurrences ahead of the full CLI parse, so the
/// logging subscriber can be configured before anything else runs. A plain
/// substring scan rather than a full `clap` parse, since tracing needs to be
/// set up before the rest of the config pipeline (which may itself log).
pub fn count_verbose_flags(argv: &[String]) -> u8 {
    let mut count: u8 = 0;
    for arg in argv.iter().skip(1) {
        if arg == "--verbose" {
            count = count.saturating_add(1);
        } else if let Some(flags) = arg.strip_prefix('-') {
            if !flags.is_empty() && !flags.starts_with('-') && flags.chars().all(|c| c == 'v') {
                count = count.saturating_add(flags.len() as u8);
            }
        }
    }
    count
}

/// First pass: recover `--run`/`-1/--once`/`--tools`/`--no-vcs`/`-c/--config`
/// while ignoring any unrecognized per-tool flags.
pub fn parse_base_overrides(argv: &[String]) -> Result<BaseOverrides> {
    let matches = base_command()
        .try_get_matches_from(argv)
        .context("parsing base CLI arguments")?;

    let run = if matches.get_flag("once") {
        Some(RunMode::Once)
    } else {
        matches
            .get_one::<String>("run")
            .map(|s| parse_run_mode(s))
            .transpose()?
    };

    Ok(BaseOverrides {
        run,
        tools: matches
            .get_many::<String>("tools")
            .map(|vals| vals.cloned().collect()),
        no_vcs: matches.get_flag("no_vcs"),
        config_path: matches.get_one::<String>("config_path").cloned(),
    })
}

fn parse_run_mode(value: &str) -> Result<RunMode> {
    match value {
        "forever" => Ok(RunMode::Forever),
        "till-pass" => Ok(RunMode::TillPass),
        "once" => Ok(RunMode::Once),
        other => anyhow::bail!("invalid --run value '{other}'"),
    }
}

/// Second pass: parse the full CLI, including one set of flags per tool in
/// `tool_names`, and return per-tool overrides that were actually supplied.
pub fn parse_tool_overrides(
    argv: &[String],
    tool_names: &[String],
) -> Result<BTreeMap<String, ToolOverrides>> {
    let mut command = base_command().ignore_errors(false);

    for tool in tool_names {
        command = command
            .arg(
                Arg::new(format!("{tool}_targets"))
                    .long(format!("{tool}-targets"))
                    .value_name("PATH")
                    .num_args(1..)
                    .help(format!("Target files for {tool} to run against.")),
            )
            .arg(
                Arg::new(format!("{tool}_triggers"))
                    .long(format!("{tool}-triggers"))
                    .value_name("PATH")
                    .num_args(0..)
                    .help(format!("Trigger files for {tool} to run against.")),
            )
            .arg(
                Arg::new(format!("{tool}_preconditions"))
                    .long(format!("{tool}-preconditions"))
                    .value_name("TOOL")
                    .num_args(0..)
                    .help(format!("Tools to pass before {tool} can be run.")),
            )
            .arg(
                Arg::new(format!("{tool}_args"))
                    .long(format!("{tool}-args"))
                    .value_name("STRING")
                    .num_args(0..)
                    .help(format!(
                        "Args to pass {tool}. '{{affected_targets}}' is replaced at runtime."
                    )),
            );
    }

    let matches = command
        .try_get_matches_from(argv)
        .context("parsing per-tool CLI arguments")?;

    let mut overrides = BTreeMap::new();
    for tool in tool_names {
        overrides.insert(
            tool.clone(),
            ToolOverrides {
                target_paths: matches
                    .get_many::<String>(&format!("{tool}_targets"))
                    .map(|vals| vals.cloned().collect()),
                trigger_paths: matches
                    .get_many::<String>(&format!("{tool}_triggers"))
                    .map(|vals| vals.cloned().collect()),
                preconditions: matches
                    .get_many::<String>(&format!("{tool}_preconditions"))
                    .map(|vals| vals.cloned().collect()),
                config: matches
                    .get_many::<String>(&format!("{tool}_args"))
                    .map(|vals| vals.cloned().collect()),
            },
        );
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_and_tools_and_ignores_unknown_flags() {
        let argv = vec![
            "pocketwalk".to_string(),
            "--run".to_string(),
            "till-pass".to_string(),
            "--tools".to_string(),
            "fmt".to_string(),
            "lint".to_string(),
            "--fmt-args".to_string(),
            "fmt".to_string(),
            "--check".to_string(),
        ];
        let base = parse_base_overrides(&argv).unwrap();
        assert_eq!(base.run, Some(RunMode::TillPass));
        assert_eq!(base.tools, Some(vec!["fmt".to_string(), "lint".to_string()]));
        assert!(!base.no_vcs);
    }

    #[test]
    fn second_pass_resolves_declared_tool_flags() {
        let argv = vec![
            "pocketwalk".to_string(),
            "--fmt-targets".to_string(),
            "src/a.py".to_string(),
            "src/b.py".to_string(),
        ];
        let overrides = parse_tool_overrides(&argv, &["fmt".to_string()]).unwrap();
        assert_eq!(
            overrides["fmt"].target_paths,
            Some(vec!["src/a.py".to_string(), "src/b.py".to_string()])
        );
    }

    #[test]
    fn no_vcs_flag_is_recognized() {
        let argv = vec!["pocketwalk".to_string(), "--no-vcs".to_string()];
        let base = parse_base_overrides(&argv).unwrap();
        assert!(base.no_vcs);
    }

    #[test]
    fn once_flag_overrides_run_mode_to_once() {
        let argv = vec![
            "pocketwalk".to_string(),
            "--run".to_string(),
            "forever".to_string(),
            "-1".to_string(),
        ];
        let base = parse_base_overrides(&argv).unwrap();
        assert_eq!(base.run, Some(RunMode::Once));
    }

    #[test]
    fn short_and_long_config_flags_are_equivalent() {
        let short = parse_base_overrides(&[
            "pocketwalk".to_string(),
            "-c".to_string(),
            "other.toml".to_string(),
        ])
        .unwrap();
        let long = parse_base_overrides(&[
            "pocketwalk".to_string(),
            "--config".to_string(),
            "other.toml".to_string(),
        ])
        .unwrap();
        assert_eq!(short.config_path, Some("other.toml".to_string()));
        assert_eq!(long.config_path, Some("other.toml".to_string()));
    }

    #[test]
    fn count_verbose_flags_counts_repeated_short_and_long_forms() {
        assert_eq!(count_verbose_flags(&["pocketwalk".to_string()]), 0);
        assert_eq!(
            count_verbose_flags(&["pocketwalk".to_string(), "-v".to_string()]),
            1
        );
        assert_eq!(
            count_verbose_flags(&["pocketwalk".to_string(), "-vv".to_string()]),
            2
        );
        assert_eq!(
            count_verbose_flags(&[
                "pocketwalk".to_string(),
                "--verbose".to_string(),
                "--verbose".to_string(),
            ]),
            2
        );
    }

    #[test]
    fn count_verbose_flags_ignores_unrelated_flags() {
        let argv = vec![
            "pocketwalk".to_string(),
            "--no-vcs".to_string(),
            "--tools".to_string(),
            "fmt".to_string(),
        ];
        assert_eq!(count_verbose_flags(&argv), 0);
    }
}
