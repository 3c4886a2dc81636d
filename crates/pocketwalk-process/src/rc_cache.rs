//! Per-path return code cache and last-output cache for a tool.
//!
//! `<cache_dir>/<tool>.return_codes` is a TOML table of `path -> return code`,
//! letting a tool re-run only the paths that failed last time when its config
//! contains `{affected_targets}`. `<cache_dir>/<tool>.output` is the raw
//! captured output from the most recent run, replayed verbatim when a tool's
//! context is unchanged from one tick to the next.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn return_codes_path(cache_dir: &Path, tool: &str) -> PathBuf {
    cache_dir.join(tool).with_extension("return_codes")
}

fn output_path(cache_dir: &Path, tool: &str) -> PathBuf {
    cache_dir.join(tool).with_extension("output")
}

/// Load the saved per-path return codes for `tool`, keeping only entries
/// whose path is still one of `target_files`. A missing cache file yields an
/// empty map rather than an error.
pub async fn load_return_codes(
    cache_dir: &Path,
    tool: &str,
    target_files: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, i32>> {
    let path = return_codes_path(cache_dir, tool);
    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => {
            let all: BTreeMap<String, i32> = toml::from_str(&raw)
                .with_context(|| format!("parsing return codes at {}", path.display()))?;
            Ok(all
                .into_iter()
                .filter(|(path, _)| target_files.contains_key(path))
                .collect())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

/// Merge `return_code` into the previously saved return codes for every path
/// in `targets_used`, keeping untouched paths from `previous_rcs`, and
/// persist the merged table.
pub async fn save_return_codes(
    cache_dir: &Path,
    tool: &str,
    targets_used: &[String],
    return_code: i32,
    previous_rcs: &BTreeMap<String, i32>,
) -> Result<()> {
    tokio::fs::create_dir_all(cache_dir)
        .await
        .with_context(|| format!("creating cache dir {}", cache_dir.display()))?;

    let mut merged = previous_rcs.clone();
    for path in targets_used {
        merged.insert(path.clone(), return_code);
    }

    let path = return_codes_path(cache_dir, tool);
    let serialized = toml::to_string_pretty(&merged).context("serializing return codes")?;
    tokio::fs::write(&path, serialized)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Load a tool's last captured output, if any.
pub async fn load_output(cache_dir: &Path, tool: &str) -> Result<Option<Vec<u8>>> {
    let path = output_path(cache_dir, tool);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

/// Persist a tool's captured output, creating the cache directory if absent.
pub async fn save_output(cache_dir: &Path, tool: &str, output: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(cache_dir)
        .await
        .with_context(|| format!("creating cache dir {}", cache_dir.display()))?;
    let path = output_path(cache_dir, tool);
    tokio::fs::write(&path, output)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Return codes for the most recent run of each path used, for merge into
/// the next save -- paths previously failing (non-zero) should be re-run when
/// the tool config references `{affected_targets}`.
pub fn failing_paths(previous_rcs: &BTreeMap<String, i32>) -> Vec<String> {
    previous_rcs
        .iter()
        .filter(|(_, rc)| **rc != 0)
        .map(|(path, _)| path.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_return_codes_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_return_codes(dir.path(), "fmt", &BTreeMap::new())
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_filters_to_current_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut previous = BTreeMap::new();
        previous.insert("a.py".to_string(), 1);
        save_return_codes(dir.path(), "fmt", &["a.py".to_string()], 1, &previous)
            .await
            .unwrap();

        let mut targets = BTreeMap::new();
        targets.insert("a.py".to_string(), "hash".to_string());
        let loaded = load_return_codes(dir.path(), "fmt", &targets)
            .await
            .unwrap();
        assert_eq!(loaded.get("a.py"), Some(&1));

        let empty_targets = BTreeMap::new();
        let loaded = load_return_codes(dir.path(), "fmt", &empty_targets)
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn output_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        save_output(dir.path(), "fmt", b"hello\n").await.unwrap();
        let loaded = load_output(dir.path(), "fmt").await.unwrap().unwrap();
        assert_eq!(loaded, b"hello\n");
    }

    #[test]
    fn failing_paths_filters_nonzero_codes() {
        let mut rcs = BTreeMap::new();
        rcs.insert("a.py".to_string(), 0);
        rcs.insert("b.py".to_string(), 1);
        let failing = failing_paths(&rcs);
        assert_eq!(failing, vec!["b.py".to_string()]);
    }
}
