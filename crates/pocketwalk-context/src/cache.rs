//! On-disk layout for saved per-tool contexts.
//!
//! `<cache_dir>/<tool>.context` holds the canonical TOML serialization of a
//! [`pocketwalk_core::Context`] — `affected_files` is never part of this
//! struct in the first place (it lives on `ContextDelta`), so there is no
//! stripping step needed before writing.

use anyhow::{Context as _, Result};
use pocketwalk_core::Context;
use std::path::{Path, PathBuf};

pub fn context_path(cache_dir: &Path, tool: &str) -> PathBuf {
    cache_dir.join(tool).with_extension("context")
}

/// Load a tool's last-saved context, if any. A missing file is not an error —
/// it just means this is the tool's first tick.
pub async fn load_context(cache_dir: &Path, tool: &str) -> Result<Option<Context>> {
    let path = context_path(cache_dir, tool);
    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => {
            let context: Context = toml::from_str(&raw)
                .with_context(|| format!("parsing cached context at {}", path.display()))?;
            Ok(Some(context))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

/// Persist a tool's context, creating the cache directory if absent.
pub async fn save_context(cache_dir: &Path, tool: &str, context: &Context) -> Result<()> {
    tokio::fs::create_dir_all(cache_dir)
        .await
        .with_context(|| format!("creating cache dir {}", cache_dir.display()))?;
    let path = context_path(cache_dir, tool);
    let serialized = toml::to_string_pretty(context).context("serializing context")?;
    tokio::fs::write(&path, serialized)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
