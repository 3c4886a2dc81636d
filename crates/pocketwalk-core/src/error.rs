//! Error taxonomy shared by every Pocketwalk collaborator.
//!
//! Each variant names a *kind* of failure, not a wrapped third-party error
//! type. Call sites that need the underlying cause attach it via
//! `anyhow::Context` rather than stuffing it into these variants.

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("config file not found or unreadable at '{0}'")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("unknown tool '{0}' referenced by --tools or a precondition list")]
    UnknownTool(String),

    #[error("tool '{0}' is not executable: {1}")]
    ToolNotExecutable(String, String),

    #[error("failed to hash '{path}' after {attempts} attempts")]
    HashRetriesExhausted { path: String, attempts: u32 },

    #[error("subprocess for tool '{0}' did not die after SIGTERM+SIGKILL")]
    SubprocessUnkillable(String),

    #[error("cache entry for tool '{tool}' is corrupt: {reason}")]
    CacheCorrupt { tool: String, reason: String },

    #[error("git command failed: {0}")]
    VcsCommandFailed(String),

    #[error("operation cancelled")]
    Cancelled,
}
