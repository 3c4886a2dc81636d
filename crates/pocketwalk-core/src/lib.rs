//! Shared data model and error taxonomy for Pocketwalk.
//!
//! Every other crate in the workspace depends on this one and nothing else
//! upstream of it, keeping the dependency graph a strict DAG rooted here.

pub mod error;
pub mod types;

pub use error::AppError;
pub use types::{
    AggregateToolState, ArgvTemplate, CompletedRun, Config, Context, ContextDelta, RunMode, Tool,
    ToolConfig, ToolStatus,
};
