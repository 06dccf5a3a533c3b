//! Tool catalogue: typed routing and the business operations behind it.

pub mod args;
mod executor;
mod policy;
mod router;

pub use executor::{
    AboutInfo, DEFAULT_APPOINTMENT_MINS, DEFAULT_LANGUAGE, ExecutorDeps, KB_TOP_K, ToolExecutor,
};
pub use policy::{GateOutcome, LowConfidenceAction, gate};
pub use router::{ToolCallRouter, ToolContext, ToolDefinition};
