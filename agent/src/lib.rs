//! ReACT agentic controller composing the EDC and Integration workflows
//! with paper discovery/download tools (§4.11).

pub mod react;
pub mod tools;

pub use react::{ReactAgent, ReactOutcome, ReactStep};
pub use tools::{ToolContext, ToolError};
