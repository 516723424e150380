//! Cross-document entity resolution: merges a fresh graph fragment into
//! the persistent graph via vector-similarity candidate retrieval plus
//! LLM adjudication (§4.9).

pub mod dto;
pub mod resolver;
pub mod workflow;

pub use resolver::resolve_all;
pub use workflow::{IntegrationEvent, IntegrationWorkflow};
