//! Load -> Extract -> Define -> Canonicalize -> Save pipeline (§4.4-§4.8)

pub mod canonicalizer;
pub mod definer;
pub mod dto;
pub mod extractor;
pub mod preparser;
pub mod workflow;

pub use canonicalizer::canonicalize;
pub use definer::Definer;
pub use extractor::Extractor;
pub use preparser::preparse;
pub use workflow::{EdcEvent, EdcWorkflow};
