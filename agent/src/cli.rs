//! CLI argument definitions (§6 CLI surface), grounded on `kgctl::cli::Cli`'s derive shape.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "kg-agent")]
#[command(about = "Agentic academic knowledge-graph builder")]
#[command(version)]
pub struct Cli {
    /// Free-form task for the ReACT controller (mutually exclusive with a PDF path).
    #[arg(long = "agent")]
    pub agent_task: Option<String>,

    /// Path to a single PDF to run through the pipeline directly.
    pub paper_path: Option<PathBuf>,

    /// Also run the Integration workflow after EDC when processing a single PDF.
    #[arg(long)]
    pub integrate: bool,

    /// Attribute relationships extracted from the PDF to this source paper id.
    #[arg(long)]
    pub source_paper_id: Option<String>,

    /// Override the agent's step cap (config default: 25).
    #[arg(long)]
    pub max_steps: Option<u32>,

    /// Configuration file path.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
