use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use nexus_core::ProviderKind;

/// How turn events are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Streamed text for a terminal
    #[default]
    Text,
    /// One JSON event per line
    Json,
}

/// Command-line arguments for the nexus agent
#[derive(Debug, Parser)]
#[command(name = "nexus", version, about = "Chat-driven research agent that acts through tool directives")]
pub struct Cli {
    /// Directory holding `.nexus/` logs and conversation workspaces
    #[arg(short, long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file (default: ~/.nexus/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model provider: openai, anthropic, gemini or mock
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    /// Model name override
    #[arg(short, long)]
    pub model: Option<String>,

    /// Conversation to resume or create (default: a new id)
    #[arg(long)]
    pub conversation: Option<String>,

    /// User owning the conversation
    #[arg(long, default_value = "local")]
    pub user: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
