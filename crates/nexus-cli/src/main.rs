//! Nexus CLI - chat with the research agent from a terminal or a pipe
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

use anyhow::Result;
use clap::Parser as _;
use cli::Cli;

mod cli;
mod handlers;
mod output;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    handlers::handle_session(cli).await
}
