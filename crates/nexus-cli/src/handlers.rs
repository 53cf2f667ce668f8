//! Session handling for the CLI

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use nexus_agent::{AgentRuntime, ConversationRegistry};
use nexus_core::{AgentSettings, ConversationId, Error, UserId};
use nexus_providers::build_provider;
use tokio::fs as async_fs;
use tokio::io::{self, AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use crate::cli::Cli;
use crate::output::render;

/// Lines that end the session.
const QUIT_COMMANDS: &[&str] = &["/quit", "/exit"];

/// Run an interactive session reading operator messages from stdin.
///
/// # Errors
/// Returns an error if logging, configuration or the provider cannot be set up.
pub async fn handle_session(cli: Cli) -> Result<()> {
    let nexus_dir = cli.workspace.join(".nexus");
    async_fs::create_dir_all(&nexus_dir).await?;
    init_logging(&nexus_dir.join("debug.log")).await?;

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(kind) = cli.provider {
        settings.provider.kind = kind;
    }
    if let Some(model) = cli.model {
        settings.provider.model = Some(model);
    }
    if settings.workspace.root.is_relative() {
        settings.workspace.root = cli.workspace.join(&settings.workspace.root);
    }

    let provider = build_provider(&settings)?;
    let runtime = Arc::new(AgentRuntime::from_settings(&settings, provider));
    let registry = ConversationRegistry::new(runtime);

    let conversation = cli.conversation.map_or_else(ConversationId::new, ConversationId::from);
    let user = UserId::from(cli.user);
    info!("Session started for conversation {conversation}");

    let mut events = registry.subscribe(&conversation, &user);
    let format = cli.format;
    let printer = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(event) = events.recv().await {
            let Some(text) = render(&event, format) else {
                continue;
            };
            if stdout.write_all(text.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let heartbeat = settings.heartbeat_period().and_then(|period| {
        registry
            .get(&conversation)
            .map(|session| session.emitter().spawn_heartbeat(period))
    });

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if QUIT_COMMANDS.contains(&message) {
            break;
        }
        match registry.send(&conversation, &user, message).await {
            Ok(outcome) => info!("Turn finished in state {}", outcome.state),
            Err(Error::Busy(id)) => warn!("Conversation {id} is busy"),
            Err(err) => warn!("Turn failed: {err}"),
        }
    }

    if let Some(handle) = heartbeat {
        handle.abort();
    }
    registry.evict(&conversation);
    if let Err(err) = printer.await {
        warn!("Event printer stopped abnormally: {err}");
    }
    info!("Session ended");
    Ok(())
}

/// Settings from `path`, creating it with defaults when missing, or from
/// `~/.nexus/config.toml` when no path is given.
fn load_settings(path: Option<&Path>) -> Result<AgentSettings> {
    let Some(path) = path else {
        return Ok(AgentSettings::load_or_create().unwrap_or_else(|error| {
            warn!("Failed to load config from ~/.nexus/config.toml: {error}");
            warn!("Using default configuration");
            AgentSettings::default()
        }));
    };

    if path.exists() {
        return AgentSettings::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }
    let settings = AgentSettings::default();
    settings
        .save_to_file(path)
        .with_context(|| format!("Failed to create config at {}", path.display()))?;
    Ok(settings)
}

/// Route tracing output to `debug_log`, replacing the previous session's log.
async fn init_logging(debug_log: &Path) -> Result<()> {
    if async_fs::try_exists(debug_log).await.unwrap_or(false) {
        async_fs::remove_file(debug_log).await?;
    }

    // The tracing writer needs a synchronous file handle.
    let log_file = OpenOptions::new().create(true).append(true).open(debug_log)?;

    Registry::default()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nexus_agent=info,nexus_tooling=info,nexus_providers=info,nexus_cli=info".into()),
        )
        .with(
            fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false)
                .with_target(true)
                .with_level(true),
        )
        .init();
    Ok(())
}
