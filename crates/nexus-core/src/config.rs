//! Agent configuration loaded from `~/.nexus/config.toml`.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Language model backend selected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions
    #[default]
    OpenAi,
    /// Anthropic messages API
    Anthropic,
    /// Google Gemini
    Gemini,
    /// Scripted responses, no network
    Mock,
}

impl ProviderKind {
    /// Environment variable holding this provider's API key.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Mock => None,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Config(format!("Unknown provider: {other}"))),
        }
    }
}

/// Model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Which backend to use
    pub kind: ProviderKind,
    /// Model override; each provider has its own default
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens per response
    pub max_tokens: u32,
    /// `OpenAI` API key
    pub openai_api_key: Option<String>,
    /// Anthropic API key
    pub anthropic_api_key: Option<String>,
    /// Gemini API key
    pub gemini_api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: None,
            temperature: 0.7,
            max_tokens: 4000,
            openai_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
        }
    }
}

/// Tool execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Upper bound on a single tool call, in seconds
    pub call_timeout_seconds: u64,
    /// Upper bound on a shell command, in seconds
    pub command_timeout_seconds: u64,
    /// Commands allowed as the first word of `execute-command`
    pub allowed_commands: Vec<String>,
    /// Maximum captured bytes per output stream
    pub max_output_bytes: usize,
    /// Maximum characters kept from a scraped page
    pub max_scrape_chars: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            call_timeout_seconds: 60,
            command_timeout_seconds: 30,
            allowed_commands: [
                "python", "python3", "node", "npm", "pip", "pip3", "ls", "cat", "mkdir", "cp",
                "mv", "wget", "curl", "git", "echo", "date", "wc", "grep", "sort", "head", "tail",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            max_output_bytes: 1024 * 1024,
            max_scrape_chars: 20_000,
        }
    }
}

/// Web search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Tavily API key; without one, searches return canned fallback results
    pub tavily_api_key: Option<String>,
    /// Results requested when a call does not specify `num_results`
    pub default_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tavily_api_key: None,
            default_results: 5,
        }
    }
}

/// Workspace settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory holding one sub-directory per conversation
    pub root: PathBuf,
    /// File name of the task list inside a conversation workspace
    pub task_list_file: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("workspaces"),
            task_list_file: "todo.md".to_owned(),
        }
    }
}

/// Event stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Seconds between heartbeat pings; zero disables them
    pub heartbeat_seconds: u64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            heartbeat_seconds: 15,
        }
    }
}

/// Complete agent configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Model provider configuration
    pub provider: ProviderConfig,
    /// Tool configuration
    pub tools: ToolConfig,
    /// Search configuration
    pub search: SearchConfig,
    /// Workspace configuration
    pub workspace: WorkspaceConfig,
    /// Event configuration
    pub events: EventConfig,
}

impl AgentSettings {
    /// Get the default config directory path (`~/.nexus`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".nexus"))
    }

    /// Get the default config file path (`~/.nexus/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, creating it with defaults if missing
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = toml::from_str(&contents)?;

        tracing::debug!(
            "Loaded config from {:?}: provider={}, api_key={}",
            path,
            config.provider.kind,
            if config.api_key(config.provider.kind).is_some() {
                "present"
            } else {
                "missing"
            }
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# Nexus Agent Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))?;
        Ok(())
    }

    /// Get the API key for a provider, checking config first, then environment variables
    pub fn api_key(&self, kind: ProviderKind) -> Option<String> {
        let configured = match kind {
            ProviderKind::OpenAi => self.provider.openai_api_key.clone(),
            ProviderKind::Anthropic => self.provider.anthropic_api_key.clone(),
            ProviderKind::Gemini => self.provider.gemini_api_key.clone(),
            ProviderKind::Mock => return None,
        };
        configured.or_else(|| kind.api_key_env().and_then(|name| env::var(name).ok()))
    }

    /// Tavily key, config first, then `TAVILY_API_KEY`
    pub fn search_api_key(&self) -> Option<String> {
        self.search
            .tavily_api_key
            .clone()
            .or_else(|| env::var("TAVILY_API_KEY").ok())
    }

    /// Per-call tool timeout
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.call_timeout_seconds)
    }

    /// Heartbeat period, if enabled
    pub fn heartbeat_period(&self) -> Option<Duration> {
        (self.events.heartbeat_seconds > 0).then(|| Duration::from_secs(self.events.heartbeat_seconds))
    }
}
