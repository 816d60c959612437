//! Configuration for the `lostfound` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/lostfound/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use lostfound_proto::model::Identity;

use crate::api::http::DEFAULT_REQUEST_TIMEOUT;
use crate::auth::{DEFAULT_ALLOWED_DOMAIN, DomainPolicy};
use crate::chat::EngineConfig;
use crate::chat::engine::{DEFAULT_EVENT_BUFFER, DEFAULT_POLL_INTERVAL, DEFAULT_SCROLL_DELAY};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    api: ApiFileConfig,
    auth: AuthFileConfig,
    chat: ChatFileConfig,
}

/// `[api]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ApiFileConfig {
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// `[auth]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthFileConfig {
    token: Option<String>,
    user_id: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
    allowed_domains: Option<Vec<String>>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    poll_interval_ms: Option<u64>,
    scroll_delay_ms: Option<u64>,
    event_buffer: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- API --
    /// Backend base URL.
    pub api_base_url: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,

    // -- Auth --
    /// Bearer token.
    pub token: Option<String>,
    /// Provider user id of the signed-in identity.
    pub user_id: Option<String>,
    /// E-mail of the signed-in identity.
    pub email: Option<String>,
    /// Display name of the signed-in identity.
    pub display_name: Option<String>,
    /// E-mail domains allowed to sign in. Empty allows all.
    pub allowed_domains: Vec<String>,

    // -- Chat --
    /// Delay between incremental message polls.
    pub poll_interval: Duration,
    /// Delay before scroll-to-end is requested.
    pub scroll_delay: Duration,
    /// Buffer size for the engine event channel.
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            token: None,
            user_id: None,
            email: None,
            display_name: None,
            allowed_domains: vec![DEFAULT_ALLOWED_DOMAIN.to_string()],
            poll_interval: DEFAULT_POLL_INTERVAL,
            scroll_delay: DEFAULT_SCROLL_DELAY,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path
    /// (`~/.config/lostfound/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Kept apart from `load()` so it can be
    /// tested without touching the filesystem.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            api_base_url: cli
                .api_base
                .clone()
                .or_else(|| file.api.base_url.clone()),
            request_timeout: file
                .api
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            token: cli.token.clone().or_else(|| file.auth.token.clone()),
            user_id: cli.user_id.clone().or_else(|| file.auth.user_id.clone()),
            email: cli.email.clone().or_else(|| file.auth.email.clone()),
            display_name: file.auth.display_name.clone(),
            allowed_domains: file
                .auth
                .allowed_domains
                .clone()
                .unwrap_or(defaults.allowed_domains),
            poll_interval: file
                .chat
                .poll_interval_ms
                .map_or(defaults.poll_interval, Duration::from_millis),
            scroll_delay: file
                .chat
                .scroll_delay_ms
                .map_or(defaults.scroll_delay, Duration::from_millis),
            event_buffer: file.chat.event_buffer.unwrap_or(defaults.event_buffer),
        }
    }

    /// Engine timing and buffering derived from this configuration.
    #[must_use]
    pub const fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: self.poll_interval,
            scroll_delay: self.scroll_delay,
            event_buffer: self.event_buffer,
        }
    }

    /// Allowed-domain policy derived from this configuration.
    #[must_use]
    pub fn domain_policy(&self) -> DomainPolicy {
        DomainPolicy::new(&self.allowed_domains)
    }

    /// The signed-in identity, if both a user id and an e-mail are set.
    ///
    /// The display name falls back to the e-mail address.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        let user_id = self.user_id.clone()?;
        let email = self.email.clone()?;
        if user_id.is_empty() {
            return None;
        }
        let display_name = self.display_name.clone().unwrap_or_else(|| email.clone());
        Some(Identity::new(user_id, email, display_name))
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Campus lost-and-found chat client")]
pub struct CliArgs {
    /// Backend base URL.
    #[arg(long, env = "LOSTFOUND_API_BASE")]
    pub api_base: Option<String>,

    /// Bearer token issued by the auth provider.
    #[arg(long, env = "LOSTFOUND_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Provider user id of the signed-in user.
    #[arg(long, env = "LOSTFOUND_USER_ID")]
    pub user_id: Option<String>,

    /// E-mail of the signed-in user.
    #[arg(long, env = "LOSTFOUND_EMAIL")]
    pub email: Option<String>,

    /// Path to config file (default: `~/.config/lostfound/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "LOSTFOUND_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/lostfound.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Client subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sync the configured identity with the backend and print the user id.
    Whoami,
    /// Print the profile of the signed-in user.
    Profile,
    /// List conversations.
    Chats {
        /// Only show conversations matching this text.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Follow a conversation; lines read from stdin are sent to it.
    Open {
        /// Conversation id.
        chat_id: String,
    },
    /// Start (or resume) the conversation about an item, then follow it.
    Start {
        /// Item id.
        item_id: String,
    },
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("lostfound").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
