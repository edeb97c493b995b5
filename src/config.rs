//! Configuration management for Voxlog
//!
//! Loads settings from a TOML file at ~/.voxlog/config.toml, then applies
//! environment overrides. Everything the service needs to run is checked once
//! by [`Config::validate`] before anything starts.

use crate::error::{CoreError, Result};
use crate::gateway::{ChannelId, GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Presence gateway credentials
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Monitored scopes (one voice channel each)
    #[serde(default, rename = "scope", alias = "scopes")]
    pub scopes: Vec<ScopeConfig>,

    /// Storage backend: "db" (SQLite, default) or "ephemeral" (in-memory)
    #[serde(default)]
    pub storage: Storage,

    /// What to do with a session left open by a previous run
    #[serde(default)]
    pub recovery: Recovery,

    /// Display settings for user-facing replies
    #[serde(default)]
    pub display: DisplayConfig,

    /// Data directory (defaults to ~/.voxlog)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Optional directory for daily-rotated log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".voxlog"))
        .unwrap_or_else(|| PathBuf::from(".voxlog"))
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server port (default: 5000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server host (default: 0.0.0.0 so external uptime checks can reach it)
    #[serde(default = "default_host")]
    pub host: String,

    /// Optional API key for the /api routes.
    /// Required in Authorization header if set: "Authorization: Bearer <key>"
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_port() -> u16 {
    5000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            host: default_host(),
            api_key: None,
        }
    }
}

/// Presence gateway credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bot token handed to the relay
    #[serde(default)]
    pub token: Option<String>,

    /// User id of the automated participant (ignored in member lists)
    #[serde(default)]
    pub bot_user_id: Option<UserId>,
}

/// A monitored scope as written in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Label used in logs and on stored rows
    #[serde(default = "default_scope_name")]
    pub name: String,

    #[serde(default)]
    pub guild_id: Option<GuildId>,

    /// Voice channel whose occupancy is tracked
    #[serde(default)]
    pub voice_channel_id: Option<ChannelId>,

    /// Text channel receiving automatic transition notices
    #[serde(default)]
    pub notification_channel_id: Option<ChannelId>,
}

fn default_scope_name() -> String {
    "default".to_string()
}

/// A fully-specified monitored scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredScope {
    pub name: String,
    pub guild_id: GuildId,
    pub voice_channel_id: ChannelId,
    pub notification_channel_id: ChannelId,
}

/// Storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    /// SQLite database under data_dir
    #[default]
    Db,
    /// In-memory store; rows are lost on exit
    Ephemeral,
}

/// Restart policy for a session still open in the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recovery {
    /// Adopt it as the scope's current open session
    #[default]
    Resume,
    /// Close it immediately, counting time up to startup
    Close,
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Offset applied to timestamps in replies (default: 540 = JST)
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

fn default_utc_offset() -> i32 {
    540
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            utc_offset_minutes: default_utc_offset(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            gateway: GatewayConfig::default(),
            scopes: vec![],
            storage: Storage::default(),
            recovery: Recovery::default(),
            display: DisplayConfig::default(),
            data_dir: default_data_dir(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_path(path.as_ref());

        if !expanded_path.exists() {
            return Err(CoreError::Config(format!(
                "Configuration file not found: {}",
                expanded_path.display()
            )));
        }

        let content = std::fs::read_to_string(&expanded_path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config)
    }

    /// Get the data directory, expanding ~ if present
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> SocketAddr {
        use std::net::ToSocketAddrs;

        format!("{}:{}", self.server.host, self.server.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], self.server.port)))
    }

    /// Apply environment variable overrides.
    ///
    /// `GUILD_ID`, `MONITORED_CHANNEL_ID` and `DESIGNATED_CHANNEL_ID` fill in the
    /// first scope, creating it if the file declared none.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("VOXLOG_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("VOXLOG_SERVER_PORT").or_else(|| var("PORT")) {
            self.server.port = port
                .parse()
                .map_err(|_| CoreError::Config(format!("invalid port: {port}")))?;
        }
        if let Some(key) = var("VOXLOG_API_KEY") {
            self.server.api_key = if key.is_empty() { None } else { Some(key) };
        }
        if let Some(data_dir) = var("VOXLOG_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Some(token) = var("DISCORD_TOKEN") {
            self.gateway.token = Some(token);
        }
        if let Some(id) = var("BOT_USER_ID") {
            self.gateway.bot_user_id = Some(UserId(parse_id("BOT_USER_ID", &id)?));
        }

        let guild = var("GUILD_ID");
        let voice = var("MONITORED_CHANNEL_ID");
        let notify = var("DESIGNATED_CHANNEL_ID");
        if guild.is_some() || voice.is_some() || notify.is_some() {
            if self.scopes.is_empty() {
                self.scopes.push(ScopeConfig {
                    name: default_scope_name(),
                    ..ScopeConfig::default()
                });
            }
            let scope = &mut self.scopes[0];
            if let Some(id) = guild {
                scope.guild_id = Some(GuildId(parse_id("GUILD_ID", &id)?));
            }
            if let Some(id) = voice {
                scope.voice_channel_id = Some(ChannelId(parse_id("MONITORED_CHANNEL_ID", &id)?));
            }
            if let Some(id) = notify {
                scope.notification_channel_id =
                    Some(ChannelId(parse_id("DESIGNATED_CHANNEL_ID", &id)?));
            }
        }
        Ok(())
    }

    /// Check every required value, reporting all that are missing at once
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.gateway.token.as_deref().map_or(true, str::is_empty) {
            missing.push("gateway.token (DISCORD_TOKEN)".to_string());
        }
        if self.gateway.bot_user_id.is_none() {
            missing.push("gateway.bot_user_id (BOT_USER_ID)".to_string());
        }
        if self.scopes.is_empty() {
            missing.push("at least one [[scope]]".to_string());
        }
        for scope in &self.scopes {
            if scope.guild_id.is_none() {
                missing.push(format!("scope '{}': guild_id (GUILD_ID)", scope.name));
            }
            if scope.voice_channel_id.is_none() {
                missing.push(format!(
                    "scope '{}': voice_channel_id (MONITORED_CHANNEL_ID)",
                    scope.name
                ));
            }
            if scope.notification_channel_id.is_none() {
                missing.push(format!(
                    "scope '{}': notification_channel_id (DESIGNATED_CHANNEL_ID)",
                    scope.name
                ));
            }
        }

        if !missing.is_empty() {
            return Err(CoreError::Config(format!(
                "missing required values: {}",
                missing.join(", ")
            )));
        }

        let mut names = std::collections::HashSet::new();
        let mut guilds = std::collections::HashSet::new();
        let mut channels = std::collections::HashSet::new();
        for scope in &self.scopes {
            if !names.insert(scope.name.as_str()) {
                return Err(CoreError::Config(format!(
                    "duplicate scope name '{}'",
                    scope.name
                )));
            }
            if !guilds.insert(scope.guild_id) {
                return Err(CoreError::Config(format!(
                    "scope '{}' repeats a guild already monitored",
                    scope.name
                )));
            }
            if !channels.insert(scope.voice_channel_id) {
                return Err(CoreError::Config(format!(
                    "scope '{}' repeats a voice channel already monitored",
                    scope.name
                )));
            }
        }

        Ok(())
    }

    /// Resolved scopes. Call after [`Config::validate`].
    pub fn monitored_scopes(&self) -> Result<Vec<MonitoredScope>> {
        self.scopes
            .iter()
            .map(|s| match (s.guild_id, s.voice_channel_id, s.notification_channel_id) {
                (Some(guild_id), Some(voice_channel_id), Some(notification_channel_id)) => {
                    Ok(MonitoredScope {
                        name: s.name.clone(),
                        guild_id,
                        voice_channel_id,
                        notification_channel_id,
                    })
                }
                _ => Err(CoreError::Config(format!(
                    "scope '{}' is incomplete",
                    s.name
                ))),
            })
            .collect()
    }

    /// Create a default configuration file at the given path
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let content = r#"# Voxlog Configuration

# "db" = SQLite under data_dir, "ephemeral" = in-memory (lost on exit)
storage = "db"

# Session left open by a previous run: "resume" keeps timing it,
# "close" closes it at startup
recovery = "resume"

# data_dir = "~/.voxlog"
# log_dir = "~/.voxlog/logs"

[server]
# Port for the liveness endpoint and API (env: PORT)
port = 5000
host = "0.0.0.0"

# If set, /api routes require: Authorization: Bearer <api_key>
# api_key = "your-secret-key"

[gateway]
# env: DISCORD_TOKEN
# token = "..."
# env: BOT_USER_ID
# bot_user_id = 123456789012345678

[display]
utc_offset_minutes = 540

# One block per monitored voice channel
[[scope]]
name = "default"
# guild_id = 123456789012345678
# voice_channel_id = 123456789012345678
# notification_channel_id = 123456789012345678
"#;

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        Ok(())
    }
}

fn parse_id(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::Config(format!("{key} is not a numeric id: {value}")))
}

/// Expand ~ to home directory in paths
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
