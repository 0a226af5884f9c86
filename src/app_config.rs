//! Application configuration from file and environment variables
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (prefixed with HUDDLE_, section and key joined
//!    by a double underscore: HUDDLE_REDIS__URL, HUDDLE_PUSH__SERVER_KEY)
//! 2. Config file (config.toml)
//! 3. Default values
//!
//! Secrets like the push provider server key should be kept in environment
//! variables, not in the config file.

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Global application configuration
pub static APP_CONFIG: Lazy<RwLock<AppConfig>> = Lazy::new(|| {
    RwLock::new(AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config file, using defaults: {}", e);
        AppConfig::default()
    }))
});

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Redis configuration (token cache and notification queue)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/".to_string(),
        }
    }
}

/// Push provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Provider send endpoint
    pub api_url: String,
    /// Server key (should be in env var HUDDLE_PUSH__SERVER_KEY)
    #[serde(default)]
    pub server_key: String,
    /// Icon path delivered in the webpush payload
    pub icon: String,
    /// Badge path delivered in the webpush payload
    pub badge: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            api_url: "https://fcm.googleapis.com/fcm/send".to_string(),
            server_key: String::new(),
            icon: "/icon.png".to_string(),
            badge: "/badge.png".to_string(),
        }
    }
}

/// Notification queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue topic key
    pub topic: String,
    /// Maximum broker reconnect attempts before giving up
    pub reconnect_max_attempts: u32,
    /// Backoff step between reconnect attempts, in milliseconds
    pub reconnect_backoff_ms: u64,
    /// Backoff ceiling, in milliseconds
    pub reconnect_backoff_cap_ms: u64,
    /// Consumer blocking-read timeout, in seconds
    pub consumer_block_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topic: "chat-notifications".to_string(),
            reconnect_max_attempts: 8,
            reconnect_backoff_ms: 500,
            reconnect_backoff_cap_ms: 3000,
            consumer_block_secs: 5,
        }
    }
}

/// Realtime chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// How long a disconnected user keeps their presence sample before
    /// eviction, in milliseconds. Absorbs transient network drops.
    pub presence_grace_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            presence_grace_ms: 5000,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub push: PushConfig,
    pub queue: QueueConfig,
    pub chat: ChatConfig,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        use config::FileFormat;

        let config = Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file (optional)
            .add_source(File::new(path, FileFormat::Toml).required(false))
            // Override with environment variables (HUDDLE_ prefix). The
            // section/key separator is a double underscore so snake_case
            // keys survive: HUDDLE_REDIS__URL, HUDDLE_PUSH__SERVER_KEY,
            // HUDDLE_QUEUE__RECONNECT_MAX_ATTEMPTS.
            .add_source(
                Environment::with_prefix("HUDDLE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

/// Initialize application configuration
///
/// This triggers the lazy loading of the config file and logs the result.
/// Should be called early in application startup.
pub fn init() {
    let config = APP_CONFIG.read().unwrap();
    log::info!(
        "Configuration loaded: server.bind = {}, queue.topic = {}",
        config.server.bind,
        config.queue.topic
    );
}

// Convenience functions for accessing global config

/// Get the current application configuration
pub fn get_config() -> AppConfig {
    APP_CONFIG.read().map(|c| c.clone()).unwrap_or_default()
}

/// Get server configuration
pub fn server() -> ServerConfig {
    get_config().server
}

/// Get redis configuration
pub fn redis() -> RedisConfig {
    get_config().redis
}

/// Get push provider configuration
pub fn push() -> PushConfig {
    get_config().push
}

/// Get notification queue configuration
pub fn queue() -> QueueConfig {
    get_config().queue
}

/// Get realtime chat configuration
pub fn chat() -> ChatConfig {
    get_config().chat
}
