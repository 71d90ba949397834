//! Configuration module for BaliFeed.

use serde::Deserialize;
use std::path::Path;

use crate::{AppError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite file backing the document store.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/balifeed.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/balifeed.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Pub/Sub push endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PubsubConfig {
    /// Shared key expected in `X-API-Key` or the `key` query parameter.
    ///
    /// The value `"dev"` disables the check.
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

/// API key value that turns authentication off.
pub const DEV_API_KEY: &str = "dev";

fn default_api_key() -> String {
    DEV_API_KEY.to_string()
}

impl PubsubConfig {
    /// Check if the endpoints run without authentication.
    pub fn is_dev(&self) -> bool {
        self.api_key == DEV_API_KEY
    }
}

impl Default for PubsubConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
        }
    }
}

/// Push gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Enable delivery through FCM. When disabled, sends are logged only.
    #[serde(default)]
    pub enabled: bool,
    /// Firebase project ID.
    #[serde(default)]
    pub project_id: String,
    /// OAuth2 bearer token for the FCM HTTP v1 API.
    #[serde(default)]
    pub access_token: String,
    /// Base URL of the FCM API.
    #[serde(default = "default_fcm_endpoint")]
    pub endpoint: String,
    /// Request timeout in seconds.
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
    /// Notification accent color on Android.
    #[serde(default = "default_android_color")]
    pub android_color: String,
    /// Click action delivered in the data block.
    #[serde(default = "default_click_action")]
    pub click_action: String,
    /// Title of reply notifications; `{name}` is replaced by the replier's name.
    #[serde(default = "default_reply_title")]
    pub reply_title: String,
    /// Maximum number of subscribers notified concurrently.
    #[serde(default = "default_fanout_concurrency")]
    pub fanout_concurrency: usize,
}

fn default_fcm_endpoint() -> String {
    "https://fcm.googleapis.com".to_string()
}

fn default_push_timeout() -> u64 {
    10
}

fn default_android_color() -> String {
    "#4CB050".to_string()
}

fn default_click_action() -> String {
    "FLUTTER_NOTIFICATION_CLICK".to_string()
}

fn default_reply_title() -> String {
    "{name} membalas komentar anda:".to_string()
}

fn default_fanout_concurrency() -> usize {
    8
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            project_id: String::new(),
            access_token: String::new(),
            endpoint: default_fcm_endpoint(),
            timeout_secs: default_push_timeout(),
            android_color: default_android_color(),
            click_action: default_click_action(),
            reply_title: default_reply_title(),
            fanout_concurrency: default_fanout_concurrency(),
        }
    }
}

/// Maps a category ID to the collection holding its entries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionRoute {
    /// Category ID.
    pub category_id: i64,
    /// Collection name.
    pub collection: String,
}

/// Category resolution and entry partitioning rules.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    /// Feed IDs of the alternate source, always resolved to `alternate_category`.
    #[serde(default = "default_alternate_feed_ids")]
    pub alternate_feed_ids: Vec<i64>,
    /// Sentinel category key used for the alternate source.
    #[serde(default = "default_alternate_category")]
    pub alternate_category: String,
    /// Exact category-to-collection routes.
    #[serde(default = "default_collection_routes")]
    pub collection_routes: Vec<CollectionRoute>,
    /// Categories above this ID go to `overflow_collection`.
    #[serde(default = "default_overflow_above")]
    pub overflow_above: Option<i64>,
    /// Collection for categories above `overflow_above`.
    #[serde(default = "default_alternate_category")]
    pub overflow_collection: String,
    /// Collection for every other category.
    #[serde(default = "default_entry_collection")]
    pub default_collection: String,
}

fn default_alternate_feed_ids() -> Vec<i64> {
    (33..=40).collect()
}

fn default_alternate_category() -> String {
    "balebengong".to_string()
}

fn default_collection_routes() -> Vec<CollectionRoute> {
    vec![
        CollectionRoute {
            category_id: 11,
            collection: "kriminal".to_string(),
        },
        CollectionRoute {
            category_id: 12,
            collection: "baliunited".to_string(),
        },
    ]
}

fn default_overflow_above() -> Option<i64> {
    Some(12)
}

fn default_entry_collection() -> String {
    "entries".to_string()
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            alternate_feed_ids: default_alternate_feed_ids(),
            alternate_category: default_alternate_category(),
            collection_routes: default_collection_routes(),
            overflow_above: default_overflow_above(),
            overflow_collection: default_alternate_category(),
            default_collection: default_entry_collection(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Pub/Sub endpoint configuration.
    #[serde(default)]
    pub pubsub: PubsubConfig,
    /// Push gateway configuration.
    #[serde(default)]
    pub push: PushConfig,
    /// Category rules.
    #[serde(default)]
    pub categories: CategoryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(AppError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| AppError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `BALIFEED_PUBSUB_API_KEY`: Override the Pub/Sub API key
    /// - `BALIFEED_FCM_ACCESS_TOKEN`: Override the FCM bearer token
    /// - `BALIFEED_FCM_PROJECT_ID`: Override the Firebase project ID
    pub fn apply_env_overrides(&mut self) {
        override_from_env("BALIFEED_PUBSUB_API_KEY", &mut self.pubsub.api_key);
        override_from_env("BALIFEED_FCM_ACCESS_TOKEN", &mut self.push.access_token);
        override_from_env("BALIFEED_FCM_PROJECT_ID", &mut self.push.project_id);
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - Push is enabled but the project ID or access token is not set
    /// - The alternate category key is empty
    pub fn validate(&self) -> Result<()> {
        if self.push.enabled && self.push.project_id.is_empty() {
            return Err(AppError::Config(
                "push is enabled but project_id is not set. \
                 Set it in config.toml or via BALIFEED_FCM_PROJECT_ID environment variable."
                    .to_string(),
            ));
        }
        if self.push.enabled && self.push.access_token.is_empty() {
            return Err(AppError::Config(
                "push is enabled but access_token is not set. \
                 Set it in config.toml or via BALIFEED_FCM_ACCESS_TOKEN environment variable."
                    .to_string(),
            ));
        }
        if self.categories.alternate_category.is_empty() {
            return Err(AppError::Config(
                "categories.alternate_category must not be empty".to_string(),
            ));
        }
        if self.push.fanout_concurrency == 0 {
            return Err(AppError::Config(
                "push.fanout_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn override_from_env(name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(name) {
        if !value.is_empty() {
            *target = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);

        assert_eq!(config.database.path, "data/balifeed.db");

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/balifeed.log");

        assert!(config.pubsub.is_dev());

        assert!(!config.push.enabled);
        assert_eq!(config.push.endpoint, "https://fcm.googleapis.com");
        assert_eq!(config.push.timeout_secs, 10);
        assert_eq!(config.push.android_color, "#4CB050");
        assert_eq!(config.push.click_action, "FLUTTER_NOTIFICATION_CLICK");
        assert_eq!(config.push.reply_title, "{name} membalas komentar anda:");
        assert_eq!(config.push.fanout_concurrency, 8);

        assert_eq!(config.categories.alternate_feed_ids, (33..=40).collect::<Vec<_>>());
        assert_eq!(config.categories.alternate_category, "balebengong");
        assert_eq!(config.categories.collection_routes.len(), 2);
        assert_eq!(config.categories.overflow_above, Some(12));
        assert_eq!(config.categories.overflow_collection, "balebengong");
        assert_eq!(config.categories.default_collection, "entries");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
path = "custom/store.db"

[logging]
level = "debug"
file = "custom.log"

[pubsub]
api_key = "s3cret"

[push]
enabled = true
project_id = "balifeed-prod"
access_token = "ya29.token"
timeout_secs = 5
fanout_concurrency = 2

[categories]
alternate_feed_ids = [1, 2]
alternate_category = "alt"
overflow_above = 20
overflow_collection = "archive"

[[categories.collection_routes]]
category_id = 3
collection = "sports"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, "custom/store.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.pubsub.api_key, "s3cret");
        assert!(!config.pubsub.is_dev());
        assert!(config.push.enabled);
        assert_eq!(config.push.project_id, "balifeed-prod");
        assert_eq!(config.push.timeout_secs, 5);
        assert_eq!(config.push.fanout_concurrency, 2);
        assert_eq!(config.push.android_color, "#4CB050");
        assert_eq!(config.categories.alternate_feed_ids, vec![1, 2]);
        assert_eq!(config.categories.alternate_category, "alt");
        assert_eq!(
            config.categories.collection_routes,
            vec![CollectionRoute {
                category_id: 3,
                collection: "sports".to_string()
            }]
        );
        assert_eq!(config.categories.overflow_above, Some(20));
        assert_eq!(config.categories.default_collection, "entries");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.categories.alternate_category, "balebengong");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        if let Err(AppError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(AppError::Io(_))));
    }

    #[test]
    fn test_apply_env_overrides_api_key() {
        let original = std::env::var("BALIFEED_PUBSUB_API_KEY").ok();

        std::env::set_var("BALIFEED_PUBSUB_API_KEY", "env-key");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.pubsub.api_key, "env-key");

        if let Some(val) = original {
            std::env::set_var("BALIFEED_PUBSUB_API_KEY", val);
        } else {
            std::env::remove_var("BALIFEED_PUBSUB_API_KEY");
        }
    }

    #[test]
    fn test_apply_env_overrides_empty_value() {
        let original = std::env::var("BALIFEED_FCM_ACCESS_TOKEN").ok();

        // Empty values do not override.
        std::env::set_var("BALIFEED_FCM_ACCESS_TOKEN", "");
        let mut config = Config::default();
        config.push.access_token = "file-token".to_string();
        config.apply_env_overrides();
        assert_eq!(config.push.access_token, "file-token");

        if let Some(val) = original {
            std::env::set_var("BALIFEED_FCM_ACCESS_TOKEN", val);
        } else {
            std::env::remove_var("BALIFEED_FCM_ACCESS_TOKEN");
        }
    }

    #[test]
    fn test_validate_push_enabled_without_credentials() {
        let mut config = Config::default();
        config.push.enabled = true;

        let result = config.validate();
        if let Err(AppError::Config(msg)) = result {
            assert!(msg.contains("project_id"));
        } else {
            panic!("Expected Config error");
        }

        config.push.project_id = "p".to_string();
        let result = config.validate();
        if let Err(AppError::Config(msg)) = result {
            assert!(msg.contains("access_token"));
        } else {
            panic!("Expected Config error");
        }

        config.push.access_token = "t".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_alternate_category() {
        let mut config = Config::default();
        config.categories.alternate_category = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_push_disabled() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }
}
