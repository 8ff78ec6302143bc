//! Configuration loader and validator for the clinic site core.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::PostColumns;

pub const DEFAULT_RESEND_BASE: &str = "https://api.resend.com/";
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_WEBHOOK_SOURCE: &str = "website-contact-form";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    /// Direct email channel; absent means the channel is never attempted.
    #[serde(default)]
    pub email: Option<Email>,
    /// Fallback webhook; absent means the fallback is a no-op.
    #[serde(default)]
    pub webhook: Option<Webhook>,
    #[serde(default)]
    pub posts: Posts,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub database_url: String,
    /// Address shown to visitors when their submission cannot be recorded.
    pub contact_address: String,
    /// Run schema provisioning from the write path when the table is missing.
    #[serde(default)]
    pub auto_provision: bool,
}

/// Resend-compatible email API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Email {
    pub api_key: String,
    pub from: String,
    pub to: String,
    #[serde(default = "default_resend_base")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Webhook {
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_webhook_source")]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Posts {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Known optional columns of the `posts` table; detected from the store when absent.
    #[serde(default)]
    pub columns: Option<PostColumns>,
}

impl Default for Posts {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            columns: None,
        }
    }
}

impl Webhook {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Posts {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn default_resend_base() -> String {
    DEFAULT_RESEND_BASE.to_string()
}

fn default_webhook_timeout() -> u64 {
    DEFAULT_WEBHOOK_TIMEOUT_SECS
}

fn default_webhook_source() -> String {
    DEFAULT_WEBHOOK_SOURCE.to_string()
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

impl Config {
    /// `DATABASE_URL` from the environment wins over the configured URL.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.app.database_url.clone())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.database_url.trim().is_empty() {
        return Err(ConfigError::Invalid("app.database_url must be non-empty"));
    }
    if cfg.app.contact_address.trim().is_empty() {
        return Err(ConfigError::Invalid("app.contact_address must be non-empty"));
    }

    if let Some(email) = &cfg.email {
        if email.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("email.api_key must be non-empty"));
        }
        if email.from.trim().is_empty() {
            return Err(ConfigError::Invalid("email.from must be non-empty"));
        }
        if email.to.trim().is_empty() {
            return Err(ConfigError::Invalid("email.to must be non-empty"));
        }
        if Url::parse(&email.base_url).is_err() {
            return Err(ConfigError::Invalid("email.base_url must be a valid URL"));
        }
    }

    if let Some(webhook) = &cfg.webhook {
        if Url::parse(&webhook.url).is_err() {
            return Err(ConfigError::Invalid("webhook.url must be a valid URL"));
        }
        if webhook.timeout_secs == 0 {
            return Err(ConfigError::Invalid("webhook.timeout_secs must be > 0"));
        }
    }

    if cfg.posts.cache_ttl_secs == 0 {
        return Err(ConfigError::Invalid("posts.cache_ttl_secs must be > 0"));
    }

    Ok(())
}

/// Example configuration with every section filled in.
pub fn example() -> &'static str {
    r#"app:
  database_url: "sqlite://./data/clinic.db"
  contact_address: "hello@ecall.com.sb"
  auto_provision: false

email:
  api_key: "YOUR_RESEND_API_KEY"
  from: "website@ecall.com.sb"
  to: "hello@ecall.com.sb"

webhook:
  url: "https://ecall.com.sb/api/webhooks/email"
  secret: "YOUR_WEBHOOK_SECRET"
  timeout_secs: 10

posts:
  cache_ttl_secs: 300
  columns:
    slug: true
    published: true
    category: true
    author: true
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.email.as_ref().unwrap().base_url, DEFAULT_RESEND_BASE);
        let webhook = cfg.webhook.as_ref().unwrap();
        assert_eq!(webhook.timeout(), Duration::from_secs(10));
        assert_eq!(webhook.source, DEFAULT_WEBHOOK_SOURCE);
        assert_eq!(cfg.posts.columns, Some(PostColumns::all()));
    }

    #[test]
    fn channels_and_posts_are_optional() {
        let cfg: Config = serde_yaml::from_str(
            "app:\n  database_url: \"sqlite::memory:\"\n  contact_address: \"hello@ecall.com.sb\"\n",
        )
        .unwrap();
        validate(&cfg).unwrap();
        assert!(cfg.email.is_none());
        assert!(cfg.webhook.is_none());
        assert!(!cfg.app.auto_provision);
        assert_eq!(cfg.posts.cache_ttl(), Duration::from_secs(300));
        assert!(cfg.posts.columns.is_none());
    }

    #[test]
    fn invalid_app_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.contact_address = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("contact_address")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.database_url = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_channel_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.email.as_mut().unwrap().api_key = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("email.api_key")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.webhook.as_mut().unwrap().url = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.webhook.as_mut().unwrap().timeout_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.posts.cache_ttl_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.contact_address, "hello@ecall.com.sb");
        assert_eq!(cfg.email.unwrap().to, "hello@ecall.com.sb");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
