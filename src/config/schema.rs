use crate::errors::MessagingError;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the Backend Data Service, e.g. `https://api.atelier.community`.
    #[serde(default = "default_base_url", rename = "baseUrl")]
    pub base_url: String,
    /// Path of the chat endpoint (read and write).
    #[serde(default = "default_chat_path", rename = "chatPath")]
    pub chat_path: String,
    /// Path of the SSE insert feed for the messages table.
    #[serde(default = "default_feed_path", rename = "feedPath")]
    pub feed_path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_path: default_chat_path(),
            feed_path: default_feed_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret shared with the token issuer.
    #[serde(default, rename = "tokenSecret")]
    pub token_secret: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl", rename = "tokenTtlSecs")]
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Full inbox re-fetch period in seconds.
    #[serde(default = "default_poll_interval", rename = "pollIntervalSecs")]
    pub poll_interval_secs: u64,
    /// Whether to hold a realtime change-feed subscription alongside polling.
    #[serde(default = "default_true", rename = "feedEnabled")]
    pub feed_enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            feed_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), MessagingError> {
        Url::parse(&self.backend.base_url).map_err(|e| {
            MessagingError::Config(format!(
                "invalid backend.baseUrl {:?}: {}",
                self.backend.base_url, e
            ))
        })?;
        if !self.backend.chat_path.starts_with('/') {
            return Err(MessagingError::Config(format!(
                "backend.chatPath must start with '/': {:?}",
                self.backend.chat_path
            )));
        }
        if !self.backend.feed_path.starts_with('/') {
            return Err(MessagingError::Config(format!(
                "backend.feedPath must start with '/': {:?}",
                self.backend.feed_path
            )));
        }
        if self.sync.poll_interval_secs == 0 {
            return Err(MessagingError::Config(
                "sync.pollIntervalSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_chat_path() -> String {
    "/api/chat".to_string()
}

fn default_feed_path() -> String {
    "/api/chat/feed".to_string()
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_poll_interval() -> u64 {
    1
}

fn default_true() -> bool {
    true
}
