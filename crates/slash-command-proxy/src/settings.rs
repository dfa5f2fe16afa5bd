use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use slash_command_core::{CommandRegistration, ProxyOptions};

pub const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";
pub const DEFAULT_SUBJECT_PREFIX: &str = "slack-command-proxy";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(alias = "Commands")]
    pub commands: Vec<CommandRegistration>,
    #[serde(default)]
    pub proxy: ProxyOptions,
    #[serde(default)]
    pub nats: NatsSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NatsSettings {
    pub url: String,
    pub subject_prefix: String,
    /// JetStream stream to create on startup when missing.
    pub stream: Option<String>,
    pub connect_timeout_ms: u64,
}

impl Default for NatsSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_NATS_URL.to_string(),
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            stream: None,
            connect_timeout_ms: 5_000,
        }
    }
}

impl NatsSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub body_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            path: "/".to_string(),
            body_limit_bytes: 64 * 1024,
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(&path)
            .with_context(|| format!("failed to read config file {}", path.as_ref().display()))?;
        let settings: Settings = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse {}", path.as_ref().display()))?;
        Ok(settings)
    }

    /// Applies `NATS_URL` and `PORT` from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("NATS_URL").filter(|value| !value.trim().is_empty()) {
            self.nats.url = url;
        }
        if let Some(port) = lookup("PORT").filter(|value| !value.trim().is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT '{port}' is not a valid port"))?;
        }
        Ok(())
    }
}
