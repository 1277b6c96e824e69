//! Server configuration loaded from environment variables.
//!
//! Everything except the platform token has a default so the server can
//! start with minimal configuration for local use.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use chronicle_shared::constants::{APP_NAME, DEFAULT_API_BASE};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Bot token used for every platform call.
    /// Env: `DISCORD_TOKEN`
    pub discord_token: Option<String>,

    /// REST API base URL.
    /// Env: `API_BASE`
    /// Default: `https://discord.com/api/v10`
    pub api_base: String,

    /// Socket address for the HTTP control API.
    /// Env: `HTTP_ADDR`
    /// Default: `127.0.0.1:8080`
    pub http_addr: SocketAddr,

    /// Directory holding record files and checkpoints.
    /// Env: `ARCHIVE_DIR`
    /// Default: the platform data directory (`.../chronicle/archives`).
    pub archive_dir: Option<PathBuf>,

    /// Bearer token required on every route except `/health`.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (no authentication).
    pub admin_token: Option<String>,

    /// Name of the per-run delivery webhook.
    /// Env: `WEBHOOK_NAME`
    /// Default: `chronicle`
    pub webhook_name: String,

    /// Sustained delivery calls per second, per webhook.
    /// Env: `DELIVERY_RATE`
    /// Default: `1.0`
    pub delivery_rate: f64,

    /// Delivery burst size, per webhook.
    /// Env: `DELIVERY_BURST`
    /// Default: `5`
    pub delivery_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            discord_token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            http_addr: ([127, 0, 0, 1], 8080).into(),
            archive_dir: None,
            admin_token: None,
            webhook_name: APP_NAME.to_string(),
            delivery_rate: 1.0,
            delivery_burst: 5.0,
        }
    }
}

// Tokens stay out of the startup log.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("discord_token", &self.discord_token.as_ref().map(|_| "<set>"))
            .field("api_base", &self.api_base)
            .field("http_addr", &self.http_addr)
            .field("archive_dir", &self.archive_dir)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<set>"))
            .field("webhook_name", &self.webhook_name)
            .field("delivery_rate", &self.delivery_rate)
            .field("delivery_burst", &self.delivery_burst)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(token) = lookup("DISCORD_TOKEN").filter(|t| !t.is_empty()) {
            config.discord_token = Some(token);
        }

        if let Some(base) = lookup("API_BASE").filter(|b| !b.is_empty()) {
            config.api_base = base;
        }

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(dir) = lookup("ARCHIVE_DIR").filter(|d| !d.is_empty()) {
            config.archive_dir = Some(PathBuf::from(dir));
        }

        if let Some(token) = lookup("ADMIN_TOKEN").filter(|t| !t.is_empty()) {
            config.admin_token = Some(token);
        }

        if let Some(name) = lookup("WEBHOOK_NAME").filter(|n| !n.trim().is_empty()) {
            config.webhook_name = name;
        }

        if let Some(value) = lookup("DELIVERY_RATE") {
            match parse_positive(&value) {
                Some(rate) => config.delivery_rate = rate,
                None => tracing::warn!(value = %value, "Invalid DELIVERY_RATE, using default"),
            }
        }

        if let Some(value) = lookup("DELIVERY_BURST") {
            match parse_positive(&value).filter(|burst| *burst >= 1.0) {
                Some(burst) => config.delivery_burst = burst,
                None => tracing::warn!(value = %value, "Invalid DELIVERY_BURST, using default"),
            }
        }

        config
    }
}

fn parse_positive(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 8080).into());
        assert_eq!(config.webhook_name, "chronicle");
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_values_from_environment() {
        let config = from_pairs(&[
            ("DISCORD_TOKEN", "abc"),
            ("HTTP_ADDR", "0.0.0.0:9000"),
            ("ARCHIVE_DIR", "/var/lib/chronicle"),
            ("DELIVERY_RATE", "0.5"),
            ("DELIVERY_BURST", "3"),
        ]);
        assert_eq!(config.discord_token.as_deref(), Some("abc"));
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 9000).into());
        assert_eq!(config.archive_dir, Some(PathBuf::from("/var/lib/chronicle")));
        assert_eq!(config.delivery_rate, 0.5);
        assert_eq!(config.delivery_burst, 3.0);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "not an address"),
            ("DELIVERY_RATE", "-1"),
            ("DELIVERY_BURST", "0.5"),
            ("ADMIN_TOKEN", ""),
        ]);
        assert_eq!(config.http_addr, ServerConfig::default().http_addr);
        assert_eq!(config.delivery_rate, 1.0);
        assert_eq!(config.delivery_burst, 5.0);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_debug_hides_tokens() {
        let config = from_pairs(&[("DISCORD_TOKEN", "secret"), ("ADMIN_TOKEN", "hunter2")]);
        let printed = format!("{config:?}");
        assert!(!printed.contains("secret"));
        assert!(!printed.contains("hunter2"));
    }
}
