//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the server starts with zero configuration
//! for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tableau_shared::constants::{
    DEFAULT_CHAT_HISTORY_LIMIT, DEFAULT_HTTP_PORT, DEFAULT_JOIN_REQUEST_TTL_SECS,
    DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_OUTBOUND_BUFFER,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for HTTP and WebSocket traffic.
    /// Env: `HTTP_ADDR`, or `PORT` (binds `0.0.0.0:$PORT`)
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// Directory holding one JSON metadata record per room.
    /// Env: `ROOM_STORE_PATH`
    /// Default: unset (records kept in memory only).
    pub room_store_path: Option<PathBuf>,

    /// Origin of the browser front end. When set, CORS only admits this
    /// host and hosts ending in one of `cors_host_suffixes`.
    /// Env: `FRONTEND_URL`
    pub frontend_url: Option<String>,

    /// Extra host suffixes admitted by CORS, e.g. `.vercel.app` for
    /// preview deployments.
    /// Env: `CORS_ALLOWED_HOST_SUFFIXES` (comma separated)
    pub cors_host_suffixes: Vec<String>,

    /// Public chat messages kept per room.
    /// Env: `CHAT_HISTORY_LIMIT`
    pub chat_history_limit: usize,

    /// Age after which an unanswered join request is rejected.
    /// Env: `JOIN_REQUEST_TTL_SECS` (0 disables expiry)
    pub join_request_ttl: Option<Duration>,

    /// Outbound frames queued per connection.
    /// Env: `OUTBOUND_BUFFER`
    pub outbound_buffer: usize,

    /// Largest inbound WebSocket message in bytes.
    /// Env: `MAX_MESSAGE_BYTES`
    pub max_message_bytes: usize,

    /// Sustained inbound events per second per connection.
    /// Env: `EVENT_RATE`
    pub event_rate: f64,

    /// Inbound event burst per connection.
    /// Env: `EVENT_BURST`
    pub event_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            room_store_path: None,
            frontend_url: None,
            cors_host_suffixes: Vec::new(),
            chat_history_limit: DEFAULT_CHAT_HISTORY_LIMIT,
            join_request_ttl: Some(Duration::from_secs(DEFAULT_JOIN_REQUEST_TTL_SECS)),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            event_rate: 200.0,
            event_burst: 400.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        } else if let Some(port) = var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => config.http_addr = ([0, 0, 0, 0], port).into(),
                Err(_) => tracing::warn!(value = %port, "Invalid PORT, using default"),
            }
        }

        if let Some(path) = var("ROOM_STORE_PATH").filter(|p| !p.is_empty()) {
            config.room_store_path = Some(PathBuf::from(path));
        }

        if let Some(url) = var("FRONTEND_URL").filter(|u| !u.is_empty()) {
            config.frontend_url = Some(url);
        }

        if let Some(list) = var("CORS_ALLOWED_HOST_SUFFIXES") {
            config.cors_host_suffixes = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(n) = parse_var::<usize>(&var, "CHAT_HISTORY_LIMIT") {
            config.chat_history_limit = n;
        }

        if let Some(secs) = parse_var::<u64>(&var, "JOIN_REQUEST_TTL_SECS") {
            config.join_request_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(n) = parse_var::<usize>(&var, "OUTBOUND_BUFFER").filter(|n| *n > 0) {
            config.outbound_buffer = n;
        }

        if let Some(n) = parse_var::<usize>(&var, "MAX_MESSAGE_BYTES").filter(|n| *n > 0) {
            config.max_message_bytes = n;
        }

        if let Some(rate) = parse_var::<f64>(&var, "EVENT_RATE").filter(|r| *r > 0.0) {
            config.event_rate = rate;
        }

        if let Some(burst) = parse_var::<f64>(&var, "EVENT_BURST").filter(|b| *b >= 1.0) {
            config.event_burst = burst;
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }
}

fn parse_var<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert!(config.room_store_path.is_none());
        assert_eq!(config.join_request_ttl, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_port_fallback() {
        let config = config_with(&[("PORT", "7000")]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 7000).into());

        let config = config_with(&[("PORT", "7000"), ("HTTP_ADDR", "127.0.0.1:9000")]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
    }

    #[test]
    fn test_ttl_zero_disables_expiry() {
        let config = config_with(&[("JOIN_REQUEST_TTL_SECS", "0")]);
        assert!(config.join_request_ttl.is_none());
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_with(&[("CHAT_HISTORY_LIMIT", "lots"), ("HTTP_ADDR", "nowhere")]);
        assert_eq!(config.chat_history_limit, DEFAULT_CHAT_HISTORY_LIMIT);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
    }

    #[test]
    fn test_cors_suffix_list() {
        let config = config_with(&[
            ("FRONTEND_URL", "https://board.example.com"),
            ("CORS_ALLOWED_HOST_SUFFIXES", ".vercel.app, ,.netlify.app"),
        ]);
        assert_eq!(config.frontend_url.as_deref(), Some("https://board.example.com"));
        assert_eq!(config.cors_host_suffixes, vec![".vercel.app", ".netlify.app"]);
    }
}
