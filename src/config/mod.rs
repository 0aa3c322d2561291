//! Server configuration.
//!
//! All settings come from environment variables (loaded from `.env` in
//! development via `dotenvy`). The OpenAI credential is mandatory; startup
//! aborts without it. Everything else has a sensible default.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroize;

/// Configuration errors raised during startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    /// An environment variable holds an unparseable value
    #[error("invalid value for {var}: {message}")]
    InvalidVar { var: String, message: String },
}

/// TLS certificate paths.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

/// Runtime configuration for the gateway.
#[derive(Debug)]
pub struct ServerConfig {
    /// Bind host (default `0.0.0.0`)
    pub host: String,
    /// Bind port (default `8080`)
    pub port: u16,
    /// TLS configuration; set when both `TLS_CERT_PATH` and `TLS_KEY_PATH`
    /// are present
    pub tls: Option<TlsConfig>,

    /// OpenAI API key. Required.
    pub openai_api_key: String,
    /// Base URL for OpenAI REST calls (default `https://api.openai.com/v1`)
    pub openai_api_base: String,
    /// WebSocket URL of the Realtime API
    /// (default `wss://api.openai.com/v1/realtime`)
    pub openai_realtime_url: String,
    /// Realtime model requested for relayed sessions
    pub realtime_model: String,
    /// Milliseconds to wait after the upstream socket opens before the
    /// session-initiation message is delivered (default 100)
    pub settle_delay_ms: u64,

    /// Allowed CORS origins; `*` permits any origin
    pub cors_allowed_origins: Vec<String>,
    /// Rate limit: sustained requests per second per client
    pub rate_limit_rps: u64,
    /// Rate limit: burst capacity per client
    pub rate_limit_burst: u32,
    /// Maximum concurrent WebSocket connections across the server
    pub max_websocket_connections: usize,
    /// Maximum concurrent WebSocket connections per client IP
    pub max_connections_per_ip: u32,
}

impl ServerConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let openai_realtime_url = lookup("OPENAI_REALTIME_URL")
            .unwrap_or_else(|| crate::core::relay::OPENAI_REALTIME_URL.to_string());
        validate_ws_url("OPENAI_REALTIME_URL", &openai_realtime_url)?;

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var(&lookup, "PORT", 8080)?,
            tls: match (lookup("TLS_CERT_PATH"), lookup("TLS_KEY_PATH")) {
                (Some(cert_path), Some(key_path)) => Some(TlsConfig { cert_path, key_path }),
                _ => None,
            },
            openai_api_key,
            openai_api_base: lookup("OPENAI_API_BASE")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            openai_realtime_url,
            realtime_model: lookup("OPENAI_REALTIME_MODEL")
                .unwrap_or_else(|| "gpt-4o-realtime-preview-2024-12-17".to_string()),
            settle_delay_ms: parse_var(&lookup, "SESSION_SETTLE_DELAY_MS", 100)?,
            cors_allowed_origins,
            rate_limit_rps: parse_var(&lookup, "RATE_LIMIT_RPS", 60)?,
            rate_limit_burst: parse_var(&lookup, "RATE_LIMIT_BURST", 10)?,
            max_websocket_connections: parse_var(&lookup, "MAX_WEBSOCKET_CONNECTIONS", 1000)?,
            max_connections_per_ip: parse_var(&lookup, "MAX_CONNECTIONS_PER_IP", 100)?,
        })
    }

    /// Socket address string for binding.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Delay applied between upstream open and the first session message.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Whether any origin is permitted.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_allowed_origins.iter().any(|o| o == "*")
    }
}

impl Drop for ServerConfig {
    fn drop(&mut self) {
        self.openai_api_key.zeroize();
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            var: var.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn validate_ws_url(var: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::InvalidVar {
        var: var.to_string(),
        message: e.to_string(),
    })?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::InvalidVar {
            var: var.to_string(),
            message: format!("expected ws:// or wss:// URL, got scheme {other}"),
        }),
    }
}

/// Build a lookup closure over a map, for tests.
#[doc(hidden)]
pub fn map_lookup(vars: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
    move |name| vars.get(name).map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([("OPENAI_API_KEY", "sk-test-key")])
    }

    #[test]
    fn test_defaults_applied() {
        let config = ServerConfig::from_vars(map_lookup(base_vars())).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.openai_api_base, "https://api.openai.com/v1");
        assert_eq!(config.openai_realtime_url, "wss://api.openai.com/v1/realtime");
        assert_eq!(config.settle_delay_ms, 100);
        assert_eq!(config.settle_delay(), Duration::from_millis(100));
        assert!(config.allows_any_origin());
        assert!(!config.is_tls_enabled());
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let result = ServerConfig::from_vars(map_lookup(HashMap::new()));
        assert!(matches!(result, Err(ConfigError::MissingVar(var)) if var == "OPENAI_API_KEY"));
    }

    #[test]
    fn test_blank_api_key_rejected() {
        let vars = HashMap::from([("OPENAI_API_KEY", "  ")]);
        let result = ServerConfig::from_vars(map_lookup(vars));
        assert!(matches!(result, Err(ConfigError::MissingVar(_))));
    }

    #[test]
    fn test_overrides_respected() {
        let mut vars = base_vars();
        vars.insert("HOST", "127.0.0.1");
        vars.insert("PORT", "9000");
        vars.insert("OPENAI_REALTIME_URL", "ws://localhost:4000/realtime");
        vars.insert("SESSION_SETTLE_DELAY_MS", "0");
        vars.insert("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example");
        let config = ServerConfig::from_vars(map_lookup(vars)).unwrap();
        assert_eq!(config.address(), "127.0.0.1:9000");
        assert_eq!(config.openai_realtime_url, "ws://localhost:4000/realtime");
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(!config.allows_any_origin());
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut vars = base_vars();
        vars.insert("PORT", "not-a-port");
        let result = ServerConfig::from_vars(map_lookup(vars));
        assert!(matches!(result, Err(ConfigError::InvalidVar { var, .. }) if var == "PORT"));
    }

    #[test]
    fn test_http_realtime_url_rejected() {
        let mut vars = base_vars();
        vars.insert("OPENAI_REALTIME_URL", "https://api.openai.com/v1/realtime");
        let result = ServerConfig::from_vars(map_lookup(vars));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidVar { var, .. }) if var == "OPENAI_REALTIME_URL"
        ));
    }

    #[test]
    fn test_tls_requires_both_paths() {
        let mut vars = base_vars();
        vars.insert("TLS_CERT_PATH", "/etc/certs/server.pem");
        let config = ServerConfig::from_vars(map_lookup(vars)).unwrap();
        assert!(!config.is_tls_enabled());

        let mut vars = base_vars();
        vars.insert("TLS_CERT_PATH", "/etc/certs/server.pem");
        vars.insert("TLS_KEY_PATH", "/etc/certs/server.key");
        let config = ServerConfig::from_vars(map_lookup(vars)).unwrap();
        assert!(config.is_tls_enabled());
    }
}
