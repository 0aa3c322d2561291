//! Shared application state.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::core::relay::UpstreamConfig;

/// Raised when a new WebSocket connection would exceed a limit.
#[derive(Debug, Error)]
pub enum ConnectionLimitError {
    #[error("maximum websocket connections reached")]
    GlobalLimitReached,

    #[error("maximum connections per IP reached")]
    PerIpLimitReached,
}

/// Tracks every live client connection and whether it currently has an
/// upstream session.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, ConnectionEntry>,
}

struct ConnectionEntry {
    session_active: bool,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Uuid) {
        self.connections.insert(id, ConnectionEntry { session_active: false });
    }

    pub fn deregister(&self, id: &Uuid) {
        self.connections.remove(id);
    }

    pub fn set_session(&self, id: &Uuid) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.session_active = true;
        }
    }

    pub fn clear_session(&self, id: &Uuid) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.session_active = false;
        }
    }

    pub fn has_session(&self, id: &Uuid) -> bool {
        self.connections
            .get(id)
            .map(|entry| entry.session_active)
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn active_session_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.session_active)
            .count()
    }
}

/// Shared server state handed to every handler.
pub struct AppState {
    config: ServerConfig,
    http: reqwest::Client,
    registry: Arc<ConnectionRegistry>,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            http: reqwest::Client::new(),
            registry: Arc::new(ConnectionRegistry::new()),
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Upstream connection parameters for relayed sessions.
    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            url: self.config.openai_realtime_url.clone(),
            api_key: self.config.openai_api_key.clone(),
            model: self.config.realtime_model.clone(),
        }
    }

    /// REST endpoint for minting ephemeral realtime sessions.
    pub fn sessions_url(&self) -> String {
        format!("{}/realtime/sessions", self.config.openai_api_base)
    }

    /// REST endpoint for chat completions.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.openai_api_base)
    }

    /// Reserve a connection slot, enforcing the global and per-IP caps.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let count = self.ws_connections.fetch_add(1, Ordering::SeqCst);
        if count >= self.config.max_websocket_connections {
            self.ws_connections.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnectionLimitError::GlobalLimitReached);
        }

        let mut per_ip = self.ip_connections.entry(ip).or_insert(0);
        if *per_ip >= self.config.max_connections_per_ip {
            drop(per_ip);
            self.ws_connections.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *per_ip += 1;
        Ok(())
    }

    /// Release a slot reserved by [`Self::try_acquire_connection`].
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));

        if let Some(mut per_ip) = self.ip_connections.get_mut(&ip) {
            *per_ip = per_ip.saturating_sub(1);
            if *per_ip == 0 {
                drop(per_ip);
                self.ip_connections.remove_if(&ip, |_, count| *count == 0);
            }
        }
    }

    pub fn websocket_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::map_lookup;
    use std::collections::HashMap;

    fn test_state(max_global: &'static str, max_per_ip: &'static str) -> Arc<AppState> {
        let vars = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("MAX_WEBSOCKET_CONNECTIONS", max_global),
            ("MAX_CONNECTIONS_PER_IP", max_per_ip),
        ]);
        AppState::new(ServerConfig::from_vars(map_lookup(vars)).unwrap())
    }

    #[test]
    fn test_registry_tracks_sessions() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();

        registry.register(id);
        assert_eq!(registry.connection_count(), 1);
        assert!(!registry.has_session(&id));

        registry.set_session(&id);
        assert!(registry.has_session(&id));
        assert_eq!(registry.active_session_count(), 1);

        registry.clear_session(&id);
        assert!(!registry.has_session(&id));
        assert_eq!(registry.connection_count(), 1);

        registry.deregister(&id);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_global_connection_limit() {
        let state = test_state("2", "100");
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(state.try_acquire_connection(ip).is_ok());
        assert!(state.try_acquire_connection(ip).is_ok());
        assert!(matches!(
            state.try_acquire_connection(ip),
            Err(ConnectionLimitError::GlobalLimitReached)
        ));

        state.release_connection(ip);
        assert!(state.try_acquire_connection(ip).is_ok());
    }

    #[test]
    fn test_per_ip_connection_limit() {
        let state = test_state("100", "1");
        let first: IpAddr = "10.0.0.1".parse().unwrap();
        let second: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(state.try_acquire_connection(first).is_ok());
        assert!(matches!(
            state.try_acquire_connection(first),
            Err(ConnectionLimitError::PerIpLimitReached)
        ));
        // A different address is unaffected.
        assert!(state.try_acquire_connection(second).is_ok());
        assert_eq!(state.websocket_connection_count(), 2);
    }

    #[test]
    fn test_release_never_underflows() {
        let state = test_state("10", "10");
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        state.release_connection(ip);
        assert_eq!(state.websocket_connection_count(), 0);
    }
}
