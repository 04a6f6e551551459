//! Process configuration, read once at startup

use std::net::SocketAddr;
use std::time::Duration;

use crate::abuse::AbuseConfig;
use crate::auth::{AuthConfig, HostSecret};

pub const DEFAULT_BIND: &str = "0.0.0.0:9999";
pub const DEFAULT_MAX_CONNECTIONS: usize = 50;
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub auth: AuthConfig,
    pub abuse: AbuseConfig,
}

impl ServerConfig {
    /// Defaults with a fixed host secret
    pub fn with_host_secret(secret: impl Into<String>) -> Self {
        Self {
            bind_addr: default_bind(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            auth: AuthConfig::new(HostSecret::new(secret)),
            abuse: AbuseConfig::default(),
        }
    }

    pub fn from_env() -> Self {
        let bind_addr = match std::env::var("BUZZER_BIND") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
                tracing::warn!("Invalid BUZZER_BIND '{}': {}, using {}", raw, e, DEFAULT_BIND);
                default_bind()
            }),
            Err(_) => default_bind(),
        };

        let max_connections = env_parse("BUZZER_MAX_CONNECTIONS")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let heartbeat_interval = env_parse("BUZZER_HEARTBEAT_INTERVAL_SECS")
            .filter(|s: &u64| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);

        let heartbeat_timeout = env_parse("BUZZER_HEARTBEAT_TIMEOUT_SECS")
            .filter(|s: &u64| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT);

        Self {
            bind_addr,
            max_connections,
            heartbeat_interval,
            heartbeat_timeout,
            auth: AuthConfig::from_env(),
            abuse: AbuseConfig::from_env(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9999))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
