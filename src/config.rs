use std::env;
use std::net::SocketAddr;

use chrono::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 127.0.0.1:3000)
    pub bind_addr: SocketAddr,
    /// Postgres URL. Without one the server keeps its data in memory.
    pub database_url: Option<String>,
    /// Maximum pooled connections (default: 5)
    pub database_pool_size: u32,
    /// Lifetime of a login session in hours (default: 48)
    pub session_ttl_hours: i64,
    /// Origin allowed by CORS. Any origin when unset.
    pub allowed_origin: Option<String>,
}

impl Config {
    /// Environment variables:
    /// - `BIND_ADDR`
    /// - `DATABASE_URL`
    /// - `DATABASE_POOL_SIZE`
    /// - `SESSION_TTL_HOURS`
    /// - `ALLOWED_ORIGIN`
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| Self::default().bind_addr),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            database_pool_size: env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|hours: &i64| *hours > 0)
                .unwrap_or(48),
            allowed_origin: env::var("ALLOWED_ORIGIN").ok().filter(|v| !v.is_empty()),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::hours(self.session_ttl_hours)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            database_pool_size: 5,
            session_ttl_hours: 48,
            allowed_origin: None,
        }
    }
}
