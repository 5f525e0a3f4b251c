//! Auction store (PostgreSQL) settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pool settings for the persistent auction store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://` connection URL.
    pub url: String,
    /// Upper bound on pooled connections. Every in-flight bid holds one
    /// for the length of its transaction.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connections kept warm while idle.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

impl DatabaseConfig {
    /// How long to wait for a pooled connection.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// How long an unused connection may stay open.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_idle_timeout() -> u64 {
    600
}
