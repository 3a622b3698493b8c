//! Runtime settings read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use switchboard_vis::DashboardConfig;
use tracing::info;

use crate::error::{Error, Result};

pub const DEFAULT_FEED_URL: &str = "ws://127.0.0.1:8765/ws";
pub const DEFAULT_FEED_ADDR: &str = "0.0.0.0:8765";

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Where the dashboard's link connects
    pub feed_url: String,
    /// Where the feed server listens
    pub feed_addr: SocketAddr,
    /// Feed replay speed multiplier
    pub feed_speed: f64,
    pub dashboard: DashboardConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            feed_addr: SocketAddr::from(([0, 0, 0, 0], 8765)),
            feed_speed: 1.0,
            dashboard: DashboardConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load from environment variables.
    ///
    /// - `SWITCHBOARD_FEED_URL`: WebSocket URL of the feed
    /// - `SWITCHBOARD_FEED_ADDR`: listen address of the feed server
    /// - `SWITCHBOARD_CONFIG`: optional path to a JSON dashboard config
    /// - `SWITCHBOARD_FEED_SPEED`: replay speed multiplier
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let feed_url = lookup("SWITCHBOARD_FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_string());
        if !(feed_url.starts_with("ws://") || feed_url.starts_with("wss://")) {
            return Err(Error::Config(format!("feed URL must be ws:// or wss://: {feed_url}")));
        }

        let feed_addr = lookup("SWITCHBOARD_FEED_ADDR")
            .unwrap_or_else(|| DEFAULT_FEED_ADDR.to_string());
        let feed_addr: SocketAddr = feed_addr
            .parse()
            .map_err(|e| Error::Config(format!("feed address {feed_addr}: {e}")))?;

        let feed_speed = match lookup("SWITCHBOARD_FEED_SPEED") {
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|s| s.is_finite() && *s > 0.0)
                .ok_or_else(|| Error::Config(format!("feed speed must be a positive number: {raw}")))?,
            None => 1.0,
        };

        let dashboard = match lookup("SWITCHBOARD_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                info!(path = %path.display(), "Loading dashboard config");
                DashboardConfig::load(&path)?
            }
            None => DashboardConfig::default(),
        };

        Ok(Self {
            feed_url,
            feed_addr,
            feed_speed,
            dashboard,
        })
    }

    /// Link settings taken from the dashboard timing. Zero intervals are
    /// raised to 1 ms.
    pub fn link(&self) -> crate::link::LinkConfig {
        let timing = &self.dashboard.timing;
        let millis = |ms: u64| Duration::from_millis(ms.max(1));
        crate::link::LinkConfig {
            url: self.feed_url.clone(),
            reconnect_base: millis(timing.reconnect_base_ms),
            reconnect_max: millis(timing.reconnect_max_ms),
            heartbeat: millis(timing.heartbeat_ms),
        }
    }
}
