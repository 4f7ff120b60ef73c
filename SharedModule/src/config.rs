//! # Sync Configuration
//!
//! Configuration shared by the frontend, simulator and slave roles: how the
//! simulator is reached, frame pacing, and debug call stack capture.

use once_cell::sync::Lazy;
use serde::{Serialize, Deserialize};
use log::debug;

use crate::constants::{frame, logging};
use crate::error::SyncError;

// Read once; the variable overrides `SyncConfig::capture_backtraces`
static BACKTRACE_FROM_ENV: Lazy<Option<bool>> = Lazy::new(|| {
    let value = std::env::var(logging::BACKTRACE_ENV_VAR).ok()?;
    let enabled = matches!(value.trim(), "1" | "true" | "yes" | "on");
    debug!("{}={} (capture {})", logging::BACKTRACE_ENV_VAR, value, enabled);
    Some(enabled)
});

/// Where the simulator runs relative to the frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Topology {
    /// Simulator driven from the frontend's own loop
    InLoop,

    /// Simulator in a separate OS thread, connected through channels
    Thread,

    /// Simulator behind a length-prefixed byte stream
    Socket { address: String },
}

impl Default for Topology {
    fn default() -> Self {
        Topology::InLoop
    }
}

/// Configuration of a frontend/simulator pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub topology: Topology,

    /// Capture the call stack of every queued operation (debug builds only)
    pub capture_backtraces: bool,

    /// Largest message accepted by the byte stream transport
    pub max_frame_size: usize,

    /// Seconds between simulator frames when the simulator paces itself
    pub frame_interval: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            capture_backtraces: false,
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
            frame_interval: frame::DEFAULT_FRAME_INTERVAL,
        }
    }
}

impl SyncConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        let config: SyncConfig =
            serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))?;

        if config.max_frame_size == 0 {
            return Err(SyncError::Config("max_frame_size must be non-zero".to_string()));
        }
        if !(config.frame_interval > 0.0) {
            return Err(SyncError::Config("frame_interval must be positive".to_string()));
        }

        Ok(config)
    }

    /// Whether queued operations should carry a captured call stack
    pub fn backtraces_enabled(&self) -> bool {
        cfg!(debug_assertions) && BACKTRACE_FROM_ENV.unwrap_or(self.capture_backtraces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = SyncConfig::from_json(r#"{ "capture_backtraces": true }"#).unwrap();
        assert!(config.capture_backtraces);
        assert_eq!(config.topology, Topology::InLoop);
        assert_eq!(config.max_frame_size, frame::DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn socket_topology_parses() {
        let config = SyncConfig::from_json(
            r#"{ "topology": { "kind": "Socket", "address": "127.0.0.1:7000" } }"#,
        )
        .unwrap();
        assert_eq!(
            config.topology,
            Topology::Socket { address: "127.0.0.1:7000".to_string() }
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(SyncConfig::from_json(r#"{ "max_frame_size": 0 }"#).is_err());
        assert!(SyncConfig::from_json(r#"{ "frame_interval": -1.0 }"#).is_err());
        assert!(SyncConfig::from_json("not json").is_err());
    }
}
