//! # Synchronization Configuration
//!
//! Engine-construction settings, loadable from TOML:
//!
//! ```toml
//! relay = true
//!
//! [network_range]
//! from = 40000
//! to = 41000
//! ```

use crate::error::SyncError;
use mosaic_core::NetworkRange;
use serde::{Deserialize, Serialize};

/// The networked entity band assigned to this peer by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeConfig {
    /// First allocatable number.
    pub from: u16,
    /// Last allocatable number.
    pub to: u16,
}

impl From<RangeConfig> for NetworkRange {
    fn from(config: RangeConfig) -> Self {
        Self {
            from: config.from,
            to: config.to,
        }
    }
}

/// Settings applied when a scene engine is constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Networked entity band; networked spawns fail until one is set.
    pub network_range: Option<RangeConfig>,
    /// Whether accepted remote messages are relayed to the other
    /// attached transports (peer gossip). Off for star topologies.
    pub relay: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            network_range: None,
            relay: true,
        }
    }
}

impl SyncConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidConfig`] when the text is not valid TOML or
    /// does not match this schema.
    pub fn from_toml_str(text: &str) -> Result<Self, SyncError> {
        toml::from_str(text).map_err(|e| SyncError::InvalidConfig(e.to_string()))
    }
}
