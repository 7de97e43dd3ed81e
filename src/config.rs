//! Application configuration
//!
//! Loaded from a TOML file in the platform config directory, with
//! environment overrides for the server endpoint and auth token.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{CHUNK_BYTES, POOL_COUNT_LEAN, POOL_COUNT_RICH, SAMPLE_RATE};
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub audio: AudioConfig,
    pub pool: PoolConfig,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Fixed server endpoint; when unset, discovery probes for one.
    pub endpoint: Option<String>,
    /// Bearer token presented on the link and on image uploads.
    pub auth_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub chunk_bytes: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            chunk_bytes: CHUNK_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Sizing profile for the chunk pool.
    pub profile: MemoryProfile,
    /// Explicit buffer-count override.
    pub capacity: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            profile: MemoryProfile::Rich,
            capacity: None,
        }
    }
}

impl PoolConfig {
    pub fn capacity(&self) -> usize {
        self.capacity.unwrap_or(match self.profile {
            MemoryProfile::Rich => POOL_COUNT_RICH,
            MemoryProfile::Constrained => POOL_COUNT_LEAN,
        })
    }
}

/// How much buffer memory the device can afford.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryProfile {
    Rich,
    Constrained,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Port the server's health endpoint and link listen on.
    pub port: u16,
    /// Candidate hosts probed in order.
    pub candidates: Vec<String>,
    /// Per-probe timeout.
    pub probe_timeout_ms: u64,
    /// Substring that identifies our server in the health response body.
    pub marker: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            candidates: vec![
                "127.0.0.1".to_string(),
                "192.168.0.100".to_string(),
                "192.168.1.100".to_string(),
                "10.0.0.100".to_string(),
            ],
            probe_timeout_ms: 3_000,
            marker: "models".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from the platform config directory, falling back to defaults
    /// when no file exists, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::Read(e.to_string()))?;
                toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            _ => Self::default(),
        };

        if let Ok(url) = std::env::var("EDGE_VOICE_ENDPOINT") {
            config.link.endpoint = Some(url);
        }
        if let Ok(token) = std::env::var("EDGE_VOICE_TOKEN") {
            config.link.auth_token = token;
        }

        Ok(config)
    }

    fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "edge-voice-client")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_capacity_by_profile() {
        let mut pool = PoolConfig::default();
        assert_eq!(pool.capacity(), POOL_COUNT_RICH);

        pool.profile = MemoryProfile::Constrained;
        assert_eq!(pool.capacity(), POOL_COUNT_LEAN);

        pool.capacity = Some(8);
        assert_eq!(pool.capacity(), 8);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [link]
            endpoint = "ws://10.0.0.5:8000/ws"
            auth_token = "secret"

            [pool]
            profile = "constrained"
            "#,
        )
        .unwrap();

        assert_eq!(config.link.endpoint.as_deref(), Some("ws://10.0.0.5:8000/ws"));
        assert_eq!(config.pool.capacity(), POOL_COUNT_LEAN);
        // Unspecified sections keep their defaults.
        assert_eq!(config.audio.chunk_bytes, CHUNK_BYTES);
        assert_eq!(config.discovery.port, 8000);
    }
}
