//! Server configuration

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use textclass_classifiers::{ClassifiersSection, DatasetSection};
use textclass_core::{Error, Result, MAX_FRAME_SIZE};

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_address")]
    pub address: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Idle-accept timeout in seconds
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Wire protocol limits and timeouts
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Dataset the served classifiers predict categories of
    #[serde(default)]
    pub dataset: DatasetSection,

    /// Served classifiers, in registry order
    #[serde(default)]
    pub classifiers: ClassifiersSection,
}

impl ServerConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid server configuration: {}", e)))?;
        config.accept_timeout()?;
        Ok(config)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Load from file without blocking the runtime
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Accept timeout as a duration; non-positive values disable it
    pub fn accept_timeout(&self) -> Result<Option<Duration>> {
        match self.timeout {
            Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|e| Error::config(format!("invalid timeout {}: {}", secs, e))),
            _ => Ok(None),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            timeout: None,
            protocol: ProtocolConfig::default(),
            dataset: DatasetSection::default(),
            classifiers: ClassifiersSection::default(),
        }
    }
}

/// Per-connection protocol settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    /// Largest accepted frame payload
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Largest PREDICT_STREAM payload kept in memory
    #[serde(default = "default_max_stream_size")]
    pub max_stream_size: usize,

    /// Seconds to wait for the next frame before dropping the connection
    #[serde(default)]
    pub read_timeout: Option<u64>,

    /// Seconds to wait for a response write before dropping the connection
    #[serde(default)]
    pub write_timeout: Option<u64>,

    /// Directory MD5_FILE and PREDICT_FILE paths must stay within
    #[serde(default)]
    pub file_root: Option<PathBuf>,

    /// Answer RELOAD with the bare `reload` payload instead of JSON
    #[serde(default)]
    pub legacy_reload_response: bool,
}

impl ProtocolConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout.filter(|s| *s > 0).map(Duration::from_secs)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
            max_stream_size: default_max_stream_size(),
            read_timeout: None,
            write_timeout: None,
            file_root: None,
            legacy_reload_response: false,
        }
    }
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3333
}

fn default_max_frame_size() -> usize {
    MAX_FRAME_SIZE
}

fn default_max_stream_size() -> usize {
    16 * 1024 * 1024
}
