use meshwork_lib::frame::MAX_PAYLOAD_LEN;
use meshwork_lib::stats::TestConfiguration;
use meshwork_lib::NodeId;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Room left for the network key after the ZcCfgNwk header fields.
const MAX_NWK_KEY_LEN: usize = MAX_PAYLOAD_LEN - 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid value {value:?} for {name}")]
    Env { name: &'static str, value: String },
}

/// Configuration of the host and of the node it drives.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub node_id: NodeId,
    pub nwk_id: u16,
    pub channel: u8,
    pub nwk_key: Option<String>,
    pub report_node_id: NodeId,
    pub report_flags: u8,
    pub nwkcaps: u8,
    pub retry: u8,

    /// How long one exchange waits for its response.
    #[serde(with = "humantime_serde")]
    pub console_read_timeout: Duration,

    pub tests: Vec<TestConfiguration>,

    /// Where to write the delivery test summary as JSON, if anywhere.
    pub results_path: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            nwk_id: 1,
            channel: 0,
            nwk_key: None,
            report_node_id: 0,
            report_flags: 0,
            nwkcaps: 0,
            retry: 3,
            console_read_timeout: Duration::from_secs(2),
            tests: Vec::new(),
            results_path: None,
        }
    }
}

impl HostConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: HostConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Load from the file named by `MESHWORK_CONFIG`, or use defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("MESHWORK_CONFIG") {
            Ok(path) => Self::load(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nwk_key_bytes().len() > MAX_NWK_KEY_LEN {
            return Err(ConfigError::Invalid(format!(
                "network key is longer than {} bytes",
                MAX_NWK_KEY_LEN
            )));
        }
        if let Some(test) = self.tests.iter().find(|t| t.name.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "test with mode {} has no name",
                test.mode()
            )));
        }
        Ok(())
    }

    /// The network key as sent to the node, empty when none is configured.
    pub fn nwk_key_bytes(&self) -> Vec<u8> {
        self.nwk_key
            .as_deref()
            .map(|key| key.as_bytes().to_vec())
            .unwrap_or_default()
    }
}

/// What the binary does once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run the zero-configuration handshake once.
    Configure,
    /// Run the configured delivery tests.
    Perf,
}

impl RunMode {
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("MESHWORK_MODE") {
            Err(_) => Ok(RunMode::Configure),
            Ok(value) => match value.as_str() {
                "configure" => Ok(RunMode::Configure),
                "perf" => Ok(RunMode::Perf),
                _ => Err(ConfigError::Env {
                    name: "MESHWORK_MODE",
                    value,
                }),
            },
        }
    }
}
