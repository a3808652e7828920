//! # Node Configuration
//!
//! Unified configuration for the node and its transports. Every field
//! has a default; a TOML file only needs to name what it changes.
//!
//! ```toml
//! [node]
//! name = "kitchen"
//! shutdown_grace_ms = 100
//!
//! [rpc]
//! bind_address = "0.0.0.0"
//! port = 0
//! max_in_flight = 1024
//!
//! [pubsub]
//! port = 0
//! channel_capacity = 1024
//!
//! [survey]
//! timeout_ms = 500
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use vm_02_survey::SurveyConfig;
use vm_04_rpc::RpcConfig;
use vm_05_pubsub::PubSubConfig;

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Display name announced on the fabric.
    pub name: String,
    /// RPC server and client settings.
    pub rpc: RpcConfig,
    /// Publisher and subscriber settings.
    pub pubsub: PubSubConfig,
    /// Survey timing.
    pub survey: SurveyConfig,
    /// Pause at the end of shutdown so in-flight sends can drain.
    pub shutdown_grace: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "node".to_string(),
            rpc: RpcConfig::default(),
            pubsub: PubSubConfig::default(),
            survey: SurveyConfig::default(),
            shutdown_grace: Duration::from_millis(100),
        }
    }
}

impl NodeConfig {
    /// Loopback-only ports and short timeouts.
    #[must_use]
    pub fn for_testing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rpc: RpcConfig::for_testing(),
            pubsub: PubSubConfig::for_testing(),
            survey: SurveyConfig::for_testing(),
            shutdown_grace: Duration::from_millis(10),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let defaults = Self::default();

        let rpc = RpcConfig {
            bind_address: file.rpc.bind_address.unwrap_or(defaults.rpc.bind_address),
            port: file.rpc.port.unwrap_or(defaults.rpc.port),
            max_in_flight: file.rpc.max_in_flight.unwrap_or(defaults.rpc.max_in_flight),
            max_frame_length: file.rpc.max_frame_length.unwrap_or(defaults.rpc.max_frame_length),
        };
        if rpc.max_in_flight == 0 {
            return Err(ConfigError::Invalid("rpc.max_in_flight must be at least 1".into()));
        }

        let pubsub = PubSubConfig {
            bind_address: file.pubsub.bind_address.unwrap_or(defaults.pubsub.bind_address),
            port: file.pubsub.port.unwrap_or(defaults.pubsub.port),
            channel_capacity: file.pubsub.channel_capacity.unwrap_or(defaults.pubsub.channel_capacity),
            max_frame_length: file.pubsub.max_frame_length.unwrap_or(defaults.pubsub.max_frame_length),
            handshake_timeout: file
                .pubsub
                .handshake_timeout_ms
                .map_or(defaults.pubsub.handshake_timeout, Duration::from_millis),
        };

        let survey = SurveyConfig {
            default_timeout: file
                .survey
                .timeout_ms
                .map_or(defaults.survey.default_timeout, Duration::from_millis),
        };

        Ok(Self {
            name: file.node.name.unwrap_or(defaults.name),
            rpc,
            pubsub,
            survey,
            shutdown_grace: file
                .node
                .shutdown_grace_ms
                .map_or(defaults.shutdown_grace, Duration::from_millis),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    node: NodeSection,
    #[serde(default)]
    rpc: RpcSection,
    #[serde(default)]
    pubsub: PubSubSection,
    #[serde(default)]
    survey: SurveySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeSection {
    name: Option<String>,
    shutdown_grace_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RpcSection {
    bind_address: Option<String>,
    port: Option<u16>,
    max_in_flight: Option<usize>,
    max_frame_length: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PubSubSection {
    bind_address: Option<String>,
    port: Option<u16>,
    channel_capacity: Option<usize>,
    max_frame_length: Option<usize>,
    handshake_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SurveySection {
    timeout_ms: Option<u64>,
}

/// Errors that can occur during config loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
