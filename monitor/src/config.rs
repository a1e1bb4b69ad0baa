//! Top-level configuration for the agent.
//!
//! `AgentConfig` aggregates:
//!
//! - where the node keeps its logs and whether it runs as a validator,
//! - the per-family polling intervals (`FamilyConfig`),
//! - the validator directory client (`ResolverConfig`),
//! - the metrics exporter (`MetricsConfig`).
//!
//! Every section has a `Default` matching a stock node install; the binary
//! overrides them from the environment with [`AgentConfig::from_env`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::error;

use crate::extract::{BlockExtractor, JailedExtractor, ProposerExtractor};
use crate::ingest::LogFamily;
use crate::resolver::ValidatorResolver;
use crate::supervisor::DEFAULT_RESTART_DELAY;

pub const PROPOSALS_FAMILY: &str = "proposals";
pub const BLOCKS_FAMILY: &str = "blocks";
pub const CONSENSUS_FAMILY: &str = "consensus";

const DEFAULT_VALIDATOR_API_URL: &str = "https://api.hyperliquid-testnet.xyz/info";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: expected a boolean, got {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error("{var}: invalid socket address {value:?}")]
    InvalidAddr { var: &'static str, value: String },
}

/// Polling intervals for one family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FamilyConfig {
    /// Retry interval while no file is available or after a read failure.
    pub rotation_poll: Duration,
    /// Sleep after reaching EOF.
    pub idle_poll: Duration,
}

impl FamilyConfig {
    const fn with_rotation_poll(secs: u64) -> Self {
        Self {
            rotation_poll: Duration::from_secs(secs),
            idle_poll: Duration::from_secs(1),
        }
    }

    fn apply(&self, family: LogFamily) -> LogFamily {
        family
            .with_rotation_poll(self.rotation_poll)
            .with_idle_poll(self.idle_poll)
    }
}

/// Configuration for the validator directory client.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub url: String,
    pub timeout: Duration,
    pub refresh_interval: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_VALIDATOR_API_URL.to_string(),
            timeout: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(600),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8086)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Root under which `hl/data/...` lives.
    pub node_home: PathBuf,
    pub is_validator: bool,
    /// Suffix of the consensus log directory. Required when `is_validator`.
    pub validator_address: String,
    pub proposals: FamilyConfig,
    pub blocks: FamilyConfig,
    pub consensus: FamilyConfig,
    pub restart_delay: Duration,
    pub resolver: ResolverConfig,
    pub metrics: MetricsConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_home: PathBuf::from("."),
            is_validator: false,
            validator_address: String::new(),
            proposals: FamilyConfig::with_rotation_poll(10),
            blocks: FamilyConfig::with_rotation_poll(5),
            consensus: FamilyConfig::with_rotation_poll(10),
            restart_delay: DEFAULT_RESTART_DELAY,
            resolver: ResolverConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(home) = lookup("NODE_HOME").or_else(|| lookup("HOME")) {
            cfg.node_home = PathBuf::from(home);
        }
        if let Some(value) = lookup("IS_VALIDATOR") {
            cfg.is_validator = parse_bool("IS_VALIDATOR", &value)?;
        }
        if let Some(address) = lookup("VALIDATOR_ADDRESS") {
            cfg.validator_address = address.trim().to_string();
        }
        if let Some(value) = lookup("METRICS_LISTEN_ADDR") {
            cfg.metrics.listen_addr = value.trim().parse().map_err(|_| ConfigError::InvalidAddr {
                var: "METRICS_LISTEN_ADDR",
                value,
            })?;
        }
        if let Some(url) = lookup("VALIDATOR_API_URL") {
            cfg.resolver.url = url;
        }

        Ok(cfg)
    }

    fn data_dir(&self) -> PathBuf {
        self.node_home.join("hl").join("data")
    }

    pub fn proposals_dir(&self) -> PathBuf {
        self.data_dir().join("replica_cmds")
    }

    pub fn block_times_dir(&self) -> PathBuf {
        self.data_dir().join("block_times")
    }

    pub fn consensus_dir(&self) -> PathBuf {
        self.data_dir()
            .join(format!("consensus{}", self.validator_address))
    }

    /// The families this node should tail.
    ///
    /// The consensus family is only included on validators with a known
    /// address; a validator without one is reported and runs without it.
    pub fn log_families(&self, resolver: Arc<ValidatorResolver>) -> Vec<LogFamily> {
        let mut families = vec![
            self.proposals.apply(LogFamily::new(
                PROPOSALS_FAMILY,
                self.proposals_dir(),
                Arc::new(ProposerExtractor),
            )),
            self.blocks.apply(LogFamily::new(
                BLOCKS_FAMILY,
                self.block_times_dir(),
                Arc::new(BlockExtractor),
            )),
        ];

        if self.is_validator {
            if self.validator_address.is_empty() {
                error!(
                    family = CONSENSUS_FAMILY,
                    "IS_VALIDATOR is set but VALIDATOR_ADDRESS is empty; consensus logs will not be tailed"
                );
            } else {
                families.push(
                    self.consensus
                        .apply(LogFamily::new(
                            CONSENSUS_FAMILY,
                            self.consensus_dir(),
                            Arc::new(JailedExtractor::new(resolver)),
                        ))
                        .required(true),
                );
            }
        }

        families
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}
