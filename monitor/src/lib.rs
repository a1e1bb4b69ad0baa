//! Monitor library crate.
//!
//! This crate turns the rotating log files a node writes into Prometheus
//! metrics:
//!
//! - rotating-log ingestion: directory watcher and tailer (`ingest`),
//! - per-family line parsers (`extract`),
//! - the validator short-address cache and its refresher (`resolver`),
//! - Prometheus-backed metrics and the `/metrics` exporter (`metrics`),
//! - restart-on-failure supervision of each family (`supervisor`),
//! - and a top-level agent configuration (`config`).
//!
//! The `exporter` binary composes these pieces into the running agent.

pub mod config;
pub mod extract;
pub mod ingest;
pub mod metrics;
pub mod resolver;
pub mod shutdown;
pub mod supervisor;

// Re-export top-level configuration types.
pub use config::{AgentConfig, ConfigError, FamilyConfig, MetricsConfig, ResolverConfig};

// Re-export the ingestion pipeline.
pub use extract::{BlockExtractor, ExtractError, JailedExtractor, LineExtractor, ProposerExtractor};
pub use ingest::{DirectoryWatcher, LogFamily, RotatingTailer, TailError, WatchError, Watcher};

// Re-export the validator resolver.
pub use resolver::{HttpValidatorDirectory, ResolverError, ValidatorRefresher, ValidatorResolver};

// Re-export metrics registry and sink.
pub use metrics::{MetricObservation, MetricsRegistry, MetricsSink, run_prometheus_http_server};

pub use shutdown::CancellationToken;
pub use supervisor::{PipelineHandle, PipelineSupervisor, SupervisorError};
