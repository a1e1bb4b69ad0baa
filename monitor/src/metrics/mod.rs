//! Metrics and instrumentation for the agent.
//!
//! This module defines the [`MetricObservation`] unit produced by the line
//! extractors, the [`MetricsSink`] they are pushed into, and a
//! Prometheus-backed sink with a small HTTP exporter that serves
//! `/metrics` in Prometheus text format.
//!
//! Typical usage in the agent:
//!
//! ```ignore
//! use std::sync::Arc;
//! use monitor::CancellationToken;
//! use monitor::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8086").await?;
//! let cancel = CancellationToken::new();
//!
//! // Spawn the HTTP exporter in the background:
//! tokio::spawn(run_prometheus_http_server(registry.clone(), listener, cancel.clone()));
//! ```

pub mod prometheus;
pub mod sink;

pub use prometheus::{MetricsRegistry, NodeMetrics, run_prometheus_http_server};
pub use sink::{MetricObservation, MetricValue, MetricsSink};
