//! Prometheus-backed metrics sink and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and the node metrics the pipelines publish, and an async HTTP
//! exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode,
    body::Incoming,
    header::{self, HeaderValue},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use prometheus::{
    self, Encoder, Gauge, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use super::sink::{
    APPLY_DURATION, BLOCK_HEIGHT, MetricObservation, MetricValue, MetricsSink, PROPOSER_COUNT,
    VALIDATOR_COUNT, VALIDATOR_JAILED_STATUS,
};

/// Metrics fed by the log pipelines and the validator refresher.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Proposals observed in the replica command logs, per proposer.
    pub proposer_count: IntCounterVec,
    /// Latest block height from the block-time logs.
    pub block_height: IntGauge,
    /// Latest block apply duration from the block-time logs.
    pub apply_duration: Gauge,
    /// Jailed status per validator, 1 when jailed.
    pub validator_jailed_status: GaugeVec,
    /// Total number of validators in the validator directory.
    pub validator_count: IntGauge,
}

impl NodeMetrics {
    /// Registers node metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let proposer_count = IntCounterVec::new(
            Opts::new(PROPOSER_COUNT, "Count of proposals by proposer"),
            &["proposer"],
        )?;
        registry.register(Box::new(proposer_count.clone()))?;

        let block_height = IntGauge::with_opts(Opts::new(
            BLOCK_HEIGHT,
            "Block height from latest block time file",
        ))?;
        registry.register(Box::new(block_height.clone()))?;

        let apply_duration = Gauge::with_opts(Opts::new(
            APPLY_DURATION,
            "Apply duration from latest block time file",
        ))?;
        registry.register(Box::new(apply_duration.clone()))?;

        let validator_jailed_status = GaugeVec::new(
            Opts::new(VALIDATOR_JAILED_STATUS, "Jailed status of validators"),
            &["validator", "name"],
        )?;
        registry.register(Box::new(validator_jailed_status.clone()))?;

        let validator_count = IntGauge::with_opts(Opts::new(
            VALIDATOR_COUNT,
            "Total number of validators",
        ))?;
        registry.register(Box::new(validator_count.clone()))?;

        Ok(Self {
            proposer_count,
            block_height,
            apply_duration,
            validator_jailed_status,
            validator_count,
        })
    }

    fn apply(&self, obs: &MetricObservation) -> Result<(), prometheus::Error> {
        let labels = obs.label_values();
        match (obs.name, obs.value) {
            (PROPOSER_COUNT, MetricValue::Increment(by)) => {
                self.proposer_count
                    .get_metric_with_label_values(labels.as_slice())?
                    .inc_by(by as u64);
            }
            (BLOCK_HEIGHT, MetricValue::Set(v)) => self.block_height.set(v as i64),
            (APPLY_DURATION, MetricValue::Set(v)) => self.apply_duration.set(v),
            (VALIDATOR_JAILED_STATUS, MetricValue::Set(v)) => {
                self.validator_jailed_status
                    .get_metric_with_label_values(labels.as_slice())?
                    .set(v);
            }
            (VALIDATOR_COUNT, MetricValue::Set(v)) => self.validator_count.set(v as i64),
            (name, value) => {
                return Err(prometheus::Error::Msg(format!(
                    "no metric accepts {value:?} under name {name}"
                )));
            }
        }
        Ok(())
    }
}

/// Wrapper around a Prometheus registry and the node metrics.
///
/// This is the main handle you pass around in the agent. It can be wrapped
/// in an [`Arc`] and shared across threads.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub node: NodeMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` under the `hl` namespace and
    /// registers the node metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("hl".to_string()), None)?;
        let node = NodeMetrics::register(&registry)?;
        Ok(Self { registry, node })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl MetricsSink for MetricsRegistry {
    fn record(&self, observation: &MetricObservation) {
        if let Err(e) = self.node.apply(observation) {
            warn!(metric = observation.name, "dropping observation: {e}");
        }
    }
}

/// Runs an HTTP server that exposes Prometheus metrics until `cancel`
/// fires.
///
/// The listener is bound by the caller, so a bad address fails start-up
/// instead of this task. Serves `GET /metrics` with the Prometheus text
/// exposition format. All other paths return 404.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (stream, _) = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("metrics exporter stopped");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                debug!("prometheus HTTP connection error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path(), &metrics))
}

fn route(method: &Method, path: &str, metrics: &MetricsRegistry) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => {
            let mut resp = Response::new(Full::new(Bytes::from(metrics.gather_text())));
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            resp
        }
        _ => {
            let mut resp = Response::new(Full::new(Bytes::from("not found")));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            resp
        }
    }
}
