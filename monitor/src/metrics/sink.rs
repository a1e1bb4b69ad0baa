//! Metric observations and the sink they are pushed into.
//!
//! Extractors never touch Prometheus handles directly. They return
//! [`MetricObservation`]s, which the pipeline hands to a [`MetricsSink`].
//! This keeps extraction pure and lets tests inspect exactly what a line
//! produced.

/// Count of proposals, labelled by `proposer`.
pub const PROPOSER_COUNT: &str = "proposer_count";
/// Latest block height seen in the block-time logs.
pub const BLOCK_HEIGHT: &str = "block_height";
/// Latest apply duration (seconds) seen in the block-time logs.
pub const APPLY_DURATION: &str = "apply_duration";
/// Jailed status (0/1), labelled by `validator` (full address) and `name`.
pub const VALIDATOR_JAILED_STATUS: &str = "validator_jailed_status";
/// Number of validators known to the validator directory.
pub const VALIDATOR_COUNT: &str = "validator_count";

/// How an observation changes the target metric.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// Add to a counter.
    Increment(f64),
    /// Overwrite a gauge with an absolute value.
    Set(f64),
}

/// One named, labelled numeric observation.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricObservation {
    pub name: &'static str,
    /// Label key/value pairs, in the order the metric declares them.
    pub labels: Vec<(&'static str, String)>,
    pub value: MetricValue,
}

impl MetricObservation {
    pub fn increment(name: &'static str) -> Self {
        Self {
            name,
            labels: Vec::new(),
            value: MetricValue::Increment(1.0),
        }
    }

    pub fn set(name: &'static str, value: f64) -> Self {
        Self {
            name,
            labels: Vec::new(),
            value: MetricValue::Set(value),
        }
    }

    pub fn with_label(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.labels.push((key, value.into()));
        self
    }

    /// Label values in declaration order, as Prometheus vectors expect them.
    pub fn label_values(&self) -> Vec<&str> {
        self.labels.iter().map(|(_, v)| v.as_str()).collect()
    }
}

/// Destination for metric observations.
///
/// Implementations must tolerate concurrent calls from every pipeline.
pub trait MetricsSink: Send + Sync {
    fn record(&self, observation: &MetricObservation);

    fn record_all(&self, observations: &[MetricObservation]) {
        for observation in observations {
            self.record(observation);
        }
    }
}
