//! Block height and apply duration from block-time logs.
//!
//! Lines look like:
//!
//! ```json
//! {"height":100,"block_time":"2024-10-01T12:00:00.123456789","apply_duration":0.5}
//! ```
//!
//! Height and apply duration each overwrite their gauge when present; the
//! block time is only logged. A record carrying neither is rejected.

use serde::Deserialize;
use tracing::debug;

use super::{ExtractError, LineExtractor};
use crate::metrics::MetricObservation;
use crate::metrics::sink::{APPLY_DURATION, BLOCK_HEIGHT};

#[derive(Debug, Deserialize)]
struct BlockTimeRecord {
    height: Option<u64>,
    block_time: Option<String>,
    apply_duration: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BlockExtractor;

impl LineExtractor for BlockExtractor {
    fn extract(&self, line: &str) -> Result<Vec<MetricObservation>, ExtractError> {
        let record: BlockTimeRecord = serde_json::from_str(line)?;
        if record.height.is_none() && record.apply_duration.is_none() {
            return Err(ExtractError::MissingField("height and apply_duration"));
        }

        debug!(
            height = ?record.height,
            block_time = record.block_time.as_deref().unwrap_or("-"),
            apply_duration = ?record.apply_duration,
            "block observed"
        );
        let height = record
            .height
            .map(|height| MetricObservation::set(BLOCK_HEIGHT, height as f64));
        let apply_duration = record
            .apply_duration
            .map(|duration| MetricObservation::set(APPLY_DURATION, duration));
        Ok(height.into_iter().chain(apply_duration).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsRegistry, MetricsSink};

    fn apply(metrics: &MetricsRegistry, line: &str) {
        if let Ok(obs) = BlockExtractor.extract(line) {
            metrics.record_all(&obs);
        }
    }

    #[test]
    fn sets_both_gauges() {
        let metrics = MetricsRegistry::new().unwrap();
        apply(
            &metrics,
            r#"{"height":100,"block_time":"t1","apply_duration":0.5}"#,
        );

        assert_eq!(metrics.node.block_height.get(), 100);
        assert_eq!(metrics.node.apply_duration.get(), 0.5);
    }

    #[test]
    fn last_write_wins() {
        let metrics = MetricsRegistry::new().unwrap();
        apply(&metrics, r#"{"height":100,"block_time":"t1","apply_duration":0.5}"#);
        apply(&metrics, r#"{"height":99,"block_time":"t0","apply_duration":0.1}"#);

        assert_eq!(metrics.node.block_height.get(), 99);
        assert_eq!(metrics.node.apply_duration.get(), 0.1);
    }

    #[test]
    fn malformed_lines_leave_gauges_alone() {
        let metrics = MetricsRegistry::new().unwrap();
        apply(&metrics, r#"{"height":7,"block_time":"t","apply_duration":0.25}"#);

        apply(&metrics, "{\"height\":8,\"block_ti");
        apply(&metrics, r#"{"height":"ten","apply_duration":1.0}"#);
        apply(&metrics, r#"{"block_time":"t"}"#);

        assert_eq!(metrics.node.block_height.get(), 7);
        assert_eq!(metrics.node.apply_duration.get(), 0.25);
    }

    #[test]
    fn each_field_sets_its_own_gauge() {
        let metrics = MetricsRegistry::new().unwrap();
        apply(&metrics, r#"{"height":7,"block_time":"t","apply_duration":0.25}"#);

        apply(&metrics, r#"{"height":9,"block_time":"t"}"#);
        assert_eq!(metrics.node.block_height.get(), 9);
        assert_eq!(metrics.node.apply_duration.get(), 0.25);

        apply(&metrics, r#"{"block_time":"t","apply_duration":0.75}"#);
        assert_eq!(metrics.node.block_height.get(), 9);
        assert_eq!(metrics.node.apply_duration.get(), 0.75);
    }

    #[test]
    fn record_without_either_field_is_rejected() {
        let err = BlockExtractor.extract(r#"{"block_time":"t"}"#).unwrap_err();
        assert!(matches!(err, ExtractError::MissingField(_)));
    }

    #[test]
    fn block_time_is_optional() {
        let obs = BlockExtractor
            .extract(r#"{"height":5,"apply_duration":0.01}"#)
            .unwrap();
        assert_eq!(obs.len(), 2);
    }
}
