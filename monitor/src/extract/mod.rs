//! Line extractors.
//!
//! Each log family has its own line format. An extractor turns one line
//! into zero or more [`MetricObservation`]s and never touches the sink
//! itself, so a malformed line can only ever cost that one line.

pub mod block;
pub mod error;
pub mod jailed;
pub mod proposer;

pub use block::BlockExtractor;
pub use error::ExtractError;
pub use jailed::JailedExtractor;
pub use proposer::ProposerExtractor;

use crate::metrics::MetricObservation;

/// Parses one line of a family's log.
pub trait LineExtractor: Send + Sync {
    fn extract(&self, line: &str) -> Result<Vec<MetricObservation>, ExtractError>;
}
