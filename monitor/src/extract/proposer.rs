//! Proposer attribution from replica command logs.
//!
//! Each line is a JSON record; when it carries a non-empty
//! `abci_block.proposer` the proposer's counter goes up by one.

use serde::Deserialize;
use tracing::debug;

use super::{ExtractError, LineExtractor};
use crate::metrics::MetricObservation;
use crate::metrics::sink::PROPOSER_COUNT;

#[derive(Debug, Deserialize)]
struct ReplicaCommand {
    abci_block: Option<AbciBlock>,
}

#[derive(Debug, Deserialize)]
struct AbciBlock {
    proposer: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProposerExtractor;

impl LineExtractor for ProposerExtractor {
    fn extract(&self, line: &str) -> Result<Vec<MetricObservation>, ExtractError> {
        let cmd: ReplicaCommand = serde_json::from_str(line)?;
        let Some(proposer) = cmd
            .abci_block
            .and_then(|b| b.proposer)
            .filter(|p| !p.is_empty())
        else {
            return Ok(Vec::new());
        };

        debug!(%proposer, "proposal observed");
        Ok(vec![
            MetricObservation::increment(PROPOSER_COUNT).with_label("proposer", proposer),
        ])
    }
}
