//! Jailed-validator status from consensus logs.
//!
//! A status line is a JSON array whose `[1][1]` element carries the
//! consensus state:
//!
//! ```json
//! ["2024-10-01T12:00:00", ["in", {
//!     "jailed_validators": ["0x1234..5678"],
//!     "execution_state": {
//!         "round_to_stakes": [[42, [["0x1234..5678", 1000], ["0xabcd..ef01", 900]]]]
//!     }
//! }]]
//! ```
//!
//! Every validator holding stake in any round gets its jailed gauge set to
//! 1 or 0. Validators that drop out of the stake table keep their last
//! value.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{ExtractError, LineExtractor};
use crate::metrics::MetricObservation;
use crate::metrics::sink::VALIDATOR_JAILED_STATUS;
use crate::resolver::ValidatorResolver;

pub struct JailedExtractor {
    resolver: Arc<ValidatorResolver>,
}

impl JailedExtractor {
    pub fn new(resolver: Arc<ValidatorResolver>) -> Self {
        Self { resolver }
    }
}

/// Short addresses listed under `jailed_validators`, empty when absent.
fn jailed_set(state: &Value) -> Result<HashSet<&str>, ExtractError> {
    match state.get("jailed_validators") {
        None | Some(Value::Null) => Ok(HashSet::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .ok_or(ExtractError::UnexpectedShape("jailed validator is not a string"))
            })
            .collect(),
        Some(_) => Err(ExtractError::UnexpectedShape("jailed_validators is not a list")),
    }
}

/// Distinct short addresses across every round's stake list.
fn participating_set(state: &Value) -> Result<BTreeSet<&str>, ExtractError> {
    let rounds = match state
        .get("execution_state")
        .and_then(|e| e.get("round_to_stakes"))
    {
        None | Some(Value::Null) => return Ok(BTreeSet::new()),
        Some(Value::Array(rounds)) => rounds,
        Some(_) => return Err(ExtractError::UnexpectedShape("round_to_stakes is not a list")),
    };

    let mut validators = BTreeSet::new();
    for round in rounds {
        let stakes = round
            .get(1)
            .and_then(Value::as_array)
            .ok_or(ExtractError::UnexpectedShape("round entry has no stake list"))?;
        for stake in stakes {
            let validator = stake
                .get(0)
                .and_then(Value::as_str)
                .ok_or(ExtractError::UnexpectedShape("stake entry has no validator"))?;
            validators.insert(validator);
        }
    }
    Ok(validators)
}

impl LineExtractor for JailedExtractor {
    fn extract(&self, line: &str) -> Result<Vec<MetricObservation>, ExtractError> {
        let record: Value = serde_json::from_str(line)?;
        let state = record
            .get(1)
            .and_then(|inner| inner.get(1))
            .filter(|state| state.is_object())
            .ok_or(ExtractError::UnexpectedShape("expected [_, [_, {state}]]"))?;

        let jailed = jailed_set(state)?;
        let participating = participating_set(state)?;
        if !participating.is_empty() && self.resolver.is_empty() {
            debug!("validator directory not loaded yet, names fall back to Unknown");
        }

        let observations = participating
            .into_iter()
            .map(|short| {
                let validator = self.resolver.resolve(short);
                let is_jailed = jailed.contains(short);
                debug!(
                    validator = %validator.full_address,
                    name = %validator.name,
                    jailed = is_jailed,
                    "validator status"
                );
                MetricObservation::set(VALIDATOR_JAILED_STATUS, if is_jailed { 1.0 } else { 0.0 })
                    .with_label("validator", validator.full_address)
                    .with_label("name", validator.name)
            })
            .collect();
        Ok(observations)
    }
}
