//! HTTP client for the validator directory service.
//!
//! The service exposes a JSON API of the form:
//!
//! ```json
//! POST /info
//! { "type": "validatorSummaries" }
//!
//! Response:
//! [
//!   { "validator": "0x1234567890abcdef1234567890abcdef12345678", "name": "alpha", ... },
//!   ...
//! ]
//! ```
//!
//! Only `validator` and `name` are read; everything else is ignored.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::cache::{ValidatorMap, ValidatorRecord, map_from_records};
use super::error::ResolverError;

/// Source of the current validator set.
pub trait ValidatorDirectory: Send {
    fn fetch_summaries(&self) -> Result<Vec<ValidatorSummary>, ResolverError>;
}

/// One entry of the directory's answer.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ValidatorSummary {
    /// Full validator address.
    pub validator: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Builds the resolver table from directory entries.
pub fn build_mapping(summaries: &[ValidatorSummary]) -> ValidatorMap {
    map_from_records(
        summaries
            .iter()
            .map(|s| ValidatorRecord::new(s.validator.clone(), s.name.clone())),
    )
}

#[derive(Debug, Serialize)]
struct SummariesRequest {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Blocking HTTP implementation of [`ValidatorDirectory`].
///
/// Every request is bounded by the timeout given at construction, so a
/// stalled service cannot wedge the refresh loop.
pub struct HttpValidatorDirectory {
    url: String,
    client: Client,
}

impl HttpValidatorDirectory {
    /// `url` is the full info endpoint, e.g.
    /// `"https://api.hyperliquid-testnet.xyz/info"`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ResolverError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolverError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl ValidatorDirectory for HttpValidatorDirectory {
    fn fetch_summaries(&self) -> Result<Vec<ValidatorSummary>, ResolverError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&SummariesRequest {
                kind: "validatorSummaries",
            })
            .send()
            .map_err(|e| ResolverError::Transport(format!("HTTP POST {} failed: {e}", self.url)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ResolverError::Status(status.as_u16()));
        }

        resp.json::<Vec<ValidatorSummary>>()
            .map_err(|e| ResolverError::Protocol(format!("failed to parse JSON response: {e}")))
    }
}
