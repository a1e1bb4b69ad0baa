//! Periodic refresh of the validator resolver cache.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use super::cache::ValidatorResolver;
use super::error::ResolverError;
use super::http::{ValidatorDirectory, build_mapping};
use crate::metrics::MetricsSink;
use crate::metrics::sink::{MetricObservation, VALIDATOR_COUNT};
use crate::shutdown::{self, CancellationToken};

/// Pulls the validator directory on a fixed interval and swaps the result
/// into the resolver.
pub struct ValidatorRefresher<D> {
    directory: D,
    resolver: Arc<ValidatorResolver>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
}

impl<D: ValidatorDirectory> ValidatorRefresher<D> {
    pub fn new(
        directory: D,
        resolver: Arc<ValidatorResolver>,
        sink: Arc<dyn MetricsSink>,
        interval: Duration,
    ) -> Self {
        Self {
            directory,
            resolver,
            sink,
            interval,
        }
    }

    /// One fetch-and-replace cycle. Returns the number of validators.
    ///
    /// On error the resolver keeps its previous mapping.
    pub fn refresh_once(&self) -> Result<usize, ResolverError> {
        let summaries = self.directory.fetch_summaries()?;
        self.resolver.replace(build_mapping(&summaries));
        self.sink
            .record(&MetricObservation::set(VALIDATOR_COUNT, summaries.len() as f64));
        info!(
            validators = summaries.len(),
            short_addresses = self.resolver.len(),
            "validator mapping updated"
        );
        Ok(summaries.len())
    }

    /// Refreshes immediately, then every `interval`, until shutdown.
    pub fn run(&self, shutdown: &CancellationToken) {
        loop {
            if let Err(e) = self.refresh_once() {
                warn!("{e}; keeping previous validator mapping");
            }
            if !shutdown::sleep(shutdown, self.interval) {
                return;
            }
        }
    }
}

impl<D: ValidatorDirectory + 'static> ValidatorRefresher<D> {
    /// Runs the refresher on its own thread.
    pub fn spawn(self, shutdown: CancellationToken) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("validator-refresh".to_string())
            .spawn(move || self.run(&shutdown))
    }
}
