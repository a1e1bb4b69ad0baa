//! Static description of one log family.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::tailer::RotatingTailer;
use super::watcher::DirectoryWatcher;
use crate::extract::LineExtractor;
use crate::metrics::MetricsSink;

/// Default interval between directory scans while no file is open.
pub const DEFAULT_ROTATION_POLL: Duration = Duration::from_secs(10);
/// Default sleep after reaching EOF on the current file.
pub const DEFAULT_IDLE_POLL: Duration = Duration::from_secs(1);

/// One log directory paired with the extractor for its lines.
#[derive(Clone)]
pub struct LogFamily {
    pub name: &'static str,
    pub root: PathBuf,
    pub extractor: Arc<dyn LineExtractor>,
    pub rotation_poll: Duration,
    pub idle_poll: Duration,
    /// Whether a missing root directory at launch is fatal for this family.
    pub required: bool,
}

impl LogFamily {
    pub fn new(
        name: &'static str,
        root: impl Into<PathBuf>,
        extractor: Arc<dyn LineExtractor>,
    ) -> Self {
        Self {
            name,
            root: root.into(),
            extractor,
            rotation_poll: DEFAULT_ROTATION_POLL,
            idle_poll: DEFAULT_IDLE_POLL,
            required: false,
        }
    }

    pub fn with_rotation_poll(mut self, interval: Duration) -> Self {
        self.rotation_poll = interval;
        self
    }

    pub fn with_idle_poll(mut self, interval: Duration) -> Self {
        self.idle_poll = interval;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds the per-line callback: extract, then push into `sink`.
    ///
    /// Extraction errors are logged and the line is dropped.
    pub fn line_handler(&self, sink: Arc<dyn MetricsSink>) -> impl FnMut(&str) + Send + 'static {
        let family = self.name;
        let extractor = Arc::clone(&self.extractor);
        move |line: &str| match extractor.extract(line) {
            Ok(observations) => sink.record_all(&observations),
            Err(e) => {
                warn!(family, "dropping line: {e}");
                debug!(family, line, "dropped line");
            }
        }
    }

    /// Builds a fresh tailer for this family, starting in Locating.
    pub fn tailer(
        &self,
        sink: Arc<dyn MetricsSink>,
    ) -> RotatingTailer<DirectoryWatcher, impl FnMut(&str) + Send + 'static> {
        RotatingTailer::new(
            self.name,
            DirectoryWatcher::new(&self.root),
            self.line_handler(sink),
            self.rotation_poll,
            self.idle_poll,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractError;
    use crate::metrics::MetricObservation;
    use std::sync::Mutex;

    struct Upper;

    impl LineExtractor for Upper {
        fn extract(&self, line: &str) -> Result<Vec<MetricObservation>, ExtractError> {
            if line.starts_with('!') {
                return Err(ExtractError::UnexpectedShape("bang"));
            }
            Ok(vec![MetricObservation::increment("seen").with_label("line", line.to_uppercase())])
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<MetricObservation>>);

    impl MetricsSink for Collect {
        fn record(&self, observation: &MetricObservation) {
            self.0.lock().unwrap().push(observation.clone());
        }
    }

    #[test]
    fn handler_forwards_observations_and_swallows_errors() {
        let family = LogFamily::new("upper", "/nowhere", Arc::new(Upper));
        let sink = Arc::new(Collect::default());
        let mut handler = family.line_handler(sink.clone());

        handler("abc");
        handler("!broken");
        handler("def");

        let seen = sink.0.lock().unwrap();
        let labels: Vec<_> = seen.iter().map(|o| o.labels[0].1.clone()).collect();
        assert_eq!(labels, vec!["ABC", "DEF"]);
    }

    #[test]
    fn builder_sets_intervals() {
        let family = LogFamily::new("x", "/tmp/x", Arc::new(Upper))
            .with_rotation_poll(Duration::from_secs(5))
            .with_idle_poll(Duration::from_millis(250))
            .required(true);

        assert_eq!(family.rotation_poll, Duration::from_secs(5));
        assert_eq!(family.idle_poll, Duration::from_millis(250));
        assert!(family.required);
        assert_eq!(family.root(), Path::new("/tmp/x"));
    }
}
