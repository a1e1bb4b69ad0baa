//! Pipeline supervisor.
//!
//! Each log family runs its [`RotatingTailer`](crate::ingest::RotatingTailer)
//! on a dedicated worker thread. A supervising thread per family joins the
//! worker; if the worker dies (panic) or returns while the agent is still
//! running, the supervisor logs it, waits `restart_delay` and starts a
//! fresh tailer. Families never coordinate with each other.

use std::any::Any;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info};

use crate::ingest::LogFamily;
use crate::metrics::MetricsSink;
use crate::shutdown::{self, CancellationToken};

/// Default pause before restarting a dead tailer.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum SupervisorError {
    /// A required family's directory is absent; the family is not started.
    #[error("{family}: required log directory {path} does not exist")]
    MissingRoot { family: &'static str, path: PathBuf },

    #[error("failed to spawn supervisor thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Launches and restarts family pipelines.
pub struct PipelineSupervisor {
    sink: Arc<dyn MetricsSink>,
    shutdown: CancellationToken,
    restart_delay: Duration,
}

impl PipelineSupervisor {
    pub fn new(sink: Arc<dyn MetricsSink>, shutdown: CancellationToken) -> Self {
        Self {
            sink,
            shutdown,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Starts one family under supervision.
    pub fn launch(&self, family: LogFamily) -> Result<PipelineHandle, SupervisorError> {
        if family.required && !family.root.is_dir() {
            let err = SupervisorError::MissingRoot {
                family: family.name,
                path: family.root.clone(),
            };
            error!("{err}; pipeline not started");
            return Err(err);
        }

        let name = family.name;
        let restarts = Arc::new(AtomicU64::new(0));
        let worker = Supervised {
            family,
            sink: Arc::clone(&self.sink),
            shutdown: self.shutdown.clone(),
            restart_delay: self.restart_delay,
            restarts: Arc::clone(&restarts),
        };
        let thread = thread::Builder::new()
            .name(format!("supervise-{name}"))
            .spawn(move || worker.run())?;

        info!(family = name, "pipeline launched");
        Ok(PipelineHandle {
            family: name,
            restarts,
            thread,
        })
    }

    /// Starts every family, skipping (and logging) those that fail to launch.
    pub fn launch_all(&self, families: impl IntoIterator<Item = LogFamily>) -> Vec<PipelineHandle> {
        families
            .into_iter()
            .filter_map(|family| self.launch(family).ok())
            .collect()
    }
}

/// Handle to a supervised pipeline.
pub struct PipelineHandle {
    family: &'static str,
    restarts: Arc<AtomicU64>,
    thread: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn family(&self) -> &'static str {
        self.family
    }

    /// How many times the tailer has been restarted.
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Waits for the supervisor to finish. Only returns after shutdown.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!(family = self.family, "supervisor thread panicked");
        }
    }
}

struct Supervised {
    family: LogFamily,
    sink: Arc<dyn MetricsSink>,
    shutdown: CancellationToken,
    restart_delay: Duration,
    restarts: Arc<AtomicU64>,
}

impl Supervised {
    fn run(self) {
        let name = self.family.name;
        loop {
            let outcome = self.run_tailer();
            if self.shutdown.is_cancelled() {
                info!(family = name, "pipeline stopped");
                return;
            }

            match outcome {
                Ok(()) => error!(family = name, "tailer exited unexpectedly"),
                Err(reason) => error!(family = name, %reason, "tailer died"),
            }
            self.restarts.fetch_add(1, Ordering::SeqCst);
            error!(family = name, delay = ?self.restart_delay, "restarting tailer");

            if !shutdown::sleep(&self.shutdown, self.restart_delay) {
                info!(family = name, "pipeline stopped");
                return;
            }
        }
    }

    /// Runs a fresh tailer on a worker thread and waits for it.
    fn run_tailer(&self) -> Result<(), String> {
        let family = self.family.clone();
        let sink = Arc::clone(&self.sink);
        let shutdown = self.shutdown.clone();

        let worker = thread::Builder::new()
            .name(format!("tail-{}", family.name))
            .spawn(move || family.tailer(sink).run(&shutdown))
            .map_err(|e| format!("failed to spawn tailer thread: {e}"))?;

        worker.join().map_err(|panic| panic_message(panic.as_ref()))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
