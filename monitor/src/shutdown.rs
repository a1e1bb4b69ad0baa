//! Cancellation for the blocking pipeline loops.
//!
//! Every long-running loop in the agent shares one [`CancellationToken`].
//! The async side stops on `cancelled()`; the tailer and refresher threads
//! poll `is_cancelled()` between steps and sleep through [`sleep`].

use std::thread;
use std::time::{Duration, Instant};

pub use tokio_util::sync::CancellationToken;

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Sleeps for `duration` on the current thread, waking early once `cancel`
/// fires.
///
/// Returns `false` if the sleep was cut short.
pub fn sleep(cancel: &CancellationToken, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
