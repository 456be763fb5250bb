//! Completion gate for work that runs off the calling thread.
//!
//! A task is spawned on the rayon pool and publishes a named [`Artifact`].
//! The caller blocks in [`PendingArtifact::wait`] until an artifact with the
//! expected name is available, polling with exponential backoff, and gives
//! up on timeout or cancellation. Each task gets its own [`CancelToken`],
//! set once its pending artifact is dropped, so abandoned work stops at the
//! task's next check.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{
    DEFAULT_GATE_MAX_POLL_INTERVAL_MS, DEFAULT_GATE_POLL_INTERVAL_MS, DEFAULT_GATE_TIMEOUT_MS,
};
use crate::error::{NucspotError, Result};

/// Timing of the completion gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Maximum time to wait for an artifact.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// First poll interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Poll interval ceiling; the interval doubles until it reaches this.
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_GATE_TIMEOUT_MS
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_GATE_POLL_INTERVAL_MS
}
fn default_max_poll_interval_ms() -> u64 {
    DEFAULT_GATE_MAX_POLL_INTERVAL_MS
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_GATE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_GATE_POLL_INTERVAL_MS,
            max_poll_interval_ms: DEFAULT_GATE_MAX_POLL_INTERVAL_MS,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(NucspotError::InvalidConfig(
                "gate poll_interval_ms must be at least 1".into(),
            ));
        }
        if self.max_poll_interval_ms < self.poll_interval_ms {
            return Err(NucspotError::InvalidConfig(format!(
                "gate max_poll_interval_ms {} is below poll_interval_ms {}",
                self.max_poll_interval_ms, self.poll_interval_ms
            )));
        }
        Ok(())
    }
}

/// Shared cancellation flag, checked between images, while waiting, and
/// between filter passes of a background task.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A named value produced by a background task.
#[derive(Clone, Debug)]
pub struct Artifact<T> {
    pub name: String,
    pub value: T,
}

impl<T> Artifact<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

enum Outcome<T> {
    Ready(Artifact<T>),
    Failed(String),
}

/// Handle to an artifact that may not exist yet.
///
/// Dropping the handle, including through a failed [`wait`](Self::wait),
/// cancels the task.
pub struct PendingArtifact<T> {
    expected: String,
    slot: Arc<Mutex<Option<Outcome<T>>>>,
    task_cancel: CancelToken,
}

/// Run `task` on the rayon pool; its artifact is expected to be named
/// `expected`.
///
/// The task receives a token that is cancelled when the returned handle is
/// dropped. Errors and panics inside the task are captured and reported by
/// [`PendingArtifact::wait`].
pub fn spawn<T, F>(expected: impl Into<String>, task: F) -> PendingArtifact<T>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken) -> Result<Artifact<T>> + Send + 'static,
{
    let expected = expected.into();
    let slot = Arc::new(Mutex::new(None));
    let publish = Arc::clone(&slot);
    let task_cancel = CancelToken::new();
    let token = task_cancel.clone();
    let name = expected.clone();
    rayon::spawn(move || {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| task(&token))) {
            Ok(Ok(artifact)) => Outcome::Ready(artifact),
            Ok(Err(NucspotError::Cancelled)) => {
                debug!(name = %name, "Task stopped after cancellation");
                Outcome::Failed(NucspotError::Cancelled.to_string())
            }
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(_) => Outcome::Failed("task panicked".into()),
        };
        *publish.lock() = Some(outcome);
    });
    PendingArtifact {
        expected,
        slot,
        task_cancel,
    }
}

impl<T> PendingArtifact<T> {
    pub fn expected_name(&self) -> &str {
        &self.expected
    }

    /// True once the task has published (successfully or not).
    pub fn is_ready(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Block until the artifact named `expected` is available.
    pub fn wait(self, config: &GateConfig, cancel: &CancelToken) -> Result<T> {
        let start = Instant::now();
        let timeout = Duration::from_millis(config.timeout_ms);
        let max_interval = Duration::from_millis(config.max_poll_interval_ms.max(1));
        let mut interval = Duration::from_millis(config.poll_interval_ms.max(1)).min(max_interval);
        let mut polls = 0u32;

        loop {
            polls += 1;
            let outcome = self.slot.lock().take();
            match outcome {
                Some(Outcome::Ready(artifact)) if artifact.name == self.expected => {
                    debug!(
                        name = %self.expected,
                        polls,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "Artifact ready"
                    );
                    return Ok(artifact.value);
                }
                Some(Outcome::Ready(artifact)) => {
                    return Err(NucspotError::ArtifactMismatch {
                        expected: self.expected.clone(),
                        found: artifact.name,
                    });
                }
                Some(Outcome::Failed(reason)) => {
                    return Err(NucspotError::TaskFailed {
                        name: self.expected.clone(),
                        reason,
                    });
                }
                None => {}
            }

            if cancel.is_cancelled() {
                return Err(NucspotError::Cancelled);
            }
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(NucspotError::WaitTimeout {
                    name: self.expected.clone(),
                    waited,
                });
            }
            thread::sleep(interval.min(timeout - waited));
            interval = (interval * 2).min(max_interval);
        }
    }
}

impl<T> Drop for PendingArtifact<T> {
    fn drop(&mut self) {
        self.task_cancel.cancel();
    }
}
