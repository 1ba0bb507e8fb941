//! Fixed-delay background task scheduling.
//!
//! Drives periodic key rotation on the tokio runtime, off the
//! request-handling path.

use crate::error::AuthError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::warn;

/// How long [`ScheduledTask::stop`] waits for an in-flight run by default.
pub const STOP_GRACE: Duration = Duration::from_secs(60);

/// A repeating background task with a fixed delay between completions.
///
/// The first run starts one period after spawning. A failing run is logged
/// and does not stop the cadence: the next tick still fires. Dropping the
/// handle stops the task at the next tick boundary without waiting.
pub struct ScheduledTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Spawn `action` to run every `period`, measured from the completion of
    /// one run to the start of the next.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), AuthError>> + Send,
    {
        let (shutdown, mut signal) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = time::sleep(period) => {
                        if let Err(error) = action().await {
                            warn!(task = name, %error, "scheduled run failed, next tick unaffected");
                        }
                    }
                    _ = signal.changed() => break,
                }
            }
        });

        Self {
            name,
            shutdown,
            handle,
        }
    }

    /// Stop the task: no further runs start, and an in-flight run is given up
    /// to `grace` to finish. A run that outlives the grace interval is
    /// reported and left to complete detached.
    pub async fn stop(self, grace: Duration) {
        let _ = self.shutdown.send(true);
        if time::timeout(grace, self.handle).await.is_err() {
            warn!(
                task = self.name,
                "scheduled task did not stop within grace period"
            );
        }
    }
}
