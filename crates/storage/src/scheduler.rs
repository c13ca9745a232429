//! Single-worker delay scheduler.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs after a delay, one at a time, on a single background task.
///
/// Jobs run in submission order. A job scheduled behind a longer delay holds
/// back the jobs queued after it, which is fine for a fixed retry delay.
#[derive(Clone, Debug)]
pub struct DelayScheduler {
    sender: mpsc::UnboundedSender<(Instant, Job)>,
}

impl DelayScheduler {
    /// Spawn the worker. Must be called from within a tokio runtime.
    ///
    /// The worker exits once every handle has been dropped.
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<(Instant, Job)>();

        tokio::spawn(async move {
            while let Some((deadline, job)) = receiver.recv().await {
                tokio::time::sleep_until(deadline).await;
                job();
            }
            debug!("Delay scheduler stopped");
        });

        Self { sender }
    }

    /// Run `job` on the scheduler task once `delay` has elapsed.
    ///
    /// Returns false if the worker is gone.
    pub fn schedule(&self, delay: Duration, job: impl FnOnce() + Send + 'static) -> bool {
        self.sender
            .send((Instant::now() + delay, Box::new(job)))
            .is_ok()
    }
}
