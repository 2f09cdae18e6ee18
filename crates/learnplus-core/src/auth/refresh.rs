//! Periodic background work with an explicit cancellation handle.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Default interval between token refreshes. Access tokens are issued for
/// an hour; refreshing at 55 minutes leaves a margin for slow responses.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(55 * 60);

/// Longest period a scheduled task runs on; longer requests are clamped.
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Shortest period; tokio intervals reject zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a running [`ScheduledTask`]. Dropping the handle stops the task.
pub struct ScheduledTask {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `tick` every `period`, first after one full period. The task
    /// ends when `tick` resolves to `false` or the handle is cancelled.
    ///
    /// `period` is clamped to at most [`MAX_REFRESH_INTERVAL`] and at least
    /// one millisecond. Returns `None` outside a tokio runtime.
    pub fn every<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Option<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(task = name, "No async runtime, scheduled task not started");
                return None;
            }
        };

        let period = period.clamp(MIN_PERIOD, MAX_REFRESH_INTERVAL);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task = runtime.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(task = name, ?period, "Scheduled task started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {}
                }
                let keep_going = tokio::select! {
                    _ = &mut shutdown_rx => false,
                    keep_going = tick() => keep_going,
                };
                if !keep_going {
                    break;
                }
            }

            debug!(task = name, "Scheduled task stopped");
        });

        Some(Self {
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    /// Stop the task. Any tick in progress is dropped.
    pub fn cancel(mut self) {
        self.signal_shutdown();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            // Err means the task already ended on its own
            let _ = tx.send(());
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.signal_shutdown();
    }
}
