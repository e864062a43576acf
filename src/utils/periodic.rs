use std::future::Future;

use log::debug;
use tokio::{
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// A cancellable job that runs on a fixed period on the tokio runtime.
///
/// Ticks that fall behind are delayed, never bunched. The job runs inline
/// with the ticker, so a job that wants overlapping firings dropped instead
/// of delayed should hand its work off to its own task.
pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(
        name: &'static str,
        initial_delay: Duration,
        period: Duration,
        mut job: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + initial_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => job().await,
                }
            }

            debug!("periodic task '{name}' stopped");
        });

        debug!("periodic task '{name}' scheduled every {period:?}");
        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Prevents further firings. A job already running is left to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels and waits for the ticker task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                log::error!("periodic task '{}' failed to join: {err}", self.name);
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
