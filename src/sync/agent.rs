use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use tokio::{task::JoinHandle, time::Duration};

use crate::{
    config::{ConfigStore, SyncTarget},
    db::{Database, Event},
    utils::PeriodicTask,
};

use super::{
    error::DeliveryError,
    payload::{load_screenshot, EventPayload},
    transport::EventTransport,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Most events examined per cycle. Anything beyond waits for the next one.
pub const PENDING_QUERY_LIMIT: usize = 100;
pub const BATCH_SIZE: usize = 10;
const INITIAL_SYNC_DELAY: Duration = Duration::from_secs(5);

/// Counts for one cycle that actually talked to the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another cycle held the in-flight guard.
    AlreadyRunning,
    NotConfigured,
    /// Pending events could not be read.
    StoreUnavailable,
    NothingPending,
    Completed(CycleReport),
}

/// Uploads pending events on a timer, at most one cycle at a time.
///
/// Cloning is cheap and every clone drives the same schedule and guard.
#[derive(Clone)]
pub struct SyncAgent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    db: Database,
    config: Arc<ConfigStore>,
    transport: Arc<dyn EventTransport>,
    in_flight: AtomicBool,
    timer: Mutex<Option<PeriodicTask>>,
    /// Cycle started by the most recent timer firing.
    current: Mutex<Option<JoinHandle<()>>>,
    cycles: AtomicUsize,
    last_outcome: Mutex<Option<SyncOutcome>>,
}

/// Holds the in-flight flag for the lifetime of a cycle.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncAgent {
    pub fn new(db: Database, config: Arc<ConfigStore>, transport: Arc<dyn EventTransport>) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                db,
                config,
                transport,
                in_flight: AtomicBool::new(false),
                timer: Mutex::new(None),
                current: Mutex::new(None),
                cycles: AtomicUsize::new(0),
                last_outcome: Mutex::new(None),
            }),
        }
    }

    /// Schedules the first cycle five seconds out, then one every
    /// `syncInterval`. Does nothing if already scheduled.
    pub fn start(&self) {
        let period = self.inner.config.snapshot().sync_period();
        self.schedule(INITIAL_SYNC_DELAY, period);
    }

    pub(crate) fn schedule(&self, initial_delay: Duration, period: Duration) {
        let mut timer = self.timer_slot();
        if timer.as_ref().is_some_and(PeriodicTask::is_active) {
            return;
        }

        // The timer lives inside `inner`, so it only holds a weak handle back.
        let weak: Weak<AgentInner> = Arc::downgrade(&self.inner);
        let task = PeriodicTask::spawn("sync", initial_delay, period, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    SyncAgent { inner }.spawn_cycle();
                }
            }
        });

        log_info!("Sync scheduled every {period:?}");
        *timer = Some(task);
    }

    /// Runs a cycle on its own task so a slow cycle never delays the ticker.
    /// A firing that lands while the previous cycle is still going is dropped.
    fn spawn_cycle(&self) {
        let mut current = self.current_slot();
        if current.as_ref().is_some_and(|handle| !handle.is_finished()) {
            log_debug!("Previous sync cycle still running, skipping");
            return;
        }
        let agent = self.clone();
        *current = Some(tokio::spawn(async move {
            agent.run_cycle().await;
        }));
    }

    /// Cancels the schedule. A cycle already in flight runs to completion.
    pub fn pause(&self) {
        if let Some(task) = self.timer_slot().take() {
            task.cancel();
            log_info!("Sync paused");
        }
    }

    /// Cancels the schedule and waits for the cycle it last started, so
    /// every accepted event is marked synced before this returns.
    pub async fn stop(&self) {
        let timer = self.timer_slot().take();
        if let Some(task) = timer {
            task.stop().await;
        }

        let current = self.current_slot().take();
        if let Some(handle) = current {
            if !handle.is_finished() {
                log_info!("Waiting for the sync cycle in flight to finish");
            }
            if let Err(err) = handle.await {
                log_error!("Sync cycle task failed: {err}");
            }
        }
        log_info!("Sync stopped");
    }

    pub fn resume(&self) {
        self.start();
    }

    pub fn is_scheduled(&self) -> bool {
        self.timer_slot()
            .as_ref()
            .is_some_and(PeriodicTask::is_active)
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Cycles that got past the in-flight guard, on any clone.
    pub fn cycles_run(&self) -> usize {
        self.inner.cycles.load(Ordering::Acquire)
    }

    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        *self
            .inner
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn timer_slot(&self) -> MutexGuard<'_, Option<PeriodicTask>> {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn current_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// One sync cycle: read up to [`PENDING_QUERY_LIMIT`] pending events,
    /// deliver them oldest first in batches of [`BATCH_SIZE`], then mark
    /// every delivered event synced in one store call.
    pub async fn run_cycle(&self) -> SyncOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.inner.in_flight) else {
            log_debug!("Sync already in progress, skipping");
            return SyncOutcome::AlreadyRunning;
        };

        let outcome = self.sync_pending().await;
        self.inner.cycles.fetch_add(1, Ordering::AcqRel);
        *self
            .inner
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        outcome
    }

    async fn sync_pending(&self) -> SyncOutcome {
        let Some(target) = self.inner.config.sync_target() else {
            log_warn!("API configuration missing, skipping sync");
            return SyncOutcome::NotConfigured;
        };

        let events = match self.inner.db.query_pending(PENDING_QUERY_LIMIT).await {
            Ok(events) => events,
            Err(err) => {
                log_error!("Failed to read pending events: {err:?}");
                return SyncOutcome::StoreUnavailable;
            }
        };
        if events.is_empty() {
            log_debug!("No events to sync");
            return SyncOutcome::NothingPending;
        }

        log_info!("Syncing {} events...", events.len());
        let max_edge = self.inner.config.snapshot().max_screenshot_size;

        let mut report = CycleReport {
            attempted: events.len(),
            ..CycleReport::default()
        };
        let mut delivered_ids = Vec::with_capacity(events.len());

        for (index, batch) in events.chunks(BATCH_SIZE).enumerate() {
            for event in batch {
                match self.deliver_event(&target, event, max_edge).await {
                    Ok(()) => delivered_ids.push(event.id),
                    Err(err) => {
                        report.failed += 1;
                        log_warn!("Event {} not delivered: {err}", event.id);
                    }
                }
            }
            log_debug!("Batch {} of {} sent", index + 1, events.len().div_ceil(BATCH_SIZE));
        }

        report.delivered = delivered_ids.len();
        if !delivered_ids.is_empty() {
            match self.inner.db.mark_synced(&delivered_ids).await {
                Ok(marked) => log_info!("Successfully synced {marked} events"),
                // The events stay pending and will be delivered again.
                Err(err) => log_error!("Failed to mark delivered events synced: {err:?}"),
            }
        }

        SyncOutcome::Completed(report)
    }

    async fn deliver_event(
        &self,
        target: &SyncTarget,
        event: &Event,
        max_edge: u32,
    ) -> Result<(), DeliveryError> {
        let screenshot = match &event.screenshot_path {
            Some(path) => {
                let path = PathBuf::from(path);
                tokio::task::spawn_blocking(move || load_screenshot(&path, max_edge))
                    .await
                    .unwrap_or_else(|err| {
                        log_warn!("Screenshot load task failed: {err}");
                        None
                    })
            }
            None => None,
        };

        let body = EventPayload::from_event(event, screenshot.as_deref()).to_body(event.id)?;
        self.inner.transport.deliver(target, body).await
    }
}
