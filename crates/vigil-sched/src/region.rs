use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use tracing::{debug, error, info, warn};
use vigil_core::{EntityId, RegionId};

use crate::action::{ActionHandle, ScheduledAction};
use crate::binder::EntityTimer;
use crate::clock::RegionClock;
use crate::config::SchedConfig;
use crate::error::{ActionResult, SchedError, SchedResult};
use crate::timer::{Fire, Presence, Scheduler, TimerManager, TimerStats};

type Job<S> = Box<dyn FnOnce(&mut S, &mut Scheduler<'_, S>) + Send>;

enum Inbound<S> {
    Start {
        action: ScheduledAction<S>,
        delay: u64,
    },
    Run(Job<S>),
}

/// One spatial partition: a virtual clock, a timer queue, and the state its
/// callbacks operate on.
///
/// Drive it synchronously with [`step`](Self::step) and friends, or move it
/// onto its own thread with [`spawn`](Self::spawn). Either way its actions
/// run strictly one at a time.
pub struct Region<S> {
    id: RegionId,
    config: SchedConfig,
    clock: Arc<RegionClock>,
    timers: TimerManager<S>,
    state: S,
    inbox: Arc<SegQueue<Inbound<S>>>,
    last_sync_warning: Option<u64>,
}

impl<S> fmt::Debug for Region<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("now", &self.clock.now())
            .field("timers", &self.timers)
            .finish()
    }
}

impl<S: Presence> Region<S> {
    /// A region at virtual time zero.
    pub fn new(id: RegionId, state: S, config: SchedConfig) -> SchedResult<Self> {
        config.validate()?;
        Ok(Self {
            id,
            timers: TimerManager::new(id, &config),
            config,
            clock: Arc::new(RegionClock::new(0)),
            state,
            inbox: Arc::new(SegQueue::new()),
            last_sync_warning: None,
        })
    }

    /// Region identifier.
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// Current virtual time.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Shared read access to the clock.
    pub fn clock(&self) -> Arc<RegionClock> {
        Arc::clone(&self.clock)
    }

    /// Scheduler settings.
    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// The state callbacks operate on.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Mutable access to the state between steps.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Consume the region, keeping its state.
    pub fn into_state(self) -> S {
        self.state
    }

    /// Timer counters.
    pub fn stats(&self) -> TimerStats {
        self.timers.stats()
    }

    /// Actions still able to fire.
    pub fn pending(&self) -> usize {
        self.timers.pending()
    }

    /// Start `action` `delay` ms from now.
    pub fn start(&mut self, action: ScheduledAction<S>, delay: u64) -> SchedResult<ActionHandle> {
        let now = self.clock.now();
        self.timers.scheduler(now).start(action, delay)
    }

    /// Run `f` with the state and a scheduler, as if it were a callback.
    pub fn with_scheduler<R>(&mut self, f: impl FnOnce(&mut S, &mut Scheduler<'_, S>) -> R) -> R {
        let now = self.clock.now();
        let mut scheduler = self.timers.scheduler(now);
        f(&mut self.state, &mut scheduler)
    }

    /// Advance the clock by one tick and run everything due. Returns the
    /// number of callbacks that ran.
    pub fn step(&mut self) -> usize {
        let now = self.clock.advance(self.config.tick_ms);
        self.drain_inbox(now);
        self.timers.run_due(&mut self.state, now)
    }

    /// Step until the clock has advanced by at least `ms`.
    pub fn advance_by(&mut self, ms: u64) -> usize {
        let target = self.clock.now().saturating_add(ms);
        self.advance_to(target)
    }

    /// Step until the clock reaches or passes `target`.
    pub fn advance_to(&mut self, target: u64) -> usize {
        let mut fired = 0;
        while self.clock.now() < target {
            fired += self.step();
        }
        fired
    }

    /// A cross-thread handle for scheduling onto this region.
    pub fn remote(&self) -> RegionRemote<S> {
        RegionRemote {
            id: self.id,
            clock: Arc::clone(&self.clock),
            inbox: Arc::clone(&self.inbox),
            max_delay: self.config.max_delay_ms,
        }
    }

    fn drain_inbox(&mut self, now: u64) {
        while let Some(inbound) = self.inbox.pop() {
            match inbound {
                Inbound::Start { action, delay } => {
                    let id = action.id();
                    if let Err(err) = self.timers.scheduler(now).start(action, delay) {
                        // Stopped between posting and now: nothing to run.
                        if matches!(err, SchedError::AlreadyStopped(_)) {
                            debug!(region = %self.id, action = %id, "remote_start_cancelled");
                        } else {
                            warn!(region = %self.id, action = %id, error = %err, "remote_start_rejected");
                        }
                    }
                }
                Inbound::Run(job) => {
                    let mut scheduler = self.timers.scheduler(now);
                    let state = &mut self.state;
                    if let Err(payload) =
                        panic::catch_unwind(AssertUnwindSafe(|| job(state, &mut scheduler)))
                    {
                        let message = payload
                            .downcast_ref::<&str>()
                            .copied()
                            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                            .unwrap_or("non-string panic payload");
                        error!(region = %self.id, panic = message, "posted_job_panicked");
                    }
                }
            }
        }
    }

    fn note_overrun(&mut self, overrun: Duration) {
        if overrun.as_millis() as u64 <= self.config.out_of_sync_ms {
            return;
        }
        let now = self.clock.now();
        let due = self
            .last_sync_warning
            .is_none_or(|last| now.saturating_sub(last) >= self.config.out_of_sync_log_interval_ms);
        if due {
            self.last_sync_warning = Some(now);
            warn!(
                region = %self.id,
                overrun_ms = overrun.as_millis() as u64,
                now,
                "region_out_of_sync"
            );
        }
    }
}

impl<S: Presence + Send + 'static> Region<S> {
    /// Move the region onto a dedicated worker thread named `region-<id>`.
    pub fn spawn(self) -> SchedResult<RegionWorker<S>> {
        let id = self.id;
        let remote = self.remote();
        let shutdown_timeout = Duration::from_millis(self.config.shutdown_timeout_ms);
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(format!("region-{id}"))
            .spawn(move || run_worker(self, flag))
            .map_err(|source| SchedError::Spawn { region: id, source })?;
        Ok(RegionWorker {
            id,
            remote,
            running,
            shutdown_timeout,
            handle: Some(handle),
        })
    }
}

fn run_worker<S: Presence>(mut region: Region<S>, running: Arc<AtomicBool>) -> Region<S> {
    let tick = Duration::from_millis(region.config.tick_ms);
    info!(
        region = %region.id,
        tick_ms = region.config.tick_ms,
        realtime = region.config.realtime,
        "region_worker_started"
    );

    while running.load(Ordering::Acquire) {
        let started = Instant::now();
        region.step();
        if region.config.realtime {
            let spent = started.elapsed();
            match tick.checked_sub(spent) {
                Some(rest) => thread::sleep(rest),
                None => region.note_overrun(spent - tick),
            }
        } else {
            thread::yield_now();
        }
    }

    info!(
        region = %region.id,
        now = region.now(),
        invoked = region.stats().invoked,
        "region_worker_stopped"
    );
    region
}

/// Cross-thread access to a region: read its clock, stop actions, and post
/// work that the region runs on its next step.
pub struct RegionRemote<S> {
    id: RegionId,
    clock: Arc<RegionClock>,
    inbox: Arc<SegQueue<Inbound<S>>>,
    max_delay: u64,
}

impl<S> Clone for RegionRemote<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            clock: Arc::clone(&self.clock),
            inbox: Arc::clone(&self.inbox),
            max_delay: self.max_delay,
        }
    }
}

impl<S> fmt::Debug for RegionRemote<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionRemote")
            .field("id", &self.id)
            .field("now", &self.clock.now())
            .field("queued", &self.inbox.len())
            .finish()
    }
}

impl<S> RegionRemote<S> {
    /// Region identifier.
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// The region's current virtual time.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Validate `action` and queue it to start on the region's next step.
    /// The delay counts from that step.
    pub fn start(&self, action: ScheduledAction<S>, delay: u64) -> SchedResult<ActionHandle> {
        action.check_start(delay, self.max_delay)?;
        let handle = action.handle().clone();
        self.inbox.push(Inbound::Start { action, delay });
        Ok(handle)
    }

    /// Stop an action from this thread. Idempotent.
    pub fn stop(&self, handle: &ActionHandle) -> bool {
        handle.stop()
    }

    /// Run `job` on the region's thread before its next timer pass.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce(&mut S, &mut Scheduler<'_, S>) + Send + 'static,
    {
        self.inbox.push(Inbound::Run(Box::new(job)));
    }
}

impl<S: 'static> RegionRemote<S> {
    /// Run `f` once on behalf of `owner`, `delay` ms after the next step.
    pub fn schedule<F>(&self, owner: EntityId, delay: u64, f: F) -> SchedResult<ActionHandle>
    where
        F: FnOnce(&mut Fire<'_, S>, EntityId) -> ActionResult<()> + Send + 'static,
    {
        self.start(EntityTimer::new(owner, "once").once(f), delay)
    }

    /// Self-interval variant of [`schedule`](Self::schedule).
    pub fn schedule_repeating<F>(
        &self,
        owner: EntityId,
        delay: u64,
        f: F,
    ) -> SchedResult<ActionHandle>
    where
        F: FnMut(&mut Fire<'_, S>, EntityId) -> ActionResult<i64> + Send + 'static,
    {
        self.start(EntityTimer::new(owner, "repeating").every(f), delay)
    }
}

/// A region running on its own thread.
pub struct RegionWorker<S> {
    id: RegionId,
    remote: RegionRemote<S>,
    running: Arc<AtomicBool>,
    shutdown_timeout: Duration,
    handle: Option<JoinHandle<Region<S>>>,
}

impl<S> fmt::Debug for RegionWorker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionWorker")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish()
    }
}

impl<S> RegionWorker<S> {
    /// Region identifier.
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// Cross-thread handle to the region.
    pub fn remote(&self) -> RegionRemote<S> {
        self.remote.clone()
    }

    /// The region's current virtual time.
    pub fn now(&self) -> u64 {
        self.remote.now()
    }

    /// True until stop is requested or the worker exits.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the worker to finish its current step and hand the region back.
    pub fn stop(mut self) -> SchedResult<Region<S>> {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return Err(SchedError::WorkerPanicked(self.id));
        };
        let deadline = Instant::now() + self.shutdown_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(region = %self.id, "region_worker_shutdown_timeout");
                return Err(SchedError::ShutdownTimeout(self.id));
            }
            thread::sleep(Duration::from_millis(1));
        }
        handle.join().map_err(|_| SchedError::WorkerPanicked(self.id))
    }
}

impl<S> Drop for RegionWorker<S> {
    fn drop(&mut self) {
        // A worker dropped without `stop` winds down on its own.
        self.running.store(false, Ordering::Release);
    }
}
