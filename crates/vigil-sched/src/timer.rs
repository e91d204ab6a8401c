use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};
use vigil_core::{EntityId, RegionId, World};

use crate::action::{ActionHandle, Next, ScheduledAction};
use crate::config::SchedConfig;
use crate::error::SchedResult;

/// Stopped entries are dropped from the queue every this many passes.
const PURGE_EVERY: u64 = 1024;

/// Region state that can tell whether an entity is still in the world.
///
/// The timer manager asks before every owned callback; an owner that has left
/// stops the action instead of running it.
pub trait Presence {
    /// True if `id` resolves to an entity that is still in the world.
    fn is_present(&self, id: EntityId) -> bool;
}

impl Presence for World {
    fn is_present(&self, id: EntityId) -> bool {
        World::is_present(self, id)
    }
}

/// Pending actions ordered by due time, ties broken by arrival order.
pub struct TimerQueue<S> {
    entries: BTreeMap<(u64, u64), ScheduledAction<S>>,
    next_seq: u64,
    max_delay: u64,
}

impl<S> fmt::Debug for TimerQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerQueue")
            .field("len", &self.entries.len())
            .field("next_due", &self.next_due())
            .finish()
    }
}

impl<S> TimerQueue<S> {
    /// An empty queue accepting delays up to `max_delay`.
    pub fn new(max_delay: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
            max_delay,
        }
    }

    /// Start `action` so that it is due `delay` ms after `now`.
    pub fn start(
        &mut self,
        mut action: ScheduledAction<S>,
        now: u64,
        delay: u64,
    ) -> SchedResult<ActionHandle> {
        action.check_start(delay, self.max_delay)?;
        action.handle().begin()?;
        action.set_interval(delay);
        let handle = action.handle().clone();
        self.insert(now.saturating_add(delay), action);
        Ok(handle)
    }

    /// Largest accepted delay.
    pub fn max_delay(&self) -> u64 {
        self.max_delay
    }

    fn insert(&mut self, due: u64, action: ScheduledAction<S>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((due, seq), action);
    }

    /// Remove every entry due at or before `now`, earliest first.
    fn pop_due(&mut self, now: u64) -> Vec<(u64, ScheduledAction<S>)> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let ((at, _), action) = entry.remove_entry();
            due.push((at, action));
        }
        due
    }

    fn purge_stopped(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, a| !a.handle().is_stopped());
        before - self.entries.len()
    }

    /// Entries in the queue, including stopped ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that can still fire.
    pub fn live(&self) -> usize {
        self.entries
            .values()
            .filter(|a| !a.handle().is_stopped())
            .count()
    }

    /// Due time of the earliest entry.
    pub fn next_due(&self) -> Option<u64> {
        self.entries.keys().next().map(|(due, _)| *due)
    }
}

/// Starts actions on a region's queue relative to the current time.
///
/// Handed to callbacks (inside [`Fire`]) and to jobs posted to a region, so
/// anything running on the region can schedule follow-up work.
pub struct Scheduler<'a, S> {
    queue: &'a mut TimerQueue<S>,
    now: u64,
    region: RegionId,
}

impl<'a, S> Scheduler<'a, S> {
    pub(crate) fn new(queue: &'a mut TimerQueue<S>, now: u64, region: RegionId) -> Self {
        Self { queue, now, region }
    }

    /// Current virtual time of the region.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// The region being scheduled on.
    pub fn region(&self) -> RegionId {
        self.region
    }

    /// A shorter-lived scheduler over the same queue.
    pub fn reborrow(&mut self) -> Scheduler<'_, S> {
        Scheduler {
            queue: &mut *self.queue,
            now: self.now,
            region: self.region,
        }
    }

    /// Start `action` `delay` ms from now.
    pub fn start(&mut self, action: ScheduledAction<S>, delay: u64) -> SchedResult<ActionHandle> {
        self.queue.start(action, self.now, delay)
    }

    /// Actions still able to fire on this region.
    pub fn pending(&self) -> usize {
        self.queue.live()
    }
}

impl<S> fmt::Debug for Scheduler<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("region", &self.region)
            .field("now", &self.now)
            .finish()
    }
}

/// Everything a callback gets for one tick: the region state, a scheduler,
/// and its own handle.
pub struct Fire<'a, S> {
    /// The region's state.
    pub state: &'a mut S,
    /// Scheduler for follow-up actions.
    pub timers: Scheduler<'a, S>,
    handle: &'a ActionHandle,
    due: u64,
}

impl<'a, S> Fire<'a, S> {
    pub(crate) fn new(
        state: &'a mut S,
        handle: &'a ActionHandle,
        due: u64,
        timers: Scheduler<'a, S>,
    ) -> Self {
        Self {
            state,
            timers,
            handle,
            due,
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> u64 {
        self.timers.now()
    }

    /// The time this tick was due. Equal to `now()` unless the region's tick
    /// is coarser than the action's schedule.
    pub fn due(&self) -> u64 {
        self.due
    }

    /// Handle of the running action.
    pub fn handle(&self) -> &ActionHandle {
        self.handle
    }

    /// Owning entity of the running action.
    pub fn owner(&self) -> Option<EntityId> {
        self.handle.owner()
    }

    /// The region being ticked.
    pub fn region(&self) -> RegionId {
        self.timers.region()
    }
}

/// Counters kept by a [`TimerManager`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    /// Passes over the queue.
    pub passes: u64,
    /// Callbacks invoked.
    pub invoked: u64,
    /// Callbacks that returned an error.
    pub failures: u64,
    /// Callbacks that panicked.
    pub panics: u64,
    /// Actions stopped because their owner left the world.
    pub owner_stops: u64,
    /// Callbacks slower than the configured threshold.
    pub slow: u64,
}

/// Runs a region's due actions, strictly one after another.
pub struct TimerManager<S> {
    region: RegionId,
    queue: TimerQueue<S>,
    stats: TimerStats,
    slow_callback: Duration,
}

impl<S> fmt::Debug for TimerManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerManager")
            .field("region", &self.region)
            .field("queue", &self.queue)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<S: Presence> TimerManager<S> {
    /// An empty manager for `region`.
    pub fn new(region: RegionId, config: &SchedConfig) -> Self {
        Self {
            region,
            queue: TimerQueue::new(config.max_delay_ms),
            stats: TimerStats::default(),
            slow_callback: Duration::from_millis(config.slow_callback_ms),
        }
    }

    /// Scheduler over this manager's queue at time `now`.
    pub fn scheduler(&mut self, now: u64) -> Scheduler<'_, S> {
        Scheduler::new(&mut self.queue, now, self.region)
    }

    /// Counters so far.
    pub fn stats(&self) -> TimerStats {
        self.stats
    }

    /// The underlying queue.
    pub fn queue(&self) -> &TimerQueue<S> {
        &self.queue
    }

    /// Actions still able to fire.
    pub fn pending(&self) -> usize {
        self.queue.live()
    }

    /// Execute every action due at or before `now`. Returns how many
    /// callbacks ran.
    ///
    /// The due set is collected up front, so anything started or
    /// rescheduled during the pass waits for the next one. A failing or
    /// panicking callback is logged and the pass continues.
    pub fn run_due(&mut self, state: &mut S, now: u64) -> usize {
        self.stats.passes += 1;
        if self.stats.passes % PURGE_EVERY == 0 {
            let purged = self.queue.purge_stopped();
            if purged > 0 {
                debug!(region = %self.region, purged, "timer_queue_purged");
            }
        }

        let mut fired = 0;
        for (due, mut action) in self.queue.pop_due(now) {
            let handle = action.handle().clone();
            if handle.is_stopped() {
                continue;
            }
            if let Some(owner) = handle.owner()
                && !state.is_present(owner)
            {
                handle.stop();
                self.stats.owner_stops += 1;
                debug!(
                    region = %self.region,
                    action = %handle.id(),
                    label = handle.label(),
                    owner = %owner,
                    "timer_owner_left"
                );
                continue;
            }

            let started = Instant::now();
            let outcome = {
                let mut fire = Fire::new(
                    &mut *state,
                    &handle,
                    due,
                    Scheduler::new(&mut self.queue, now, self.region),
                );
                panic::catch_unwind(AssertUnwindSafe(|| action.fire(&mut fire)))
            };
            fired += 1;
            self.stats.invoked += 1;

            let elapsed = started.elapsed();
            if elapsed > self.slow_callback {
                self.stats.slow += 1;
                warn!(
                    region = %self.region,
                    action = %handle.id(),
                    label = handle.label(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "timer_callback_slow"
                );
            }

            let next = match outcome {
                Ok(Ok(next)) => next,
                Ok(Err(err)) => {
                    self.stats.failures += 1;
                    warn!(
                        region = %self.region,
                        action = %handle.id(),
                        label = handle.label(),
                        owner = %owner_label(&handle),
                        error = %err,
                        "timer_callback_failed"
                    );
                    action.after_failure()
                }
                Err(payload) => {
                    self.stats.panics += 1;
                    error!(
                        region = %self.region,
                        action = %handle.id(),
                        label = handle.label(),
                        owner = %owner_label(&handle),
                        panic = panic_message(payload.as_ref()),
                        "timer_callback_panicked"
                    );
                    action.after_failure()
                }
            };

            match next {
                Next::After(interval) if !handle.is_stopped() => {
                    let next_due = due.saturating_add(interval);
                    if next_due <= now {
                        warn!(
                            region = %self.region,
                            action = %handle.id(),
                            label = handle.label(),
                            next_due,
                            now,
                            "timer_rescheduled_in_past"
                        );
                    }
                    action.set_interval(interval);
                    self.queue.insert(next_due, action);
                }
                _ => {
                    handle.stop();
                }
            }
        }
        fired
    }
}

fn owner_label(handle: &ActionHandle) -> String {
    handle
        .owner()
        .map(|o| o.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ActionError, SchedError};
    use std::collections::HashSet;

    #[derive(Debug, Default)]
    struct Log {
        present: HashSet<EntityId>,
        fired: Vec<(&'static str, u64)>,
    }

    impl Presence for Log {
        fn is_present(&self, id: EntityId) -> bool {
            self.present.contains(&id)
        }
    }

    fn manager() -> TimerManager<Log> {
        TimerManager::new(RegionId(1), &SchedConfig::default())
    }

    fn mark(name: &'static str) -> ScheduledAction<Log> {
        ScheduledAction::<Log>::new(None, name).once(move |fire| {
            let now = fire.now();
            fire.state.fired.push((name, now));
            Ok(())
        })
    }

    #[test]
    fn due_order_then_arrival_order() {
        let mut timers = manager();
        let mut log = Log::default();
        timers.scheduler(0).start(mark("late"), 200).unwrap();
        timers.scheduler(0).start(mark("first"), 100).unwrap();
        timers.scheduler(0).start(mark("second"), 100).unwrap();

        assert_eq!(timers.run_due(&mut log, 99), 0);
        assert_eq!(timers.run_due(&mut log, 250), 3);
        let names: Vec<_> = log.fired.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["first", "second", "late"]);
    }

    #[test]
    fn interval_law() {
        let mut timers = manager();
        let mut log = Log::default();
        let mut replies = vec![500, 500, 0].into_iter();
        let action = ScheduledAction::new(None, "pulse").every(move |fire: &mut Fire<'_, Log>| {
            let due = fire.due();
            fire.state.fired.push(("pulse", due));
            Ok(replies.next().unwrap_or(0))
        });
        let handle = timers.scheduler(0).start(action, 1000).unwrap();

        for now in (0..=4000).step_by(25) {
            timers.run_due(&mut log, now);
        }
        let times: Vec<_> = log.fired.iter().map(|(_, t)| *t).collect();
        assert_eq!(times, vec![1000, 1500, 2000]);
        assert!(handle.is_stopped());
        assert!(timers.queue().is_empty());
    }

    #[test]
    fn stopped_action_never_fires() {
        let mut timers = manager();
        let mut log = Log::default();
        let handle = timers.scheduler(0).start(mark("cancelled"), 50).unwrap();
        assert!(handle.stop());
        assert!(!handle.stop());
        timers.run_due(&mut log, 100);
        assert!(log.fired.is_empty());
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn restarting_stopped_action_rejected() {
        let mut timers = manager();
        let action = mark("cancelled");
        action.handle().stop();
        assert!(matches!(
            timers.scheduler(0).start(action, 10),
            Err(SchedError::AlreadyStopped(_))
        ));
    }

    #[test]
    fn unbound_action_rejected() {
        let mut timers = manager();
        let action: ScheduledAction<Log> = ScheduledAction::new(None, "nothing");
        assert!(matches!(
            timers.scheduler(0).start(action, 10),
            Err(SchedError::NoCallback(_))
        ));
        assert!(timers.queue().is_empty());
    }

    #[test]
    fn absent_owner_stops_before_invocation() {
        let mut timers = manager();
        let mut log = Log::default();
        let owner = EntityId::new();
        let action = ScheduledAction::new(Some(owner), "owned").once(|fire: &mut Fire<'_, Log>| {
            fire.state.fired.push(("owned", 0));
            Ok(())
        });
        let handle = timers.scheduler(0).start(action, 10).unwrap();

        timers.run_due(&mut log, 10);
        assert!(log.fired.is_empty());
        assert!(handle.is_stopped());
        assert_eq!(timers.stats().owner_stops, 1);
    }

    #[test]
    fn failure_is_contained_and_pass_continues() {
        let mut timers = manager();
        let mut log = Log::default();
        let failing = ScheduledAction::new(None, "failing")
            .once(|_: &mut Fire<'_, Log>| Err(ActionError::Failed("no target".into())));
        let panicking = ScheduledAction::new(None, "panicking")
            .once(|_: &mut Fire<'_, Log>| panic!("bad state"));
        timers.scheduler(0).start(failing, 10).unwrap();
        timers.scheduler(0).start(panicking, 10).unwrap();
        timers.scheduler(0).start(mark("after"), 10).unwrap();

        assert_eq!(timers.run_due(&mut log, 10), 3);
        assert_eq!(log.fired, vec![("after", 10)]);
        let stats = timers.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.panics, 1);
    }

    #[test]
    fn failing_interval_retries_at_its_cadence() {
        let mut timers = manager();
        let mut log = Log::default();
        let mut calls = 0;
        let action = ScheduledAction::new(None, "flaky").every(move |fire: &mut Fire<'_, Log>| {
            calls += 1;
            let due = fire.due();
            fire.state.fired.push(("flaky", due));
            if calls == 1 {
                Err(ActionError::Failed("transient".into()))
            } else {
                Ok(0)
            }
        });
        timers.scheduler(0).start(action, 100).unwrap();
        timers.run_due(&mut log, 100);
        timers.run_due(&mut log, 200);
        timers.run_due(&mut log, 300);
        assert_eq!(log.fired, vec![("flaky", 100), ("flaky", 200)]);
    }

    #[test]
    fn panicking_interval_keeps_its_schedule() {
        let mut timers = manager();
        let mut log = Log::default();
        let mut calls = 0;
        let action = ScheduledAction::new(None, "shaky").every(move |fire: &mut Fire<'_, Log>| {
            calls += 1;
            if calls == 1 {
                panic!("first tick");
            }
            let due = fire.due();
            fire.state.fired.push(("shaky", due));
            Ok(100)
        });
        let handle = timers.scheduler(0).start(action, 100).unwrap();
        timers.run_due(&mut log, 100);
        timers.run_due(&mut log, 200);
        timers.run_due(&mut log, 300);
        assert_eq!(log.fired, vec![("shaky", 200), ("shaky", 300)]);
        assert!(handle.is_running());
        assert_eq!(timers.stats().panics, 1);
    }

    #[test]
    fn work_started_during_a_pass_waits_for_the_next() {
        let mut timers = manager();
        let mut log = Log::default();
        let spawner = ScheduledAction::new(None, "spawner").once(|fire: &mut Fire<'_, Log>| {
            fire.timers.start(mark("child"), 1)?;
            Ok(())
        });
        timers.scheduler(0).start(spawner, 10).unwrap();

        assert_eq!(timers.run_due(&mut log, 50), 1);
        assert!(log.fired.is_empty());
        assert_eq!(timers.run_due(&mut log, 50), 1);
        assert_eq!(log.fired, vec![("child", 50)]);
    }

    #[test]
    fn callback_can_stop_itself() {
        let mut timers = manager();
        let mut log = Log::default();
        let action = ScheduledAction::new(None, "self-stop").every(|fire: &mut Fire<'_, Log>| {
            fire.handle().stop();
            Ok(100)
        });
        let handle = timers.scheduler(0).start(action, 10).unwrap();
        timers.run_due(&mut log, 10);
        assert!(handle.is_stopped());
        assert!(timers.queue().is_empty());
    }
}
