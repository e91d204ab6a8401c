use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use vigil_core::EntityId;

use crate::error::{ActionResult, SchedError, SchedResult};
use crate::timer::Fire;

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a scheduled action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl ActionId {
    fn next() -> Self {
        Self(NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a scheduled action. Transitions only move forward:
/// `Created -> Running -> Stopped`, or straight from `Created` to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    /// Built but not started.
    Created,
    /// Queued or executing.
    Running,
    /// Finished or cancelled; the callback never runs again.
    Stopped,
}

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

impl ActionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            CREATED => Self::Created,
            RUNNING => Self::Running,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug)]
struct Shared {
    id: ActionId,
    state: AtomicU8,
    owner: Option<EntityId>,
    label: Cow<'static, str>,
}

/// Shared handle to a scheduled action.
///
/// Cheap to clone and safe to use from any thread. The handle holds the
/// owner's [`EntityId`], never the entity itself.
#[derive(Debug, Clone)]
pub struct ActionHandle {
    shared: Arc<Shared>,
}

impl ActionHandle {
    fn new(owner: Option<EntityId>, label: Cow<'static, str>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: ActionId::next(),
                state: AtomicU8::new(CREATED),
                owner,
                label,
            }),
        }
    }

    /// Identity of the action.
    pub fn id(&self) -> ActionId {
        self.shared.id
    }

    /// Owning entity, if any.
    pub fn owner(&self) -> Option<EntityId> {
        self.shared.owner
    }

    /// Short description used in logs.
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ActionState {
        ActionState::from_raw(self.shared.state.load(Ordering::Acquire))
    }

    /// True while queued or executing.
    pub fn is_running(&self) -> bool {
        self.state() == ActionState::Running
    }

    /// True once the action can never fire again.
    pub fn is_stopped(&self) -> bool {
        self.state() == ActionState::Stopped
    }

    /// Stop the action. Safe from any thread and idempotent; returns true only
    /// for the call that actually stopped it. A tick already executing runs to
    /// completion but is not rescheduled.
    pub fn stop(&self) -> bool {
        self.shared.state.swap(STOPPED, Ordering::AcqRel) != STOPPED
    }

    pub(crate) fn begin(&self) -> SchedResult<()> {
        match self.shared.state.compare_exchange(
            CREATED,
            RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(RUNNING) => Err(SchedError::AlreadyRunning(self.id())),
            Err(_) => Err(SchedError::AlreadyStopped(self.id())),
        }
    }
}

impl PartialEq for ActionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ActionHandle {}

/// What an action wants after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Transition to `Stopped`.
    Stop,
    /// Run again this many milliseconds after the tick's due time.
    After(u64),
}

impl Next {
    /// Interpret a callback's returned delay: zero or negative stops.
    pub fn from_delay(delay: i64) -> Self {
        if delay <= 0 {
            Self::Stop
        } else {
            Self::After(delay as u64)
        }
    }
}

type OnceFn<S> = Box<dyn FnOnce(&mut Fire<'_, S>) -> ActionResult<()> + Send>;
type IntervalFn<S> = Box<dyn FnMut(&mut Fire<'_, S>) -> ActionResult<i64> + Send>;

enum Callback<S> {
    Once(OnceFn<S>),
    Interval(IntervalFn<S>),
}

/// A callback due at a point on a region's virtual clock.
///
/// Built unbound, given a callback with [`once`](Self::once) or
/// [`every`](Self::every), then started on a region's timer queue. The state
/// type `S` is whatever the region hands to callbacks.
pub struct ScheduledAction<S> {
    handle: ActionHandle,
    interval: u64,
    callback: Option<Callback<S>>,
}

impl<S> fmt::Debug for ScheduledAction<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledAction")
            .field("id", &self.handle.id())
            .field("label", &self.handle.label())
            .field("state", &self.handle.state())
            .field("interval", &self.interval)
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl<S> ScheduledAction<S> {
    /// An unbound action, optionally owned by an entity.
    pub fn new(owner: Option<EntityId>, label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            handle: ActionHandle::new(owner, label.into()),
            interval: 0,
            callback: None,
        }
    }

    /// Bind a fire-once callback.
    pub fn once<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut Fire<'_, S>) -> ActionResult<()> + Send + 'static,
    {
        self.callback = Some(Callback::Once(Box::new(f)));
        self
    }

    /// Bind a self-interval callback. The returned value is the next delay;
    /// zero or negative stops the action.
    pub fn every<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut Fire<'_, S>) -> ActionResult<i64> + Send + 'static,
    {
        self.callback = Some(Callback::Interval(Box::new(f)));
        self
    }

    /// Handle for stopping or inspecting the action later.
    pub fn handle(&self) -> &ActionHandle {
        &self.handle
    }

    /// Identity of the action.
    pub fn id(&self) -> ActionId {
        self.handle.id()
    }

    /// Owning entity, if any.
    pub fn owner(&self) -> Option<EntityId> {
        self.handle.owner()
    }

    /// True once a callback is bound.
    pub fn is_bound(&self) -> bool {
        self.callback.is_some()
    }

    /// True for self-interval actions.
    pub fn is_repeating(&self) -> bool {
        matches!(self.callback, Some(Callback::Interval(_)))
    }

    /// The delay used for the most recent scheduling.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub(crate) fn set_interval(&mut self, interval: u64) {
        self.interval = interval;
    }

    /// Run one due tick and report what should happen next.
    ///
    /// This is the whole state transition of an action; the timer queue only
    /// decides *when* to call it.
    /// A repeating callback is called in place, so it survives a panic and
    /// can run again.
    pub fn fire(&mut self, fire: &mut Fire<'_, S>) -> ActionResult<Next> {
        if let Some(Callback::Interval(f)) = self.callback.as_mut() {
            return f(fire).map(Next::from_delay);
        }
        match self.callback.take() {
            Some(Callback::Once(f)) => f(fire).map(|()| Next::Stop),
            _ => Ok(Next::Stop),
        }
    }

    /// Follow-up after a failed or panicked tick: a repeating action keeps its
    /// cadence, anything else stops.
    pub(crate) fn after_failure(&self) -> Next {
        if self.is_repeating() {
            Next::After(self.interval)
        } else {
            Next::Stop
        }
    }

    /// Validate a start request without touching the state machine.
    pub(crate) fn check_start(&self, delay: u64, max_delay: u64) -> SchedResult<()> {
        let id = self.id();
        match self.handle.state() {
            ActionState::Stopped => return Err(SchedError::AlreadyStopped(id)),
            ActionState::Running => return Err(SchedError::AlreadyRunning(id)),
            ActionState::Created => {}
        }
        if !self.is_bound() {
            return Err(SchedError::NoCallback(id));
        }
        if delay == 0 || delay > max_delay {
            return Err(SchedError::InvalidDelay {
                action: id,
                delay,
                max: max_delay,
            });
        }
        Ok(())
    }
}
