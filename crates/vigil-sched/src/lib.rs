//! Scheduling for Vigil: per-region virtual clocks, timer queues, and the
//! worker threads that drive them.
//!
//! A [`Region`] owns its state and runs every due [`ScheduledAction`] one at a
//! time on its own clock. Other threads reach it through a [`RegionRemote`]
//! and may stop any action through its [`ActionHandle`].

/// Scheduled actions, their handles, and lifecycle.
pub mod action;
/// Owner-bound action builders and scheduling shortcuts.
pub mod binder;
/// The per-region virtual clock.
pub mod clock;
/// Scheduler configuration.
pub mod config;
/// Error types used throughout the crate.
pub mod error;
/// Regions, cross-thread remotes, and worker threads.
pub mod region;
/// Busy-wait locks for very short critical sections.
pub mod spin;
/// Timer queue and the manager that runs due actions.
pub mod timer;

/// Re-export action types.
pub use action::{ActionHandle, ActionId, ActionState, Next, ScheduledAction};
/// Re-export binder types.
pub use binder::EntityTimer;
/// Re-export the clock.
pub use clock::RegionClock;
/// Re-export configuration.
pub use config::SchedConfig;
/// Re-export error types.
pub use error::{ActionError, ActionResult, SchedError, SchedResult};
/// Re-export region types.
pub use region::{Region, RegionRemote, RegionWorker};
/// Re-export lock types.
pub use spin::{SpinGuard, SpinLock, SpinMutex};
/// Re-export timer types.
pub use timer::{Fire, Presence, Scheduler, TimerManager, TimerQueue, TimerStats};
