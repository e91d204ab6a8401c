//! Spin-wait mutual exclusion for very short critical sections.
//!
//! [`SpinLock`] is a bare flag with `enter`/`exit`; [`SpinMutex`] wraps a
//! value behind one and releases it through an RAII guard. Neither allocates,
//! so both can live by value inside larger structures.
//!
//! The lock is not re-entrant: entering twice from the same owner without an
//! intervening exit deadlocks. Never hold it across anything that can block.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::fmt;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn single_cpu() -> bool {
    static SINGLE: OnceLock<bool> = OnceLock::new();
    *SINGLE.get_or_init(|| {
        thread::available_parallelism()
            .map(|n| n.get() == 1)
            .unwrap_or(false)
    })
}

/// One wait step. Spinning on one CPU only burns the slice the owner needs.
#[inline]
fn relax() {
    if single_cpu() {
        thread::yield_now();
    } else {
        hint::spin_loop();
    }
}

/// A test-and-test-and-set spin lock.
#[derive(Debug, Default)]
pub struct SpinLock {
    owned: AtomicBool,
}

impl SpinLock {
    /// A free lock.
    pub const fn new() -> Self {
        Self {
            owned: AtomicBool::new(false),
        }
    }

    /// Block until the calling thread owns the lock.
    pub fn enter(&self) {
        loop {
            if self.try_enter() {
                return;
            }
            // Read-only wait keeps the cache line shared until it frees up.
            while self.owned.load(Ordering::Relaxed) {
                relax();
            }
        }
    }

    /// Claim the lock if it is free. Never waits.
    pub fn try_enter(&self) -> bool {
        self.owned
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock. Must only be called by the current owner.
    pub fn exit(&self) {
        self.owned.store(false, Ordering::Release);
    }

    /// True while some thread owns the lock.
    pub fn is_held(&self) -> bool {
        self.owned.load(Ordering::Relaxed)
    }
}

/// A value guarded by a [`SpinLock`].
pub struct SpinMutex<T> {
    lock: SpinLock,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is serialized by `lock`; a guard only exists while
// the lock is held, so `&mut T` is never aliased across threads.
unsafe impl<T: Send> Send for SpinMutex<T> {}
// SAFETY: see above.
unsafe impl<T: Send> Sync for SpinMutex<T> {}

impl<T> SpinMutex<T> {
    /// Wrap a value.
    pub const fn new(value: T) -> Self {
        Self {
            lock: SpinLock::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Spin until the value is ours.
    pub fn lock(&self) -> SpinGuard<'_, T> {
        self.lock.enter();
        SpinGuard { mutex: self }
    }

    /// Take the value if nobody holds it.
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        self.lock.try_enter().then_some(SpinGuard { mutex: self })
    }

    /// Direct access through a unique borrow; no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Unwrap the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for SpinMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for SpinMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinMutex")
            .field("held", &self.lock.is_held())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a [`SpinMutex`] value; releases the lock on drop.
pub struct SpinGuard<'a, T> {
    mutex: &'a SpinMutex<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held, and `&mut self` makes
        // this the only live borrow.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.lock.exit();
    }
}
