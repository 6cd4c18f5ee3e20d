//! Reusable request/response instances.
//!
//! An [`ObjectPool`] hands out instances wrapped in a [`Pooled`] guard. The
//! guard resets the instance and returns it to the pool when dropped, so the
//! instance is released on every exit path, including early returns and
//! panics. Ownership guarantees a single active user per instance.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

/// Types that can be cleared for reuse.
pub trait Reset {
    /// Return the value to the state of a freshly constructed instance.
    fn reset(&mut self);
}

/// A bounded pool of idle instances.
#[derive(Debug)]
pub struct ObjectPool<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
}

impl<T: Reset + Default> ObjectPool<T> {
    pub fn new(max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        })
    }

    /// Take an idle instance, or build a new one when the pool is empty.
    pub fn acquire(self: &Arc<Self>) -> Pooled<T> {
        let value = self.idle.lock().pop().unwrap_or_default();
        Pooled {
            value: Some(value),
            pool: Arc::clone(self),
        }
    }

    /// Number of instances waiting to be reused.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, mut value: T) {
        value.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(value);
        }
    }
}

/// Scoped handle to a pooled instance.
#[derive(Debug)]
pub struct Pooled<T: Reset + Default> {
    value: Option<T>,
    pool: Arc<ObjectPool<T>>,
}

impl<T: Reset + Default> Pooled<T> {
    /// Detach the instance from the pool. It will not be recycled.
    pub fn into_inner(mut self) -> T {
        self.value.take().unwrap_or_default()
    }
}

impl<T: Reset + Default> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `into_inner` and `drop` take the value, both consume the guard.
        self.value.as_ref().expect("pooled value present until drop")
    }
}

impl<T: Reset + Default> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pooled value present until drop")
    }
}

impl<T: Reset + Default> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}
