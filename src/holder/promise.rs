//! One-shot promises with complete-if-not-already-complete semantics
//!
//! Workers complete promises from any thread; the tick thread composes them
//! with callbacks and never waits on one. The first completion wins and every
//! later completion is a no-op, which is what lets a demotion force-complete a
//! future while a worker is still producing its result.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Callback<T> = Box<dyn FnOnce(&T) + Send>;

enum State<T> {
    Pending(Vec<Callback<T>>),
    Done(T),
}

/// Shared, thread-safe one-shot promise.
pub struct Promise<T> {
    inner: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Create an unresolved promise
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(State::Pending(Vec::new()))),
        }
    }

    /// Create a promise that is already resolved with `value`
    pub fn completed(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State::Done(value))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve with `value` unless already resolved.
    ///
    /// Returns `true` if this call resolved the promise. Callbacks run on the
    /// calling thread after the lock is released.
    pub fn complete(&self, value: T) -> bool {
        let callbacks = {
            let mut state = self.lock();
            if matches!(*state, State::Done(_)) {
                return false;
            }
            match std::mem::replace(&mut *state, State::Done(value.clone())) {
                State::Pending(callbacks) => callbacks,
                State::Done(_) => Vec::new(),
            }
        };
        for callback in callbacks {
            callback(&value);
        }
        true
    }

    /// Current value, if resolved
    pub fn peek(&self) -> Option<T> {
        match &*self.lock() {
            State::Done(value) => Some(value.clone()),
            State::Pending(_) => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.lock(), State::Done(_))
    }

    /// Run `f` with the value once resolved. Runs immediately if it already is.
    pub fn on_complete(&self, f: impl FnOnce(&T) + Send + 'static) {
        let ready = {
            let mut state = self.lock();
            match &mut *state {
                State::Pending(callbacks) => {
                    callbacks.push(Box::new(f));
                    return;
                }
                State::Done(value) => value.clone(),
            }
        };
        f(&ready);
    }

    /// Promise of `f` applied to this promise's value
    pub fn map<U>(&self, f: impl FnOnce(&T) -> U + Send + 'static) -> Promise<U>
    where
        U: Clone + Send + 'static,
    {
        let mapped = Promise::new();
        let target = mapped.clone();
        self.on_complete(move |value| {
            target.complete(f(value));
        });
        mapped
    }

    /// Promise resolved once both inputs are, with `f` of their values
    pub fn combine<U, R>(
        &self,
        other: &Promise<U>,
        f: impl FnOnce(&T, &U) -> R + Send + 'static,
    ) -> Promise<R>
    where
        U: Clone + Send + 'static,
        R: Clone + Send + 'static,
    {
        let combined = Promise::new();
        let target = combined.clone();
        let other = other.clone();
        self.on_complete(move |left| {
            let left = left.clone();
            other.on_complete(move |right| {
                target.complete(f(&left, right));
            });
        });
        combined
    }

    /// Whether both handles share the same underlying promise
    pub fn ptr_eq(a: &Promise<T>, b: &Promise<T>) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let done = match self.inner.lock() {
            Ok(state) => matches!(*state, State::Done(_)),
            Err(poisoned) => matches!(*poisoned.into_inner(), State::Done(_)),
        };
        f.debug_struct("Promise").field("done", &done).finish()
    }
}
