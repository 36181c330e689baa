//! The Deferred Handle: a single-shot result slot with `on_result` and
//! `on_exception` sinks (spec.md §4.2).
//!
//! Both engines hand one of these back from every asynchronous request.
//! Fulfilment happens synchronously, on whatever thread drives the engine
//! (spec.md §5) — there is no executor or waker involved. Sink exceptions
//! (a panic-free `Err` from the caller's own glue code) are not possible to
//! catch generically here; it is the embedder's job to keep its sinks
//! infallible or to route failures through its own fault sink before
//! calling back in, matching the contract in spec.md §4.2.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

struct Inner<T, E> {
    outcome: Option<Result<T, E>>,
    on_result: Option<Box<dyn FnOnce(&T)>>,
    on_exception: Option<Box<dyn FnOnce(&E)>>,
}

/// A single-shot result slot. Cloning a handle shares the same underlying
/// slot: fulfilling any clone fulfils all of them, and a sink attached
/// through any clone is the one that will fire.
pub struct DeferredHandle<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for DeferredHandle<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for DeferredHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredHandle")
            .field("fulfilled", &self.is_fulfilled())
            .finish()
    }
}

impl<T, E> Default for DeferredHandle<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Raised when a handle that was already fulfilled is fulfilled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyFulfilled;

impl fmt::Display for AlreadyFulfilled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle was already fulfilled")
    }
}
impl std::error::Error for AlreadyFulfilled {}

impl<T, E> DeferredHandle<T, E> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                outcome: None,
                on_result: None,
                on_exception: None,
            })),
        }
    }

    /// Fulfil the handle with a success value. The `on_result` sink, if one
    /// was already attached, fires synchronously before this call returns.
    pub fn set_result(&self, value: T) -> Result<(), AlreadyFulfilled> {
        let sink = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return Err(AlreadyFulfilled);
            }
            inner.outcome = Some(Ok(value));
            inner.on_exception = None;
            inner.on_result.take()
        };
        if let Some(sink) = sink {
            let inner = self.inner.borrow();
            if let Some(Ok(v)) = &inner.outcome {
                sink(v);
            }
        }
        Ok(())
    }

    /// Fulfil the handle with a failure. The `on_exception` sink, if one
    /// was already attached, fires synchronously before this call returns.
    pub fn set_exception(&self, error: E) -> Result<(), AlreadyFulfilled> {
        let sink = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return Err(AlreadyFulfilled);
            }
            inner.outcome = Some(Err(error));
            inner.on_result = None;
            inner.on_exception.take()
        };
        if let Some(sink) = sink {
            let inner = self.inner.borrow();
            if let Some(Err(e)) = &inner.outcome {
                sink(e);
            }
        }
        Ok(())
    }

    /// Attach a success sink. If the handle is already fulfilled with a
    /// success, `f` fires immediately, synchronously, within this call.
    pub fn on_result(&self, f: impl FnOnce(&T) + 'static) {
        // Fulfilled-with-success: call back immediately, in its own borrow
        // scope, so the later not-yet-fulfilled branch below never runs.
        {
            let inner = self.inner.borrow();
            if let Some(Ok(v)) = &inner.outcome {
                return f(v);
            }
            if inner.outcome.is_some() {
                // Fulfilled with a failure: on_result never fires.
                return;
            }
        }
        self.inner.borrow_mut().on_result = Some(Box::new(f));
    }

    /// Attach a failure sink. If the handle is already fulfilled with a
    /// failure, `f` fires immediately, synchronously, within this call.
    pub fn on_exception(&self, f: impl FnOnce(&E) + 'static) {
        {
            let inner = self.inner.borrow();
            if let Some(Err(e)) = &inner.outcome {
                return f(e);
            }
            if inner.outcome.is_some() {
                // Fulfilled with a success: on_exception never fires.
                return;
            }
        }
        self.inner.borrow_mut().on_exception = Some(Box::new(f));
    }

    pub fn is_fulfilled(&self) -> bool {
        self.inner.borrow().outcome.is_some()
    }
}

impl<T: Clone, E: Clone> DeferredHandle<T, E> {
    /// Clone out the outcome, if fulfilled.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        self.inner.borrow().outcome.clone()
    }
}

impl<T, E> DeferredHandle<T, E> {
    /// Take the outcome out of the slot, leaving it empty, without
    /// requiring `T`/`E: Clone`. Mainly useful for inspecting a handle
    /// (in tests, or one-shot embedder glue) that has no sink attached.
    pub fn take_outcome(&self) -> Option<Result<T, E>> {
        self.inner.borrow_mut().outcome.take()
    }
}
