#![forbid(unsafe_code)]

//! One-shot, multi-observer resolution signal.
//!
//! A `Signal<T>` resolves at most once and can be awaited by any number of
//! tasks, before or after resolution. Built from `OnceLock` + `Notify`; the
//! wait loop enables the `Notified` future *before* re-checking the cell, so a
//! resolution racing with a new waiter can never be missed.

use std::sync::{Arc, OnceLock};

use tokio::sync::Notify;

use crate::state::Terminal;

#[derive(Debug)]
struct Inner<T> {
    cell: OnceLock<T>,
    notify: Notify,
}

/// Single-resolution broadcast cell. Clones share the same resolution.
#[derive(Debug)]
pub(crate) struct Signal<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Signal<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: OnceLock::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Resolve the signal. Returns true if this call won; later calls are
    /// no-ops and return false.
    pub(crate) fn resolve(&self, value: T) -> bool {
        let won = self.inner.cell.set(value).is_ok();
        self.inner.notify.notify_waiters();
        won
    }

    /// The resolved value, if resolution already happened.
    pub(crate) fn get(&self) -> Option<T> {
        self.inner.cell.get().cloned()
    }

    /// Wait for resolution. Resolves immediately if it already happened.
    pub(crate) async fn wait(&self) -> T {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register as a waiter before checking, so a resolve between the
            // check and the await still wakes us.
            notified.as_mut().enable();
            if let Some(value) = self.inner.cell.get() {
                return value.clone();
            }
            notified.await;
        }
    }
}

/// Awaitable handle to a reader's termination.
///
/// Resolves exactly once, to the terminal state, and only after the descriptor
/// has been closed. Any number of holders may wait concurrently, and the handle
/// stays valid after the reader itself is dropped.
#[derive(Debug, Clone)]
pub struct Completion {
    signal: Signal<Terminal>,
}

impl Completion {
    pub(crate) fn new(signal: Signal<Terminal>) -> Self {
        Self { signal }
    }

    /// Wait for the reader to terminate.
    pub async fn wait(&self) -> Terminal {
        self.signal.wait().await
    }

    /// Point-in-time check without waiting.
    pub fn get(&self) -> Option<Terminal> {
        self.signal.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_exactly_once() {
        let signal: Signal<u32> = Signal::new();
        assert!(signal.resolve(7));
        assert!(!signal.resolve(8));
        assert_eq!(signal.get(), Some(7));
        assert_eq!(signal.wait().await, 7);
    }

    #[tokio::test]
    async fn wakes_all_pending_waiters() {
        let signal: Signal<&'static str> = Signal::new();
        let mut waiters = Vec::new();
        for _ in 0..8 {
            let signal = signal.clone();
            waiters.push(tokio::spawn(async move { signal.wait().await }));
        }
        tokio::task::yield_now().await;
        signal.resolve("done");
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), "done");
        }
    }

    #[tokio::test]
    async fn wait_after_resolution_is_immediate() {
        let signal: Signal<u8> = Signal::new();
        signal.resolve(1);
        let late = signal.clone();
        assert_eq!(late.wait().await, 1);
    }
}
