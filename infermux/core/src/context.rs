//! Call Context
//!
//! Cancellation and deadline propagation for a single routing call. A
//! [`CallContext`] travels from the front door (HTTP handler or one-shot
//! command) through the router into [`Provider::run`](crate::provider::Provider::run),
//! so a provider can stop work as soon as the caller gives up.
//!
//! # Semantics
//!
//! - Cancellation flows downward: every clone and every derived context
//!   observes its ancestors' [`CancelHandle`]s. A child created with
//!   [`CallContext::child_with_cancel`] can also be cancelled on its own.
//! - Deadlines only tighten: deriving a child with a later deadline than its
//!   parent keeps the parent's.
//! - When both a cancel and an expired deadline are visible, the context
//!   reports [`Interrupt::Canceled`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a call stopped before completing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Interrupt {
    /// The caller cancelled the call
    #[error("context canceled")]
    Canceled,
    /// The call's deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation and deadline carried by one call
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    /// Cancel signals, root first (empty = can never be cancelled)
    cancel: Vec<watch::Receiver<bool>>,
    /// Absolute deadline
    deadline: Option<Instant>,
}

/// Cancels every context derived from the pair it was created with
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel the associated contexts. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether `cancel` has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Cancel when the returned guard is dropped
    #[must_use]
    pub fn drop_guard(self) -> CancelGuard {
        CancelGuard { handle: self }
    }
}

/// Cancels its handle on drop
#[derive(Debug)]
pub struct CancelGuard {
    handle: CancelHandle,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

impl CallContext {
    /// A context that is never cancelled and has no deadline
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A cancellable root context plus the handle that cancels it
    #[must_use]
    pub fn with_cancel() -> (Self, CancelHandle) {
        Self::background().child_with_cancel()
    }

    /// Derive a child that can additionally be cancelled through the returned handle
    ///
    /// Cancelling the handle does not affect the parent.
    #[must_use]
    pub fn child_with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut cancel = self.cancel.clone();
        cancel.push(rx);
        (
            Self {
                cancel,
                deadline: self.deadline,
            },
            CancelHandle { tx: Arc::new(tx) },
        )
    }

    /// Derive a child that expires `timeout` from now
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child that expires at `deadline` (or the parent's, if earlier)
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    /// The effective deadline, if any
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the cancel signal has fired
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.iter().any(|rx| *rx.borrow())
    }

    /// Non-blocking check: why the context is done, if it is
    #[must_use]
    pub fn interruption(&self) -> Option<Interrupt> {
        if self.is_cancelled() {
            return Some(Interrupt::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupt::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the context is cancelled or its deadline passes.
    ///
    /// Never resolves for a background context.
    pub async fn done(&self) -> Interrupt {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.cancelled() => Interrupt::Canceled,
                    () = tokio::time::sleep_until(deadline) => {
                        // A cancel that raced the timer still wins
                        if self.is_cancelled() {
                            Interrupt::Canceled
                        } else {
                            Interrupt::DeadlineExceeded
                        }
                    }
                }
            }
            None => {
                self.cancelled().await;
                Interrupt::Canceled
            }
        }
    }

    /// Resolve when any cancel signal fires
    async fn cancelled(&self) {
        any_cancelled(&self.cancel).await;
    }
}

fn any_cancelled(
    signals: &[watch::Receiver<bool>],
) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
    Box::pin(async move {
        match signals {
            [] => std::future::pending().await,
            [only] => signal_cancelled(only.clone()).await,
            [first, rest @ ..] => {
                tokio::select! {
                    () = signal_cancelled(first.clone()) => {}
                    () = any_cancelled(rest) => {}
                }
            }
        }
    })
}

async fn signal_cancelled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Handle dropped without cancelling: this signal can no longer fire
            return std::future::pending().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_never_interrupted() {
        let ctx = CallContext::background();
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_none());
        assert_eq!(ctx.interruption(), None);
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_clones_and_children() {
        let (ctx, handle) = CallContext::with_cancel();
        let child = ctx.with_timeout(Duration::from_secs(60));
        let clone = ctx.clone();

        handle.cancel();

        assert!(handle.is_cancelled());
        assert_eq!(ctx.interruption(), Some(Interrupt::Canceled));
        assert_eq!(clone.interruption(), Some(Interrupt::Canceled));
        assert_eq!(child.done().await, Interrupt::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let ctx = CallContext::background().with_timeout(Duration::from_millis(50));
        assert_eq!(ctx.interruption(), None);

        let reason = ctx.done().await;
        assert_eq!(reason, Interrupt::DeadlineExceeded);
        assert_eq!(ctx.interruption(), Some(Interrupt::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_never_extends_parent() {
        let parent = CallContext::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.with_timeout(Duration::from_millis(1));
        assert!(tighter.deadline() < parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_means_never_cancelled() {
        let (ctx, handle) = CallContext::with_cancel();
        drop(handle);

        let ctx = ctx.with_timeout(Duration::from_millis(20));
        assert_eq!(ctx.done().await, Interrupt::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_child_cancel_is_local() {
        let (parent, parent_handle) = CallContext::with_cancel();
        let (child, child_handle) = parent.child_with_cancel();

        child_handle.cancel();
        assert_eq!(child.done().await, Interrupt::Canceled);
        assert!(!parent.is_cancelled());

        let (child, _child_handle) = parent.child_with_cancel();
        parent_handle.cancel();
        assert_eq!(child.done().await, Interrupt::Canceled);
    }

    #[test]
    fn test_drop_guard_cancels() {
        let (ctx, handle) = CallContext::with_cancel();
        let guard = handle.drop_guard();
        assert!(!ctx.is_cancelled());
        drop(guard);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_cancel_wins_over_expired_deadline() {
        let (ctx, handle) = CallContext::with_cancel();
        let ctx = ctx.with_deadline(Instant::now());
        handle.cancel();
        assert_eq!(ctx.interruption(), Some(Interrupt::Canceled));
    }
}
