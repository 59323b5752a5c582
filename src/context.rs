//! Per-call cancellation context.
//!
//! A [`Context`] is passed by reference to every client operation. It carries an
//! optional deadline, an optional cancellation flag shared with a [`CancelHandle`],
//! and the parent [`TraceContext`] used to link spans across calls. Contexts are
//! cheap to clone and never stored on a shared client.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::{errors::TransportError, telemetry::TraceContext};

#[derive(Clone, Debug, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<CancelHandle>,
    trace: Option<TraceContext>,
}

impl Context {
    /// An empty context: no deadline, never cancelled, no trace parent.
    pub fn background() -> Self {
        Self::default()
    }

    /// Bound the context by `timeout` from now. An earlier existing deadline wins.
    /// A timeout too large to represent leaves the context unbounded.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Attach a fresh cancellation flag and return the handle that trips it.
    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let handle = CancelHandle::default();
        self.cancel = Some(handle.clone());
        (self, handle)
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancelHandle::is_cancelled)
            .unwrap_or(false)
    }

    /// Fails when the context was cancelled or its deadline has passed.
    pub(crate) fn check(&self) -> Result<(), TransportError> {
        if self.is_cancelled() {
            return Err(TransportError::cancelled());
        }
        if matches!(self.remaining(), Some(left) if left.is_zero()) {
            return Err(TransportError::deadline_exceeded());
        }
        Ok(())
    }
}

/// Trips the cancellation flag of every context cloned from the one that created it.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportErrorKind;

    #[test]
    fn background_context_is_open() {
        let ctx = Context::background();
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(!ctx.is_cancelled());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn earlier_deadline_wins() {
        let soon = Instant::now() + Duration::from_millis(10);
        let ctx = Context::background()
            .with_deadline(soon)
            .with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(soon));
    }

    #[test]
    fn unrepresentable_timeout_leaves_context_unbounded() {
        let ctx = Context::background().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(ctx.check().is_ok());

        let soon = Instant::now() + Duration::from_secs(1);
        let ctx = Context::background()
            .with_deadline(soon)
            .with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), Some(soon));
    }

    #[test]
    fn cancel_is_seen_by_clones() {
        let (ctx, handle) = Context::background().with_cancel();
        let copy = ctx.clone();
        handle.cancel();
        assert!(ctx.is_cancelled());
        let err = copy.check().unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Cancelled);
    }

    #[test]
    fn expired_deadline_fails_check() {
        let ctx = Context::background().with_deadline(Instant::now());
        let err = ctx.check().unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Timeout);
    }
}
