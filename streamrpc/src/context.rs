//! Per-call context: deadline, cancellation and metadata.
//!
//! A [`CallContext`] is created when a call is admitted and handed to the
//! handler alongside its messages. Cancellation is a one-way latch: peer
//! disconnects, an elapsed deadline and local [`cancel`](CallContext::cancel)
//! requests all trip the same latch, and the first reason wins.

pub(crate) mod config;
pub mod limit;
pub mod metadata;
pub mod timeout;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;

pub(crate) use config::ServerConfig;
pub use limit::MessageLimits;
pub use metadata::Metadata;
pub use timeout::{TIMEOUT_MS_HEADER, compute_effective_timeout, parse_timeout, parse_timeout_ms};

/// Why a call was cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The call's deadline elapsed.
    Deadline,
    /// The remote peer went away before the call finished.
    PeerDisconnected,
    /// Cancelled by the local side (server shutdown, explicit request).
    Local,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Deadline => write!(f, "deadline exceeded"),
            CancelReason::PeerDisconnected => write!(f, "peer disconnected"),
            CancelReason::Local => write!(f, "cancelled locally"),
        }
    }
}

/// Deadline, cancellation latch and metadata of one call.
///
/// Cheap to clone; all clones observe the same latch.
#[derive(Clone, Debug)]
pub struct CallContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    method: String,
    deadline: Option<Instant>,
    token: CancellationToken,
    reason: OnceLock<CancelReason>,
    metadata: Metadata,
}

impl CallContext {
    /// Create a context for `method`. The deadline cannot change afterwards.
    pub fn new<S: Into<String>>(method: S, deadline: Option<Instant>, metadata: Metadata) -> Self {
        Self {
            inner: Arc::new(Inner {
                method: method.into(),
                deadline,
                token: CancellationToken::new(),
                reason: OnceLock::new(),
                metadata,
            }),
        }
    }

    /// Create a context whose deadline is `timeout` from now.
    pub fn with_timeout<S: Into<String>>(
        method: S,
        timeout: Option<Duration>,
        metadata: Metadata,
    ) -> Self {
        let deadline = timeout.map(|t| Instant::now() + t);
        Self::new(method, deadline, metadata)
    }

    /// Name of the method this call targets.
    pub fn method(&self) -> &str {
        &self.inner.method
    }

    /// Absolute expiry of the call, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline. `Some(ZERO)` once it has passed.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Call metadata sent by the caller.
    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    /// Trip the cancellation latch. Idempotent; only the first reason is kept.
    pub fn cancel(&self, reason: CancelReason) {
        if self.inner.reason.set(reason).is_ok() {
            tracing::trace!(method = %self.inner.method, %reason, "call cancelled");
        }
        self.inner.token.cancel();
    }

    /// Whether the latch has been tripped.
    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// The reason the call was cancelled, if it was.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().copied()
    }

    /// Resolves once the call is cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// Fail with the cancellation if the latch is tripped.
    pub fn check(&self) -> Result<(), ChannelError> {
        match self.cancel_reason() {
            Some(reason) => Err(ChannelError::Cancelled(reason)),
            None => Ok(()),
        }
    }

    /// Spawn the watchdog that cancels the call when its deadline elapses.
    ///
    /// Returns `None` when the call has no deadline. The watchdog stops when
    /// the returned guard is dropped.
    pub(crate) fn arm_deadline(&self) -> Option<AbortOnDrop> {
        let deadline = self.inner.deadline?;
        let ctx = self.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => ctx.cancel(CancelReason::Deadline),
                _ = ctx.cancelled() => {}
            }
        });
        Some(AbortOnDrop(handle))
    }
}

/// Aborts a background task (deadline watchdog, inbound relay) when dropped.
pub(crate) struct AbortOnDrop(pub(crate) JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
