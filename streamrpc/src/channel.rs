//! Typed, ordered, closable message channels.
//!
//! A channel carries messages in one direction of one call. The producer
//! holds a [`MessageSender`], the consumer a [`MessageReceiver`]. The
//! producer ends the stream by pushing a terminal marker with
//! [`close`](MessageSender::close); dropping the sender without closing is an
//! implicit end-of-stream.
//!
//! Both ends are bound to the call's [`CallContext`]: once the call is
//! cancelled every operation on either end fails with
//! [`ChannelError::Cancelled`], and a consumer suspended in
//! [`next`](MessageReceiver::next) is woken up.
//!
//! # Example
//!
//! ```
//! use streamrpc::{CallContext, Metadata, channel};
//! use streamrpc_core::Status;
//!
//! # tokio_test_block_on(async {
//! let ctx = CallContext::new("calc.Calculator/FindMaximum", None, Metadata::new());
//! let (mut tx, mut rx) = channel::<i32>(&ctx);
//!
//! tx.push(1).unwrap();
//! tx.push(5).unwrap();
//! tx.close(Status::ok()).unwrap();
//! assert!(tx.push(6).is_err());
//!
//! assert_eq!(rx.next().await, Ok(Some(1)));
//! assert_eq!(rx.next().await, Ok(Some(5)));
//! assert_eq!(rx.next().await, Ok(None));
//! assert_eq!(rx.next().await, Ok(None));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use futures::Stream;
use streamrpc_core::Status;
use tokio::sync::mpsc;

use crate::context::{CallContext, CancelReason};
use crate::error::ChannelError;

enum Signal<T> {
    Message(T),
    Close(Status),
}

/// Create a channel whose operations are bound to `ctx`.
pub fn channel<T>(ctx: &CallContext) -> (MessageSender<T>, MessageReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MessageSender {
            tx,
            ctx: ctx.clone(),
            closed: false,
        },
        MessageReceiver {
            rx,
            ctx: ctx.clone(),
            finished: false,
        },
    )
}

/// Write end of a message channel.
pub struct MessageSender<T> {
    tx: mpsc::UnboundedSender<Signal<T>>,
    ctx: CallContext,
    closed: bool,
}

impl<T> MessageSender<T> {
    /// Append a message to the tail of the channel.
    ///
    /// Fails with [`ChannelError::Closed`] after [`close`](Self::close) or
    /// once the receiver is gone, and with [`ChannelError::Cancelled`] once
    /// the call is cancelled.
    pub fn push(&mut self, message: T) -> Result<(), ChannelError> {
        self.ctx.check()?;
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.tx
            .send(Signal::Message(message))
            .map_err(|_| ChannelError::Closed)
    }

    /// Push the terminal marker carrying `status`.
    ///
    /// `Status::ok()` is a normal end-of-stream; any other status is reported
    /// to the consumer as [`ChannelError::Terminated`].
    pub fn close(&mut self, status: Status) -> Result<(), ChannelError> {
        self.ctx.check()?;
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.closed = true;
        self.tx
            .send(Signal::Close(status))
            .map_err(|_| ChannelError::Closed)
    }

    /// Whether the terminal marker has been pushed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The context of the call this channel belongs to.
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }
}

impl<T> std::fmt::Debug for MessageSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSender")
            .field("method", &self.ctx.method())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Read end of a message channel.
pub struct MessageReceiver<T> {
    rx: mpsc::UnboundedReceiver<Signal<T>>,
    ctx: CallContext,
    finished: bool,
}

impl<T> MessageReceiver<T> {
    /// Take the message at the head of the channel.
    ///
    /// - `Ok(Some(msg))`: the next message, in send order.
    /// - `Ok(None)`: end-of-stream. Every later call returns `Ok(None)`
    ///   immediately.
    /// - `Err(ChannelError::Terminated(status))`: the producer closed the
    ///   channel with an error; reported once, then `Ok(None)`.
    /// - `Err(ChannelError::Cancelled(_))`: the call was cancelled, including
    ///   while this call was suspended.
    pub async fn next(&mut self) -> Result<Option<T>, ChannelError> {
        self.ctx.check()?;
        if self.finished {
            return Ok(None);
        }

        let signal = tokio::select! {
            biased;
            _ = self.ctx.cancelled() => {
                return Err(self
                    .ctx
                    .check()
                    .err()
                    .unwrap_or(ChannelError::Cancelled(CancelReason::Local)));
            }
            signal = self.rx.recv() => signal,
        };

        match signal {
            Some(Signal::Message(message)) => Ok(Some(message)),
            Some(Signal::Close(status)) => {
                self.finished = true;
                if status.is_ok() {
                    Ok(None)
                } else {
                    Err(ChannelError::Terminated(status))
                }
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    /// Whether the terminal marker has been observed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The context of the call this channel belongs to.
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Adapt the receiver into a [`Stream`].
    ///
    /// The stream ends at end-of-stream and after yielding the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, ChannelError>> + Send
    where
        T: Send + 'static,
    {
        futures::stream::unfold(Some(self), |state| async move {
            let mut rx = state?;
            match rx.next().await {
                Ok(Some(message)) => Some((Ok(message), Some(rx))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl<T> std::fmt::Debug for MessageReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageReceiver")
            .field("method", &self.ctx.method())
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Metadata;
    use futures::StreamExt;
    use std::time::Duration;

    fn ctx() -> CallContext {
        CallContext::new("test.Service/Method", None, Metadata::new())
    }

    #[tokio::test]
    async fn test_messages_arrive_in_send_order() {
        let ctx = ctx();
        let (mut tx, mut rx) = channel(&ctx);
        for n in 0..100 {
            tx.push(n).unwrap();
        }
        tx.close(Status::ok()).unwrap();

        let mut seen = Vec::new();
        while let Some(n) = rx.next().await.unwrap() {
            seen.push(n);
        }
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let ctx = ctx();
        let (mut tx, _rx) = channel(&ctx);
        tx.close(Status::ok()).unwrap();

        assert!(tx.is_closed());
        assert_eq!(tx.push(1), Err(ChannelError::Closed));
        assert_eq!(tx.close(Status::ok()), Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_end_of_stream_never_blocks_again() {
        let ctx = ctx();
        let (mut tx, mut rx) = channel::<i32>(&ctx);
        tx.close(Status::ok()).unwrap();

        assert_eq!(rx.next().await, Ok(None));
        assert!(rx.is_finished());
        // The sender is still alive, so a second recv would hang if it were attempted.
        let again = tokio::time::timeout(Duration::from_secs(1), rx.next()).await;
        assert_eq!(again, Ok(Ok(None)));
    }

    #[tokio::test]
    async fn test_error_marker_reported_once() {
        let ctx = ctx();
        let (mut tx, mut rx) = channel::<i32>(&ctx);
        tx.push(7).unwrap();
        tx.close(Status::invalid_argument("bad input")).unwrap();

        assert_eq!(rx.next().await, Ok(Some(7)));
        assert_eq!(
            rx.next().await,
            Err(ChannelError::Terminated(Status::invalid_argument("bad input")))
        );
        assert_eq!(rx.next().await, Ok(None));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_end_of_stream() {
        let ctx = ctx();
        let (mut tx, mut rx) = channel(&ctx);
        tx.push("last").unwrap();
        drop(tx);

        assert_eq!(rx.next().await, Ok(Some("last")));
        assert_eq!(rx.next().await, Ok(None));
    }

    #[tokio::test]
    async fn test_push_after_receiver_dropped_fails() {
        let ctx = ctx();
        let (mut tx, rx) = channel(&ctx);
        drop(rx);
        assert_eq!(tx.push(1), Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_cancel_wakes_suspended_receiver() {
        let ctx = ctx();
        let (_tx, mut rx) = channel::<i32>(&ctx);

        let waiter = tokio::spawn(async move { rx.next().await });
        tokio::task::yield_now().await;
        ctx.cancel(CancelReason::PeerDisconnected);

        assert_eq!(
            waiter.await.unwrap(),
            Err(ChannelError::Cancelled(CancelReason::PeerDisconnected))
        );
    }

    #[tokio::test]
    async fn test_every_operation_fails_after_cancel() {
        let ctx = ctx();
        let (mut tx, mut rx) = channel(&ctx);
        tx.push(1).unwrap();
        ctx.cancel(CancelReason::Deadline);

        let cancelled = ChannelError::Cancelled(CancelReason::Deadline);
        // Queued messages are not delivered past cancellation.
        assert_eq!(rx.next().await, Err(cancelled.clone()));
        assert_eq!(rx.next().await, Err(cancelled.clone()));
        assert_eq!(tx.push(2), Err(cancelled.clone()));
        assert_eq!(tx.close(Status::ok()), Err(cancelled));
    }

    #[tokio::test]
    async fn test_directions_are_independent() {
        let ctx = ctx();
        let (mut in_tx, mut in_rx) = channel::<i32>(&ctx);
        let (mut out_tx, mut out_rx) = channel::<i32>(&ctx);

        in_tx.close(Status::ok()).unwrap();
        assert_eq!(in_rx.next().await, Ok(None));

        out_tx.push(42).unwrap();
        out_tx.close(Status::ok()).unwrap();
        assert_eq!(out_rx.next().await, Ok(Some(42)));
        assert_eq!(out_rx.next().await, Ok(None));
    }

    #[tokio::test]
    async fn test_into_stream() {
        let ctx = ctx();
        let (mut tx, rx) = channel(&ctx);
        tx.push(1).unwrap();
        tx.push(2).unwrap();
        tx.close(Status::not_found("missing")).unwrap();

        let items: Vec<_> = rx.into_stream().collect().await;
        assert_eq!(
            items,
            vec![
                Ok(1),
                Ok(2),
                Err(ChannelError::Terminated(Status::not_found("missing")))
            ]
        );
    }
}
