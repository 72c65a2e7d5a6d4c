//! Outbound side of a dispatched call.
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use streamrpc_core::Status;
use tokio::sync::{mpsc, watch};

use crate::context::{CallContext, CancelReason};
use crate::driver::CallState;

/// One item of a call's response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseFrame {
    /// A serialized output message.
    Message(Bytes),
    /// The call's terminal status. Always the last frame.
    End(Status),
}

/// Response frames of one call, in the order the handler produced them.
///
/// Yields zero or more [`ResponseFrame::Message`] followed by exactly one
/// [`ResponseFrame::End`]. Dropping the stream before the end frame means the
/// peer is gone and cancels the call.
pub struct ResponseStream {
    frames: mpsc::UnboundedReceiver<ResponseFrame>,
    ctx: CallContext,
    ended: bool,
}

impl ResponseStream {
    pub(crate) fn new(frames: mpsc::UnboundedReceiver<ResponseFrame>, ctx: CallContext) -> Self {
        Self {
            frames,
            ctx,
            ended: false,
        }
    }

    /// Drain the stream into its messages and terminal status.
    pub async fn collect(mut self) -> (Vec<Bytes>, Status) {
        let mut messages = Vec::new();
        while let Some(frame) = self.next().await {
            match frame {
                ResponseFrame::Message(bytes) => messages.push(bytes),
                ResponseFrame::End(status) => return (messages, status),
            }
        }
        // `poll_next` always yields an end frame before finishing.
        (messages, Status::internal("response ended without a status"))
    }
}

impl Stream for ResponseStream {
    type Item = ResponseFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.ended {
            return Poll::Ready(None);
        }
        match self.frames.poll_recv(cx) {
            Poll::Ready(Some(frame)) => {
                if matches!(frame, ResponseFrame::End(_)) {
                    self.ended = true;
                }
                Poll::Ready(Some(frame))
            }
            Poll::Ready(None) => {
                self.ended = true;
                tracing::warn!(method = %self.ctx.method(), "call driver exited without a status");
                Poll::Ready(Some(ResponseFrame::End(Status::internal(
                    "call ended without a status",
                ))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if !self.ended {
            self.ctx.cancel(CancelReason::PeerDisconnected);
        }
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("method", &self.ctx.method())
            .field("ended", &self.ended)
            .finish()
    }
}

/// Handle to a call running on its own task.
#[derive(Debug)]
pub struct CallHandle {
    ctx: CallContext,
    state: watch::Receiver<CallState>,
    responses: ResponseStream,
}

impl CallHandle {
    pub(crate) fn new(
        ctx: CallContext,
        state: watch::Receiver<CallState>,
        responses: ResponseStream,
    ) -> Self {
        Self {
            ctx,
            state,
            responses,
        }
    }

    /// The call's context.
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Current lifecycle state of the call.
    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn state_changes(&self) -> watch::Receiver<CallState> {
        self.state.clone()
    }

    /// Cancel the call from the local side.
    pub fn cancel(&self) {
        self.ctx.cancel(CancelReason::Local);
    }

    /// Mutable access to the response frames.
    pub fn responses(&mut self) -> &mut ResponseStream {
        &mut self.responses
    }

    pub fn into_responses(self) -> ResponseStream {
        self.responses
    }

    /// Wait for the call to finish and return its messages and status.
    pub async fn collect(self) -> (Vec<Bytes>, Status) {
        self.responses.collect().await
    }
}
