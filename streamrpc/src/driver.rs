//! Stream driver: runs one call to completion.
//!
//! The driver owns both ends of every channel of a call. It hands the
//! handler its typed ends, relays serialized inbound messages into the input
//! channel, forwards the output channel to the peer, and reports exactly one
//! terminal [`Status`] through the call's response frames.
//!
//! ```text
//! Started ──► Active ──► Draining ──► Terminated
//!    └────────────────────────────────────┘ (unary, early failure)
//! ```
//!
//! Handlers run on their own task so a panic is caught at the join point
//! instead of tearing down the driver.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use streamrpc_core::{Code, Status};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::channel::{MessageReceiver, MessageSender, channel};
use crate::codec::{Encoding, RpcMessage};
use crate::context::{AbortOnDrop, CallContext, MessageLimits};
use crate::error::{ChannelError, RpcError};
use crate::request::RequestStream;
use crate::response::ResponseFrame;
use crate::status;

/// Interaction shape of a method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    /// One request, one response.
    Unary,
    /// One request, a stream of responses.
    ServerStream,
    /// A stream of requests, one response.
    ClientStream,
    /// Independent request and response streams.
    BidiStream,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Unary => "unary",
            Shape::ServerStream => "server_stream",
            Shape::ClientStream => "client_stream",
            Shape::BidiStream => "bidi_stream",
        }
    }

    /// Whether the caller sends a stream of messages.
    pub fn is_client_streaming(&self) -> bool {
        matches!(self, Shape::ClientStream | Shape::BidiStream)
    }

    /// Whether the handler produces a stream of messages.
    pub fn is_server_streaming(&self) -> bool {
        matches!(self, Shape::ServerStream | Shape::BidiStream)
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a call. States only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallState {
    /// Admitted, handler not yet running.
    Started,
    /// Handler running, messages flowing.
    Active,
    /// One direction reached its terminal marker.
    Draining,
    /// Terminal status produced.
    Terminated,
}

/// Publishes state transitions of one call.
#[derive(Clone)]
pub(crate) struct StateTracker {
    tx: Arc<watch::Sender<CallState>>,
    ctx: CallContext,
}

impl StateTracker {
    pub(crate) fn new(ctx: &CallContext) -> (Self, watch::Receiver<CallState>) {
        let (tx, rx) = watch::channel(CallState::Started);
        let tracker = Self {
            tx: Arc::new(tx),
            ctx: ctx.clone(),
        };
        (tracker, rx)
    }

    pub(crate) fn advance(&self, next: CallState) {
        self.tx.send_if_modified(|current| {
            if *current >= next {
                return false;
            }
            tracing::trace!(
                method = %self.ctx.method(),
                from = ?*current,
                to = ?next,
                "call state changed"
            );
            *current = next;
            true
        });
    }
}

/// Everything the driver needs to run one admitted call.
pub(crate) struct Call {
    ctx: CallContext,
    encoding: Encoding,
    limits: MessageLimits,
    inbound: Option<RequestStream>,
    frames: mpsc::UnboundedSender<ResponseFrame>,
    state: StateTracker,
}

impl Call {
    pub(crate) fn new(
        ctx: CallContext,
        encoding: Encoding,
        limits: MessageLimits,
        inbound: RequestStream,
        frames: mpsc::UnboundedSender<ResponseFrame>,
        state: StateTracker,
    ) -> Self {
        Self {
            ctx,
            encoding,
            limits,
            inbound: Some(inbound),
            frames,
            state,
        }
    }

    fn cancel_status(&self) -> Status {
        self.ctx
            .cancel_reason()
            .map(status::from_cancel)
            .unwrap_or_else(|| Status::cancelled("call cancelled"))
    }

    /// Read the single request message of a unary or server-streaming call.
    async fn read_one<T: RpcMessage>(&mut self) -> Result<T, Status> {
        let Some(mut inbound) = self.inbound.take() else {
            return Err(Status::internal("request stream already consumed"));
        };
        let item = tokio::select! {
            biased;
            _ = self.ctx.cancelled() => return Err(self.cancel_status()),
            item = inbound.next() => item,
        };
        match item {
            Some(Ok(payload)) => decode_message(self.encoding, &self.limits, &payload),
            Some(Err(status)) => Err(status),
            None => Err(Status::invalid_argument("request message missing")),
        }
    }

    /// Encode one output message and hand it to the peer.
    fn emit<T: RpcMessage>(&self, message: &T) -> Result<(), Status> {
        let payload = self.encoding.encode(message).map_err(Status::from)?;
        self.limits.check_send_size(payload.len())?;
        // The receiver only goes away when the peer drops the response,
        // which also trips the cancellation latch.
        self.frames
            .send(ResponseFrame::Message(payload))
            .map_err(|_| self.cancel_status())
    }

    /// Relay inbound messages into `input` on a task of its own.
    ///
    /// The input channel is closed exactly once: with OK at end-of-stream, or
    /// with the failure status of a transport or decode error.
    fn spawn_inbound<T: RpcMessage>(
        &mut self,
        mut input: MessageSender<T>,
        drain_on_end: bool,
    ) -> AbortOnDrop {
        let inbound = self.inbound.take();
        let encoding = self.encoding;
        let limits = self.limits;
        let ctx = self.ctx.clone();
        let state = self.state.clone();

        AbortOnDrop(tokio::spawn(async move {
            let Some(mut inbound) = inbound else {
                let _ = input.close(Status::internal("request stream already consumed"));
                return;
            };
            loop {
                let item = tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return,
                    item = inbound.next() => item,
                };
                match item {
                    Some(Ok(payload)) => match decode_message(encoding, &limits, &payload) {
                        Ok(message) => {
                            // Fails only once the handler dropped its receiver.
                            if input.push(message).is_err() {
                                return;
                            }
                        }
                        Err(status) => {
                            let _ = input.close(status);
                            return;
                        }
                    },
                    Some(Err(status)) => {
                        let _ = input.close(status);
                        return;
                    }
                    None => {
                        if input.close(Status::ok()).is_ok() && drain_on_end {
                            state.advance(CallState::Draining);
                        }
                        return;
                    }
                }
            }
        }))
    }

    /// Wait for the handler task, giving up as soon as the call is cancelled.
    async fn join<T>(&mut self, mut handle: JoinHandle<Result<T, RpcError>>) -> Result<T, Status> {
        let joined = tokio::select! {
            biased;
            _ = self.ctx.cancelled() => None,
            joined = &mut handle => Some(joined),
        };
        match joined {
            None => {
                handle.abort();
                Err(self.cancel_status())
            }
            Some(Ok(result)) => result.map_err(Status::from),
            Some(Err(err)) => {
                if err.is_panic() {
                    tracing::warn!(method = %self.ctx.method(), "handler panicked");
                }
                Err(status::from_join_error(err))
            }
        }
    }

    /// Forward the output channel to the peer until its terminal marker, then
    /// wait for the handler.
    async fn forward<T: RpcMessage>(
        &mut self,
        mut output: MessageReceiver<T>,
        mut handle: JoinHandle<Result<(), RpcError>>,
    ) -> Status {
        let end = loop {
            match output.next().await {
                Ok(Some(message)) => {
                    if let Err(status) = self.emit(&message) {
                        handle.abort();
                        return status;
                    }
                }
                Ok(None) => break Status::ok(),
                Err(ChannelError::Terminated(status)) => break status,
                Err(err) => {
                    handle.abort();
                    return err.into();
                }
            }
        };
        self.state.advance(CallState::Draining);

        match self.join(handle).await {
            Ok(()) => end,
            Err(status) => status,
        }
    }
}

fn decode_message<T: RpcMessage>(
    encoding: Encoding,
    limits: &MessageLimits,
    payload: &[u8],
) -> Result<T, Status> {
    limits.check_receive_size(payload.len())?;
    encoding.decode(payload).map_err(Status::from)
}

/// One request in, one response out.
pub(crate) async fn unary<Req, Resp, F, Fut>(mut call: Call, handler: F) -> Status
where
    Req: RpcMessage,
    Resp: RpcMessage,
    F: FnOnce(Req, CallContext) -> Fut,
    Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
{
    let request = match call.read_one::<Req>().await {
        Ok(request) => request,
        Err(status) => return status,
    };

    let handle = tokio::spawn(handler(request, call.ctx.clone()));
    match call.join(handle).await {
        Ok(response) => call.emit(&response).map_or_else(|status| status, |()| Status::ok()),
        Err(status) => status,
    }
}

/// One request in, every message the handler pushes out.
pub(crate) async fn server_stream<Req, Resp, F, Fut>(mut call: Call, handler: F) -> Status
where
    Req: RpcMessage,
    Resp: RpcMessage,
    F: FnOnce(Req, CallContext, MessageSender<Resp>) -> Fut,
    Fut: Future<Output = Result<(), RpcError>> + Send + 'static,
{
    let request = match call.read_one::<Req>().await {
        Ok(request) => request,
        Err(status) => return status,
    };

    let (output, outbound) = channel::<Resp>(&call.ctx);
    call.state.advance(CallState::Active);
    let handle = tokio::spawn(handler(request, call.ctx.clone(), output));
    call.forward(outbound, handle).await
}

/// A stream of requests in, one response out.
pub(crate) async fn client_stream<Req, Resp, F, Fut>(mut call: Call, handler: F) -> Status
where
    Req: RpcMessage,
    Resp: RpcMessage,
    F: FnOnce(MessageReceiver<Req>, CallContext) -> Fut,
    Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
{
    let (input, inbound) = channel::<Req>(&call.ctx);
    call.state.advance(CallState::Active);
    let _relay = call.spawn_inbound(input, true);

    let handle = tokio::spawn(handler(inbound, call.ctx.clone()));
    match call.join(handle).await {
        Ok(response) => call.emit(&response).map_or_else(|status| status, |()| Status::ok()),
        Err(status) => status,
    }
}

/// Independent request and response streams.
///
/// The inbound relay and the outbound forwarding share nothing but the two
/// channels and the call context. The relay is stopped once the call ends.
pub(crate) async fn bidi_stream<Req, Resp, F, Fut>(mut call: Call, handler: F) -> Status
where
    Req: RpcMessage,
    Resp: RpcMessage,
    F: FnOnce(MessageReceiver<Req>, MessageSender<Resp>, CallContext) -> Fut,
    Fut: Future<Output = Result<(), RpcError>> + Send + 'static,
{
    let (input, inbound) = channel::<Req>(&call.ctx);
    let (output, outbound) = channel::<Resp>(&call.ctx);
    call.state.advance(CallState::Active);
    let _relay = call.spawn_inbound(input, false);

    let handle = tokio::spawn(handler(inbound, output, call.ctx.clone()));
    call.forward(outbound, handle).await
}

/// Run an admitted call and deliver its terminal status.
pub(crate) async fn drive(
    ctx: CallContext,
    shape: Shape,
    state: StateTracker,
    frames: mpsc::UnboundedSender<ResponseFrame>,
    call: BoxFuture<'static, Status>,
) {
    tracing::debug!(
        method = %ctx.method(),
        %shape,
        timeout_ms = ?ctx.time_remaining().map(|t| t.as_millis()),
        "call admitted"
    );
    let _watchdog = ctx.arm_deadline();

    let status = call.await;
    state.advance(CallState::Terminated);

    if status.code() == Code::Internal {
        tracing::warn!(
            method = %ctx.method(),
            %shape,
            message = status.message(),
            "call failed with internal error"
        );
    } else {
        tracing::debug!(
            method = %ctx.method(),
            %shape,
            code = %status.code(),
            "call terminated"
        );
    }
    // The peer may already be gone.
    let _ = frames.send(ResponseFrame::End(status));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CancelReason, Metadata};
    use crate::registry::Registry;
    use crate::request::InboundCall;
    use bytes::Bytes;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
    struct Num {
        #[prost(int64, tag = "1")]
        #[serde(default)]
        value: i64,
    }

    fn num(value: i64) -> Bytes {
        Encoding::Json.encode(&Num { value }).unwrap()
    }

    fn values(messages: &[Bytes]) -> Vec<i64> {
        messages
            .iter()
            .map(|m| Encoding::Json.decode::<Num>(m).unwrap().value)
            .collect()
    }

    async fn double(_: (), req: Num, _: CallContext) -> Result<Num, RpcError> {
        Ok(Num {
            value: req.value * 2,
        })
    }

    async fn sleepy(_: (), req: Num, ctx: CallContext) -> Result<Num, RpcError> {
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            ctx.check()?;
        }
        Ok(req)
    }

    async fn panics(_: (), _: Num, _: CallContext) -> Result<Num, RpcError> {
        panic!("handler bug")
    }

    async fn missing(_: (), req: Num, _: CallContext) -> Result<Num, RpcError> {
        Err(RpcError::not_found(format!("record {}", req.value)))
    }

    async fn count_to(
        _: (),
        req: Num,
        _: CallContext,
        mut out: MessageSender<Num>,
    ) -> Result<(), RpcError> {
        for value in 1..=req.value {
            out.push(Num { value })?;
        }
        Ok(())
    }

    async fn fail_stream(
        _: (),
        _: Num,
        _: CallContext,
        mut out: MessageSender<Num>,
    ) -> Result<(), RpcError> {
        out.push(Num { value: 1 })?;
        out.close(Status::not_found("gone"))?;
        Ok(())
    }

    /// Pushes `1..=n` a second apart, closes, then lingers before returning.
    async fn tick(
        _: (),
        req: Num,
        _: CallContext,
        mut out: MessageSender<Num>,
    ) -> Result<(), RpcError> {
        for value in 1..=req.value {
            if value > 1 {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            out.push(Num { value })?;
        }
        out.close(Status::ok())?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    /// Concatenates the digits it receives and checks end-of-stream is sticky.
    async fn digits(
        _: (),
        mut input: MessageReceiver<Num>,
        _: CallContext,
    ) -> Result<Num, RpcError> {
        let mut acc = 0;
        while let Some(msg) = input.next().await? {
            acc = acc * 10 + msg.value;
        }
        if input.next().await?.is_some() {
            return Err(RpcError::other("message after end-of-stream"));
        }
        Ok(Num { value: acc })
    }

    async fn wait_forever(
        _: (),
        mut input: MessageReceiver<Num>,
        _: CallContext,
    ) -> Result<Num, RpcError> {
        while input.next().await?.is_some() {}
        Ok(Num::default())
    }

    async fn echo(
        _: (),
        mut input: MessageReceiver<Num>,
        mut out: MessageSender<Num>,
        _: CallContext,
    ) -> Result<(), RpcError> {
        while let Some(msg) = input.next().await? {
            out.push(msg)?;
        }
        out.close(Status::ok())?;
        Ok(())
    }

    /// Closes its output first, then keeps reading input.
    async fn close_output_early(
        _: (),
        mut input: MessageReceiver<Num>,
        mut out: MessageSender<Num>,
        _: CallContext,
    ) -> Result<(), RpcError> {
        out.push(Num { value: 1 })?;
        out.close(Status::ok())?;
        let mut seen = 0;
        while input.next().await?.is_some() {
            seen += 1;
        }
        if seen != 3 {
            return Err(RpcError::other(format!("saw {seen} inputs")));
        }
        Ok(())
    }

    fn registry() -> Registry<()> {
        let mut registry = Registry::new();
        registry.register_unary("test.Svc/Double", double).unwrap();
        registry.register_unary("test.Svc/Sleepy", sleepy).unwrap();
        registry.register_unary("test.Svc/Panics", panics).unwrap();
        registry.register_unary("test.Svc/Missing", missing).unwrap();
        registry.register_server_stream("test.Svc/CountTo", count_to).unwrap();
        registry.register_server_stream("test.Svc/FailStream", fail_stream).unwrap();
        registry.register_server_stream("test.Svc/Tick", tick).unwrap();
        registry.register_client_stream("test.Svc/Digits", digits).unwrap();
        registry.register_client_stream("test.Svc/WaitForever", wait_forever).unwrap();
        registry.register_bidi_stream("test.Svc/Echo", echo).unwrap();
        registry
            .register_bidi_stream("test.Svc/CloseOutputEarly", close_output_early)
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_unary_one_in_one_out() {
        let handle = registry()
            .dispatch(InboundCall::unary("test.Svc/Double", num(21)))
            .unwrap();
        let ctx = handle.context().clone();
        let mut states = handle.state_changes();

        let (messages, status) = handle.collect().await;
        assert_eq!(values(&messages), vec![42]);
        assert!(status.is_ok());
        assert_eq!(*states.borrow_and_update(), CallState::Terminated);
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_unary_without_input_is_invalid_argument() {
        let call = InboundCall::from_messages("test.Svc/Double", Vec::<Bytes>::new());
        let (messages, status) = registry().dispatch(call).unwrap().collect().await;
        assert!(messages.is_empty());
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_undecodable_input_is_invalid_argument() {
        let call = InboundCall::unary("test.Svc/Double", "not json");
        let (messages, status) = registry().dispatch(call).unwrap().collect().await;
        assert!(messages.is_empty());
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_proto_encoding() {
        let payload = Encoding::Proto.encode(&Num { value: 4 }).unwrap();
        let call = InboundCall::unary("test.Svc/Double", payload).encoding(Encoding::Proto);
        let (messages, status) = registry().dispatch(call).unwrap().collect().await;
        assert!(status.is_ok());
        let reply: Num = Encoding::Proto.decode(&messages[0]).unwrap();
        assert_eq!(reply.value, 8);
    }

    #[tokio::test]
    async fn test_handler_error_is_mapped() {
        let call = InboundCall::unary("test.Svc/Missing", num(7));
        let (messages, status) = registry().dispatch(call).unwrap().collect().await;
        assert!(messages.is_empty());
        assert_eq!(status, Status::not_found("record 7"));
    }

    #[tokio::test]
    async fn test_panic_is_internal_and_terminates() {
        let handle = registry()
            .dispatch(InboundCall::unary("test.Svc/Panics", num(1)))
            .unwrap();
        let states = handle.state_changes();
        let (messages, status) = handle.collect().await;
        assert!(messages.is_empty());
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(*states.borrow(), CallState::Terminated);
    }

    #[tokio::test]
    async fn test_server_stream_forwards_in_order() {
        let call = InboundCall::unary("test.Svc/CountTo", num(5));
        let (messages, status) = registry().dispatch(call).unwrap().collect().await;
        assert_eq!(values(&messages), vec![1, 2, 3, 4, 5]);
        assert!(status.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_stream_forwards_before_handler_finishes() {
        let mut handle = registry()
            .dispatch(InboundCall::unary("test.Svc/Tick", num(3)))
            .unwrap();
        let mut states = handle.state_changes();
        let start = tokio::time::Instant::now();

        let first = handle.responses().next().await.unwrap();
        assert_eq!(first, ResponseFrame::Message(num(1)));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(handle.state(), CallState::Active);

        let draining = *states
            .wait_for(|s| *s >= CallState::Draining)
            .await
            .unwrap();
        assert_eq!(draining, CallState::Draining);

        let (messages, status) = handle.collect().await;
        assert!(status.is_ok());
        assert_eq!(values(&messages), vec![2, 3]);
        assert_eq!(*states.borrow_and_update(), CallState::Terminated);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_server_stream_error_marker_is_status() {
        let call = InboundCall::unary("test.Svc/FailStream", num(0));
        let (messages, status) = registry().dispatch(call).unwrap().collect().await;
        assert_eq!(values(&messages), vec![1]);
        assert_eq!(status, Status::not_found("gone"));
    }

    #[tokio::test]
    async fn test_client_stream_end_of_stream_once_in_order() {
        let call = InboundCall::from_messages(
            "test.Svc/Digits",
            [1, 2, 3, 4, 5].into_iter().map(num).collect::<Vec<_>>(),
        );
        let (messages, status) = registry().dispatch(call).unwrap().collect().await;
        assert!(status.is_ok(), "{status}");
        assert_eq!(values(&messages), vec![12345]);
    }

    #[tokio::test]
    async fn test_client_stream_zero_messages() {
        let call = InboundCall::from_messages("test.Svc/Digits", Vec::<Bytes>::new());
        let (messages, status) = registry().dispatch(call).unwrap().collect().await;
        assert!(status.is_ok(), "{status}");
        assert_eq!(values(&messages), vec![0]);
    }

    #[tokio::test]
    async fn test_client_stream_transport_failure_reaches_handler() {
        let inbound = futures::stream::iter(vec![
            Ok(num(1)),
            Err(Status::cancelled("body reset")),
        ]);
        let call = InboundCall::streaming("test.Svc/Digits", inbound);
        let (_, status) = registry().dispatch(call).unwrap().collect().await;
        assert_eq!(status, Status::cancelled("body reset"));
    }

    #[tokio::test]
    async fn test_client_stream_state_transitions() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, Status>>();
        let handle = registry()
            .dispatch(InboundCall::streaming("test.Svc/Digits", rx))
            .unwrap();
        let mut states = handle.state_changes();

        states
            .wait_for(|s| *s == CallState::Active)
            .await
            .unwrap();
        tx.unbounded_send(Ok(num(4))).unwrap();
        drop(tx);

        let (messages, status) = handle.collect().await;
        assert!(status.is_ok());
        assert_eq!(values(&messages), vec![4]);
        assert_eq!(*states.borrow_and_update(), CallState::Terminated);
    }

    #[tokio::test]
    async fn test_bidi_echo() {
        let call = InboundCall::from_messages(
            "test.Svc/Echo",
            [3, 1, 2].into_iter().map(num).collect::<Vec<_>>(),
        );
        let (messages, status) = registry().dispatch(call).unwrap().collect().await;
        assert!(status.is_ok());
        assert_eq!(values(&messages), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_bidi_directions_are_independent() {
        let call = InboundCall::from_messages(
            "test.Svc/CloseOutputEarly",
            [7, 8, 9].into_iter().map(num).collect::<Vec<_>>(),
        );
        let (messages, status) = registry().dispatch(call).unwrap().collect().await;
        assert!(status.is_ok(), "{status}");
        assert_eq!(values(&messages), vec![1]);
    }

    #[tokio::test]
    async fn test_local_cancel_wakes_suspended_handler() {
        let call = InboundCall::streaming("test.Svc/WaitForever", futures::stream::pending());
        let handle = registry().dispatch(call).unwrap();
        handle.cancel();

        let (messages, status) = handle.collect().await;
        assert!(messages.is_empty());
        assert_eq!(status.code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_response_is_peer_disconnect() {
        let call = InboundCall::streaming("test.Svc/WaitForever", futures::stream::pending());
        let handle = registry().dispatch(call).unwrap();
        let ctx = handle.context().clone();
        let mut states = handle.state_changes();
        drop(handle);

        states
            .wait_for(|s| *s == CallState::Terminated)
            .await
            .unwrap();
        assert_eq!(ctx.cancel_reason(), Some(CancelReason::PeerDisconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_deadline_exceeded() {
        let call =
            InboundCall::unary("test.Svc/Sleepy", num(1)).timeout(Some(Duration::from_secs(1)));
        let handle = registry().dispatch(call).unwrap();
        let ctx = handle.context().clone();

        let (messages, status) = handle.collect().await;
        assert!(messages.is_empty());
        assert_eq!(status.code(), Code::DeadlineExceeded);
        assert_eq!(ctx.cancel_reason(), Some(CancelReason::Deadline));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_timeout_applies_without_client_timeout() {
        let registry = registry().timeout(Duration::from_secs(2));
        let call = InboundCall::unary("test.Svc/Sleepy", num(1));
        let (_, status) = registry.dispatch(call).unwrap().collect().await;
        assert_eq!(status.code(), Code::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generous_deadline_succeeds() {
        let call =
            InboundCall::unary("test.Svc/Sleepy", num(9)).timeout(Some(Duration::from_secs(10)));
        let (messages, status) = registry().dispatch(call).unwrap().collect().await;
        assert!(status.is_ok());
        assert_eq!(values(&messages), vec![9]);
    }

    #[tokio::test]
    async fn test_message_limits() {
        let registry = registry().message_limits(
            MessageLimits::new().receive_max_bytes(64).send_max_bytes(12),
        );

        let big = Bytes::from(format!(r#"{{"value":1,"pad":"{}"}}"#, "x".repeat(100)));
        let (_, status) = registry
            .dispatch(InboundCall::unary("test.Svc/Double", big))
            .unwrap()
            .collect()
            .await;
        assert_eq!(status.code(), Code::InvalidArgument);

        // {"value":2000000000} is over 12 bytes once encoded.
        let (messages, status) = registry
            .dispatch(InboundCall::unary("test.Svc/Double", num(1_000_000_000)))
            .unwrap()
            .collect()
            .await;
        assert!(messages.is_empty());
        assert_eq!(status.code(), Code::Internal);
    }

    #[tokio::test]
    async fn test_metadata_reaches_handler_context() {
        let metadata: Metadata = [("X-Trace", "abc")].into_iter().collect();
        let handle = registry()
            .dispatch(InboundCall::unary("test.Svc/Double", num(1)).metadata(metadata))
            .unwrap();
        assert_eq!(handle.context().metadata().get("x-trace"), Some("abc"));
        assert_eq!(handle.context().method(), "test.Svc/Double");
        let (_, status) = handle.collect().await;
        assert!(status.is_ok());
    }
}
