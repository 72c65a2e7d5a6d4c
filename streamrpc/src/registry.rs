//! Dispatch registry: method name to shape and handler.
//!
//! The registry is built once at startup. Collaborators the handlers need
//! (stores, files, clients) are injected as the state `S` and cloned into
//! every invocation.
//!
//! # Example
//!
//! ```rust
//! use streamrpc::prelude::*;
//!
//! #[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
//! struct Number {
//!     #[prost(int32, tag = "1")]
//!     #[serde(default)]
//!     value: i32,
//! }
//!
//! async fn negate(_: (), req: Number, _: CallContext) -> Result<Number, RpcError> {
//!     Ok(Number { value: -req.value })
//! }
//!
//! let mut registry = Registry::new();
//! registry.register_unary("math.Math/Negate", negate).unwrap();
//! assert!(registry.register_unary("math.Math/Negate", negate).is_err());
//! assert_eq!(registry.methods(), vec![("math.Math/Negate", Shape::Unary)]);
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use streamrpc_core::Status;
use tokio::sync::mpsc;

use crate::channel::{MessageReceiver, MessageSender};
use crate::codec::RpcMessage;
use crate::context::{CallContext, MessageLimits, ServerConfig, compute_effective_timeout};
use crate::driver::{self, Call, Shape, StateTracker};
use crate::error::RpcError;
use crate::request::InboundCall;
use crate::response::{CallHandle, ResponseStream};

type CallFn<S> = Arc<dyn Fn(S, Call) -> BoxFuture<'static, Status> + Send + Sync>;

/// A registered method: its shape and its type-erased handler.
pub struct Method<S> {
    shape: Shape,
    call: CallFn<S>,
}

impl<S> Clone for Method<S> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape,
            call: self.call.clone(),
        }
    }
}

impl<S> std::fmt::Debug for Method<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method").field("shape", &self.shape).finish()
    }
}

impl<S> Method<S>
where
    S: Send + 'static,
{
    /// Interaction shape of this method.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn unary<Req, Resp, H, Fut>(handler: H) -> Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(S, Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            shape: Shape::Unary,
            call: Arc::new(move |state: S, call: Call| -> BoxFuture<'static, Status> {
                let handler = handler.clone();
                Box::pin(driver::unary::<Req, Resp, _, _>(call, move |req, ctx| {
                    (*handler)(state, req, ctx)
                }))
            }),
        }
    }

    pub fn server_stream<Req, Resp, H, Fut>(handler: H) -> Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(S, Req, CallContext, MessageSender<Resp>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RpcError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            shape: Shape::ServerStream,
            call: Arc::new(move |state: S, call: Call| -> BoxFuture<'static, Status> {
                let handler = handler.clone();
                Box::pin(driver::server_stream::<Req, Resp, _, _>(call, move |req, ctx, out| {
                    (*handler)(state, req, ctx, out)
                }))
            }),
        }
    }

    pub fn client_stream<Req, Resp, H, Fut>(handler: H) -> Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(S, MessageReceiver<Req>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            shape: Shape::ClientStream,
            call: Arc::new(move |state: S, call: Call| -> BoxFuture<'static, Status> {
                let handler = handler.clone();
                Box::pin(driver::client_stream::<Req, Resp, _, _>(call, move |input, ctx| {
                    (*handler)(state, input, ctx)
                }))
            }),
        }
    }

    pub fn bidi_stream<Req, Resp, H, Fut>(handler: H) -> Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(S, MessageReceiver<Req>, MessageSender<Resp>, CallContext) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<(), RpcError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            shape: Shape::BidiStream,
            call: Arc::new(move |state: S, call: Call| -> BoxFuture<'static, Status> {
                let handler = handler.clone();
                Box::pin(driver::bidi_stream::<Req, Resp, _, _>(call, move |input, out, ctx| {
                    (*handler)(state, input, out, ctx)
                }))
            }),
        }
    }
}

/// Registered methods plus the state injected into their handlers.
pub struct Registry<S = ()> {
    methods: HashMap<String, Method<S>>,
    state: S,
    config: ServerConfig,
}

impl Registry<()> {
    /// A registry whose handlers take no state.
    pub fn new() -> Self {
        Self::with_state(())
    }
}

impl Default for Registry<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Registry<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// A registry injecting `state` into every handler invocation.
    pub fn with_state(state: S) -> Self {
        Self {
            methods: HashMap::new(),
            state,
            config: ServerConfig::default(),
        }
    }

    /// Server-side timeout for every call. A shorter client timeout wins.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.server_timeout = Some(timeout);
        self
    }

    /// Set message size limits. No limits by default.
    pub fn message_limits(mut self, limits: MessageLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// The injected state.
    pub fn state(&self) -> &S {
        &self.state
    }

    pub(crate) fn limits(&self) -> MessageLimits {
        self.config.limits
    }

    /// Register `method` under `name`. Fails with `conflict` if the name is
    /// taken.
    pub fn register<N: Into<String>>(&mut self, name: N, method: Method<S>) -> Result<(), Status> {
        let name = name.into();
        if self.methods.contains_key(&name) {
            return Err(Status::conflict(format!("method {name} is already registered")));
        }
        tracing::debug!(method = %name, shape = %method.shape(), "method registered");
        self.methods.insert(name, method);
        Ok(())
    }

    pub fn register_unary<N, Req, Resp, H, Fut>(
        &mut self,
        name: N,
        handler: H,
    ) -> Result<(), Status>
    where
        N: Into<String>,
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(S, Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        self.register(name, Method::unary(handler))
    }

    pub fn register_server_stream<N, Req, Resp, H, Fut>(
        &mut self,
        name: N,
        handler: H,
    ) -> Result<(), Status>
    where
        N: Into<String>,
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(S, Req, CallContext, MessageSender<Resp>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RpcError>> + Send + 'static,
    {
        self.register(name, Method::server_stream(handler))
    }

    pub fn register_client_stream<N, Req, Resp, H, Fut>(
        &mut self,
        name: N,
        handler: H,
    ) -> Result<(), Status>
    where
        N: Into<String>,
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(S, MessageReceiver<Req>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        self.register(name, Method::client_stream(handler))
    }

    pub fn register_bidi_stream<N, Req, Resp, H, Fut>(
        &mut self,
        name: N,
        handler: H,
    ) -> Result<(), Status>
    where
        N: Into<String>,
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(S, MessageReceiver<Req>, MessageSender<Resp>, CallContext) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<(), RpcError>> + Send + 'static,
    {
        self.register(name, Method::bidi_stream(handler))
    }

    /// Look up a registered method.
    pub fn method(&self, name: &str) -> Option<&Method<S>> {
        self.methods.get(name)
    }

    /// Registered method names and shapes, sorted by name.
    pub fn methods(&self) -> Vec<(&str, Shape)> {
        let mut methods: Vec<_> = self
            .methods
            .iter()
            .map(|(name, method)| (name.as_str(), method.shape()))
            .collect();
        methods.sort_unstable_by(|a, b| a.0.cmp(b.0));
        methods
    }

    /// Admit `call` and start driving it on its own task.
    ///
    /// Fails with `unimplemented` if no method is registered under the call's
    /// name. Must be called from within a Tokio runtime.
    pub fn dispatch(&self, call: InboundCall) -> Result<CallHandle, Status> {
        let Some(method) = self.methods.get(&call.method) else {
            tracing::debug!(method = %call.method, "unknown method");
            return Err(Status::unimplemented(format!(
                "method {} is not implemented",
                call.method
            )));
        };

        let timeout = compute_effective_timeout(self.config.server_timeout, call.timeout);
        let ctx = CallContext::with_timeout(call.method, timeout, call.metadata);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (tracker, state_rx) = StateTracker::new(&ctx);

        let io = Call::new(
            ctx.clone(),
            call.encoding,
            self.config.limits,
            call.messages,
            frames_tx.clone(),
            tracker.clone(),
        );
        let future = (method.call)(self.state.clone(), io);
        tokio::spawn(driver::drive(
            ctx.clone(),
            method.shape(),
            tracker,
            frames_tx,
            future,
        ));

        let responses = ResponseStream::new(frames_rx, ctx.clone());
        Ok(CallHandle::new(ctx, state_rx, responses))
    }
}

impl<S> std::fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
