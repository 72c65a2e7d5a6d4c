//! # streamrpc
//!
//! A streaming RPC service runtime on top of [Tokio](https://tokio.rs) and
//! [Axum](https://github.com/tokio-rs/axum).
//!
//! Handlers are plain `async fn`s registered by method name in a
//! [`Registry`]. Each call is classified into one of four [`Shape`]s and
//! driven to completion on its own task: the handler receives typed
//! [`MessageReceiver`] / [`MessageSender`] ends, a [`CallContext`] carrying
//! the deadline, cancellation latch and metadata, and the state injected
//! into the registry. Every call ends with exactly one [`Status`].
//!
//! ## Features
//!
//! - **Four call shapes:** unary, server-streaming, client-streaming and
//!   bidirectional streaming.
//! - **Deadlines and cancellation:** client timeouts, server timeouts and
//!   peer disconnects trip one latch that wakes suspended channel reads.
//! - **Fixed status taxonomy:** handler errors, panics and cancellations are
//!   mapped onto [`Code`].
//! - **JSON and protobuf:** messages derive both `prost::Message` and serde.
//! - **HTTP adapter:** [`Registry::into_router`] serves all methods as an
//!   axum [`Router`](axum::Router).

pub mod channel;
pub mod codec;
pub mod context;
pub mod driver;
pub mod error;
pub mod registry;
pub mod request;
pub mod response;
pub mod router;
pub mod status;

pub use channel::{MessageReceiver, MessageSender, channel};
pub use codec::{Encoding, RpcMessage};
pub use context::{CallContext, CancelReason, MessageLimits, Metadata};
pub use driver::{CallState, Shape};
pub use error::{ChannelError, RpcError};
pub use registry::{Method, Registry};
pub use request::{InboundCall, RequestStream};
pub use response::{CallHandle, ResponseFrame, ResponseStream};
pub use streamrpc_core::{Code, Status};

// Re-export several crates
pub use futures;
pub use prost;
pub use serde;

pub mod prelude {
    //! A prelude for `streamrpc` providing the most common types.
    pub use crate::channel::{MessageReceiver, MessageSender};
    pub use crate::context::{CallContext, CancelReason, Metadata};
    pub use crate::driver::Shape;
    pub use crate::error::{ChannelError, RpcError};
    pub use crate::registry::Registry;
    pub use streamrpc_core::{Code, Status};
}
