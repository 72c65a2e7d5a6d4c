//! Inbound calls as handed to the dispatch registry.
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use streamrpc_core::Status;

use crate::codec::Encoding;
use crate::context::Metadata;

/// Serialized inbound messages of one call.
///
/// An `Err` item ends the stream; it reports a transport failure (truncated
/// body, error trailer from the peer) and is delivered to the handler as the
/// input channel's terminal status.
pub type RequestStream = Pin<Box<dyn Stream<Item = Result<Bytes, Status>> + Send>>;

/// A call addressed to a method name, before dispatch.
pub struct InboundCall {
    pub(crate) method: String,
    pub(crate) encoding: Encoding,
    pub(crate) metadata: Metadata,
    pub(crate) timeout: Option<Duration>,
    pub(crate) messages: RequestStream,
}

impl InboundCall {
    /// A call carrying a single serialized message.
    pub fn unary<M: Into<String>, B: Into<Bytes>>(method: M, payload: B) -> Self {
        let payload = payload.into();
        Self::streaming(method, futures::stream::once(async move { Ok(payload) }))
    }

    /// A call whose messages arrive on `messages`.
    pub fn streaming<M, St>(method: M, messages: St) -> Self
    where
        M: Into<String>,
        St: Stream<Item = Result<Bytes, Status>> + Send + 'static,
    {
        Self {
            method: method.into(),
            encoding: Encoding::default(),
            metadata: Metadata::new(),
            timeout: None,
            messages: Box::pin(messages),
        }
    }

    /// A call whose messages are all known up front.
    pub fn from_messages<M, I>(method: M, messages: I) -> Self
    where
        M: Into<String>,
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Self::streaming(method, futures::stream::iter(messages.into_iter().map(Ok)))
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Client-side timeout. Combined with the server timeout, the smaller wins.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl std::fmt::Debug for InboundCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundCall")
            .field("method", &self.method)
            .field("encoding", &self.encoding)
            .field("metadata", &self.metadata)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
