//! Error types raised by handlers and channels.
//!
//! Neither type crosses the wire directly: the [`status`](crate::status)
//! module maps both onto the fixed [`Code`](streamrpc_core::Code) taxonomy.

use streamrpc_core::Status;

use crate::context::CancelReason;

/// Failure of a [`MessageSender`](crate::MessageSender) or
/// [`MessageReceiver`](crate::MessageReceiver) operation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The terminal marker was already pushed, or the other end is gone.
    #[error("channel already closed")]
    Closed,

    /// The call was cancelled; permanent for the rest of the call.
    #[error("call cancelled: {0}")]
    Cancelled(CancelReason),

    /// The producer closed the channel with a non-OK status.
    #[error("stream terminated: {0}")]
    Terminated(Status),
}

/// Error returned by RPC handlers.
///
/// Expected failures use the dedicated variants (or an explicit [`Status`]);
/// anything else goes through [`RpcError::Other`] and is reported as
/// `internal`.
///
/// # Example
///
/// ```
/// use streamrpc::RpcError;
///
/// fn square_root(number: i32) -> Result<f64, RpcError> {
///     if number < 0 {
///         return Err(RpcError::invalid_argument(format!(
///             "received a negative number: {number}"
///         )));
///     }
///     Ok(f64::from(number).sqrt())
/// }
///
/// assert!(square_root(-2).is_err());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// An explicit status chosen by the handler.
    #[error(transparent)]
    Status(#[from] Status),

    /// Domain validation failure.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A channel operation failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// An inbound message could not be decoded.
    #[error("failed to decode message: {0}")]
    Decode(String),

    /// An outbound message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// Any other failure inside the handler.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl RpcError {
    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        RpcError::InvalidArgument(message.into())
    }

    /// Create a not found error.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        RpcError::NotFound(message.into())
    }

    /// Wrap an unexpected error.
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        RpcError::Other(err.into())
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Other(Box::new(err))
    }
}
