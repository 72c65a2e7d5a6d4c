//! Mapping of call outcomes onto the fixed status taxonomy.
//!
//! | outcome | code |
//! |---|---|
//! | handler returned a value | `ok` |
//! | [`RpcError::InvalidArgument`], [`RpcError::Decode`] | `invalid_argument` |
//! | [`RpcError::NotFound`] | `not_found` |
//! | cancelled by the deadline | `deadline_exceeded` |
//! | cancelled for any other reason | `canceled` |
//! | [`RpcError::Status`] | the carried code |
//! | channel misuse, [`RpcError::Encode`], [`RpcError::Other`], panic | `internal` |
//!
//! The dispatch registry adds `unimplemented` (unknown method) and
//! `conflict` (duplicate registration).

use streamrpc_core::{Code, Status};
use tokio::task::JoinError;

use crate::context::CancelReason;
use crate::error::{ChannelError, RpcError};

/// Status for a call cut short by cancellation.
pub fn from_cancel(reason: CancelReason) -> Status {
    match reason {
        CancelReason::Deadline => Status::deadline_exceeded("deadline exceeded"),
        CancelReason::PeerDisconnected => Status::cancelled("peer disconnected"),
        CancelReason::Local => Status::cancelled("call cancelled"),
    }
}

/// Status for a handler that panicked or was torn down.
pub fn from_join_error(err: JoinError) -> Status {
    if err.is_panic() {
        let payload = err.into_panic();
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Status::internal(format!("handler panicked: {detail}"))
    } else {
        Status::internal("handler task was aborted")
    }
}

/// Split a handler result into its value and the terminal status.
pub fn from_result<T>(result: Result<T, RpcError>) -> (Option<T>, Status) {
    match result {
        Ok(value) => (Some(value), Status::ok()),
        Err(err) => (None, err.into()),
    }
}

/// An error must never report success; an explicit `ok` status is a bug in
/// the handler.
fn ensure_error(status: Status) -> Status {
    if status.code() == Code::Ok {
        Status::internal("handler failed with an ok status")
    } else {
        status
    }
}

impl From<ChannelError> for Status {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Cancelled(reason) => from_cancel(reason),
            ChannelError::Terminated(status) => ensure_error(status),
            ChannelError::Closed => Status::internal("channel already closed"),
        }
    }
}

impl From<RpcError> for Status {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Status(status) => ensure_error(status),
            RpcError::InvalidArgument(message) => Status::invalid_argument(message),
            RpcError::NotFound(message) => Status::not_found(message),
            RpcError::Channel(err) => err.into(),
            RpcError::Decode(message) => {
                Status::invalid_argument(format!("failed to decode message: {message}"))
            }
            RpcError::Encode(message) => {
                Status::internal(format!("failed to encode message: {message}"))
            }
            RpcError::Other(err) => Status::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_maps_to_ok() {
        let (value, status) = from_result::<i32>(Ok(13));
        assert_eq!(value, Some(13));
        assert!(status.is_ok());
    }

    #[test]
    fn test_domain_errors() {
        let (value, status) = from_result::<f64>(Err(RpcError::invalid_argument("negative")));
        assert_eq!(value, None);
        assert_eq!(status, Status::invalid_argument("negative"));

        let status: Status = RpcError::not_found("blog 42").into();
        assert_eq!(status.code(), Code::NotFound);

        let status: Status = RpcError::Decode("eof".into()).into();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[test]
    fn test_cancellation_reasons() {
        assert_eq!(from_cancel(CancelReason::Deadline).code(), Code::DeadlineExceeded);
        assert_eq!(from_cancel(CancelReason::PeerDisconnected).code(), Code::Cancelled);
        assert_eq!(from_cancel(CancelReason::Local).code(), Code::Cancelled);

        let status: Status = RpcError::from(ChannelError::Cancelled(CancelReason::Deadline)).into();
        assert_eq!(status.code(), Code::DeadlineExceeded);
    }

    #[test]
    fn test_unexpected_errors_are_internal() {
        let status: Status = RpcError::other("disk on fire").into();
        assert_eq!(status, Status::internal("disk on fire"));

        let status: Status = RpcError::Encode("bad".into()).into();
        assert_eq!(status.code(), Code::Internal);

        let status: Status = ChannelError::Closed.into();
        assert_eq!(status.code(), Code::Internal);
    }

    #[test]
    fn test_explicit_status_passes_through() {
        let status: Status = RpcError::from(Status::conflict("exists")).into();
        assert_eq!(status, Status::conflict("exists"));

        let status: Status = ChannelError::Terminated(Status::not_found("x")).into();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[test]
    fn test_ok_status_as_error_is_internal() {
        let status: Status = RpcError::from(Status::ok()).into();
        assert_eq!(status.code(), Code::Internal);
    }

    #[tokio::test]
    async fn test_panic_maps_to_internal() {
        let err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        let status = from_join_error(err);
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("boom"));
    }
}
