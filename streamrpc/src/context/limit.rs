//! Message size limits for inbound and outbound messages.
//!
//! - **Receive limit** (`receive_max_bytes`): an inbound message over the
//!   limit fails the call with `invalid_argument`.
//! - **Send limit** (`send_max_bytes`): an outbound message over the limit
//!   fails the call with `internal`, since the handler produced it.

use streamrpc_core::Status;

/// Configuration for message size limits.
///
/// By default, no limits are applied.
///
/// # Example
///
/// ```rust
/// use streamrpc::MessageLimits;
///
/// let limits = MessageLimits::new()
///     .receive_max_bytes(4 * 1024 * 1024)
///     .send_max_bytes(8 * 1024 * 1024);
/// assert_eq!(limits.get_receive_max_bytes(), Some(4 * 1024 * 1024));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageLimits {
    receive_max_bytes: Option<usize>,
    send_max_bytes: Option<usize>,
}

impl MessageLimits {
    /// Create new limits with no restrictions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum size for inbound messages.
    pub fn receive_max_bytes(mut self, max: usize) -> Self {
        self.receive_max_bytes = Some(max);
        self
    }

    /// Set the maximum size for outbound messages, checked after encoding.
    pub fn send_max_bytes(mut self, max: usize) -> Self {
        self.send_max_bytes = Some(max);
        self
    }

    /// Returns the maximum receive message size, or `None` if unlimited.
    pub fn get_receive_max_bytes(&self) -> Option<usize> {
        self.receive_max_bytes
    }

    /// Returns the maximum send message size, or `None` if unlimited.
    pub fn get_send_max_bytes(&self) -> Option<usize> {
        self.send_max_bytes
    }

    /// Check an inbound message size against the receive limit.
    pub fn check_receive_size(&self, size: usize) -> Result<(), Status> {
        if let Some(max) = self.receive_max_bytes
            && size > max
        {
            return Err(Status::invalid_argument(format!(
                "message size {} bytes exceeds maximum allowed size of {} bytes",
                size, max
            )));
        }
        Ok(())
    }

    /// Check an outbound message size against the send limit.
    pub fn check_send_size(&self, size: usize) -> Result<(), Status> {
        if let Some(max) = self.send_max_bytes
            && size > max
        {
            return Err(Status::internal(format!(
                "message size {} exceeds sendMaxBytes {}",
                size, max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamrpc_core::Code;

    #[test]
    fn test_default_no_limits() {
        let limits = MessageLimits::default();
        assert_eq!(limits.get_receive_max_bytes(), None);
        assert_eq!(limits.get_send_max_bytes(), None);
        assert!(limits.check_receive_size(usize::MAX).is_ok());
        assert!(limits.check_send_size(usize::MAX).is_ok());
    }

    #[test]
    fn test_check_receive_size() {
        let limits = MessageLimits::new().receive_max_bytes(1024);
        assert!(limits.check_receive_size(1024).is_ok());

        let err = limits.check_receive_size(1025).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(err.message().contains("1025"));
    }

    #[test]
    fn test_check_send_size() {
        let limits = MessageLimits::new().send_max_bytes(1024);
        assert!(limits.check_send_size(512).is_ok());

        let err = limits.check_send_size(1025).unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert!(err.message().contains("1024"));
    }
}
