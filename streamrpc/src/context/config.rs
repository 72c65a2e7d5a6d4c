//! Server configuration - server-wide static settings.
//!
//! Set once when the registry is built, read when each call is admitted.

use crate::context::MessageLimits;
use std::time::Duration;

/// Server-wide configuration for the dispatch registry.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ServerConfig {
    /// Message size limits
    pub limits: MessageLimits,
    /// Server-side timeout (optional)
    pub server_timeout: Option<Duration>,
}
