//! Status codes and error types.
//!
//! This module provides the core error types used by streamrpc:
//! - [`Code`]: the fixed status taxonomy
//! - [`Status`]: a code plus a human-readable message, one per call
//! - [`EnvelopeError`]: envelope framing errors

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Status codes reported for every call.
///
/// The set is closed: every handler outcome maps to exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Ok = 0,
    #[serde(rename = "canceled", alias = "cancelled")]
    Cancelled = 1,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    Conflict = 6,
    Unimplemented = 12,
    Internal = 13,
}

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Cancelled => "canceled",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::Conflict => "conflict",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
        }
    }

    /// Returns whether this code was produced by the call being cut short
    /// (deadline or cancellation) rather than by the handler itself.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Code::Cancelled | Code::DeadlineExceeded)
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`Code`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseCodeError(());

impl std::fmt::Display for ParseCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown status code")
    }
}

impl std::error::Error for ParseCodeError {}

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Code::Ok),
            "canceled" | "cancelled" => Ok(Code::Cancelled),
            "invalid_argument" => Ok(Code::InvalidArgument),
            "deadline_exceeded" => Ok(Code::DeadlineExceeded),
            "not_found" => Ok(Code::NotFound),
            "conflict" => Ok(Code::Conflict),
            "unimplemented" => Ok(Code::Unimplemented),
            "internal" => Ok(Code::Internal),
            _ => Err(ParseCodeError(())),
        }
    }
}

/// Envelope framing errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Incomplete envelope header.
    #[error("incomplete envelope header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// Invalid frame flags.
    #[error("invalid frame flags: 0x{0:02x}")]
    InvalidFlags(u8),

    /// Envelope payload larger than the configured receive limit.
    #[error("message size {size} bytes exceeds maximum allowed size of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    /// Body ended in the middle of a frame.
    #[error("truncated envelope: expected {expected} payload bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// END_STREAM frame body could not be parsed.
    #[error("malformed end-stream frame: {0}")]
    MalformedEndStream(String),
}

impl From<EnvelopeError> for Status {
    fn from(err: EnvelopeError) -> Self {
        Status::invalid_argument(err.to_string())
    }
}

/// JSON body structure for a non-OK status.
#[derive(Serialize, Deserialize)]
pub struct ErrorResponseBody {
    pub code: Code,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

// ============================================================================
// Status - terminal outcome of one call
// ============================================================================

/// Terminal outcome of an RPC call.
///
/// Exactly one `Status` is delivered per call, including successful ones.
///
/// # Example
///
/// ```
/// use streamrpc_core::{Code, Status};
///
/// let status = Status::not_found("blog not found");
/// assert_eq!(status.code(), Code::NotFound);
/// assert_eq!(status.message(), "blog not found");
/// assert!(!status.is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// Create a new status with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a new status with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: String::new(),
        }
    }

    /// The successful status.
    pub fn ok() -> Self {
        Self::from_code(Code::Ok)
    }

    /// Get the status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the message. Empty when none was given.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this status reports success.
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// Create a cancelled status.
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Cancelled, message)
    }

    /// Create an invalid argument status.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a deadline exceeded status.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create a not found status.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// Create a conflict status.
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Conflict, message)
    }

    /// Create an unimplemented status.
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// Create an internal status.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code.as_str())?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

impl Serialize for Status {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ErrorResponseBody {
            code: self.code,
            message: self.message.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let body = ErrorResponseBody::deserialize(deserializer)?;
        Ok(Status::new(body.code, body.message))
    }
}
