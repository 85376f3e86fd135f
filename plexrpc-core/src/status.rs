//! Terminal RPC statuses.

use std::fmt;

use crate::code::Code;
use crate::metadata::Metadata;

/// The terminal outcome of one call attempt: a status code, an optional
/// human-readable message, and trailing metadata received with the status.
///
/// # Example
///
/// ```
/// use plexrpc_core::{Code, Status};
///
/// let status = Status::new(Code::Unavailable, "connection refused");
/// assert_eq!(status.code(), Code::Unavailable);
/// assert!(!status.is_ok());
/// ```
#[derive(Clone, Debug)]
pub struct Status {
    code: Code,
    message: Option<String>,
    trailers: Metadata,
}

impl Status {
    /// Create a new status with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: Some(message.into()),
            trailers: Metadata::new(),
        }
    }

    /// Create a new status with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
            trailers: Metadata::new(),
        }
    }

    /// The OK status.
    pub fn ok() -> Self {
        Self::from_code(Code::Ok)
    }

    /// Get the status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the status message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Trailing metadata received with this status.
    pub fn trailers(&self) -> &Metadata {
        &self.trailers
    }

    /// Attach trailing metadata.
    pub fn with_trailers(mut self, trailers: Metadata) -> Self {
        self.trailers = trailers;
        self
    }

    /// Whether this status is OK.
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    // Convenience constructors for the codes the engine produces itself.

    /// Create a cancelled status.
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Cancelled, message)
    }

    /// Create a deadline exceeded status.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create an internal error status.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an unavailable status.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}
