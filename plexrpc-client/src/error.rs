//! Error types for the client engine.

use plexrpc_core::{Code, Status};

/// Error raised by a middleware hook.
///
/// Middleware faults are programming or configuration errors, not transient
/// network conditions, so they are never retried.
pub type MiddlewareError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by the public call API.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The call finished with a non-OK terminal status.
    #[error("rpc failed with status {status}")]
    Status {
        /// The terminal status of the last attempt.
        status: Status,
    },

    /// A middleware hook failed; the call was aborted without consulting the
    /// retry policy.
    #[error("middleware failure during rpc")]
    Middleware {
        #[source]
        source: MiddlewareError,
    },

    /// The call was constructed with invalid configuration.
    #[error("invalid call configuration")]
    Config {
        #[from]
        source: ConfigError,
    },
}

impl RpcError {
    pub(crate) fn from_status(status: Status) -> Self {
        RpcError::Status { status }
    }

    /// The status code of this error.
    ///
    /// Middleware failures report [`Code::Internal`], configuration faults
    /// [`Code::InvalidArgument`].
    pub fn code(&self) -> Code {
        match self {
            RpcError::Status { status } => status.code(),
            RpcError::Middleware { .. } => Code::Internal,
            RpcError::Config { .. } => Code::InvalidArgument,
        }
    }

    /// The terminal status, if the call reached one.
    pub fn status(&self) -> Option<&Status> {
        match self {
            RpcError::Status { status } => Some(status),
            _ => None,
        }
    }
}

/// Error detected while validating client or channel configuration.
///
/// Configuration faults surface at construction time, never at call time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("retry attempts must be >= 1, got {0}")]
    InvalidAttempts(u32),

    #[error("cannot parse service routing config: {0}")]
    InvalidServiceConfig(#[source] serde_json::Error),

    #[error("cannot parse config document: {0}")]
    InvalidDocument(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_code() {
        let err = RpcError::from_status(Status::new(Code::NotFound, "missing"));
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.status().unwrap().message(), Some("missing"));

        let err = RpcError::Middleware {
            source: "auth hook failed".into(),
        };
        assert_eq!(err.code(), Code::Internal);
        assert!(err.status().is_none());
    }

    #[test]
    fn test_rpc_error_display() {
        let err = RpcError::from_status(Status::unavailable("down"));
        assert_eq!(err.to_string(), "rpc failed with status unavailable: down");
    }
}
