//! Client-side RPC execution engine.
//!
//! This crate drives the client half of an RPC exchange over a pluggable
//! transport: it resolves per-call options, runs a middleware pipeline at
//! fixed lifecycle points, bridges the transport's one-shot completions back
//! into async tasks, and retries transient failures with capped exponential
//! backoff.
//!
//! ## Features
//!
//! - Unary calls with automatic retries and per-attempt deadlines
//! - Server streaming calls (never retried)
//! - Layered call options: per-call > per-method QoS > static config
//! - Middleware hooks for call start, message send/receive and completion
//! - Cooperative cancellation that also interrupts retry backoff
//!
//! ## Example
//!
//! ```ignore
//! use plexrpc_client::{CallOptions, RpcClientBuilder};
//! use plexrpc_client::middleware::LoggingMiddleware;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let client = RpcClientBuilder::new("greeter-client", channel)
//!     .with_middleware(Arc::new(LoggingMiddleware))
//!     .retry_config_json(r#"{ "attempts": 3 }"#)?
//!     .build()?;
//!
//! let response = client
//!     .perform_unary_call(
//!         "greeter.v1.Greeter/SayHello",
//!         request_bytes,
//!         CallOptions::new().timeout(Duration::from_secs(2)),
//!     )
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`call`]: call lifecycle, unary orchestration and streams
//! - [`channel`]: the transport seam
//! - [`completion`]: one-shot completion bridge and cancellation
//! - [`config`]: retry policy, call options and channel arguments
//! - [`middleware`]: the lifecycle hook pipeline

mod builder;
mod client;

pub mod call;
pub mod channel;
pub mod completion;
pub mod config;
pub mod error;
pub mod middleware;

pub use builder::RpcClientBuilder;
pub use call::{CallContext, CallKind, InputStream, SpanMode, UnaryResponse};
pub use client::RpcClient;
pub use completion::CancellationToken;
pub use config::CallOptions;
pub use error::{ConfigError, RpcError};

pub use plexrpc_core::{Code, Metadata, Status};
