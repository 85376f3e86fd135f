//! Configuration for the client engine:
//! - [`CallOptions`]: per-call timeout, attempts, metadata
//! - [`RetryConfig`] / [`RetryBackoff`]: retry budget and backoff schedule
//! - [`ChannelArgumentsBuilder`]: one-time channel argument composition

mod channel_args;
mod options;
mod retry;

pub use channel_args::{ChannelArguments, ChannelArgumentsBuilder, ChannelTuning};
pub use options::{CallOptions, ClientQos, Qos, ResolvedCallOptions, resolve_call_options};
pub use retry::{RetryBackoff, RetryConfig, defaults, is_retryable, total_timeout};
