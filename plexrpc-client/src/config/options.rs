//! Per-call options and their merge with quality-of-service policies.

use std::collections::HashMap;
use std::time::Duration;

use plexrpc_core::Metadata;
use serde::Deserialize;

use crate::completion::CancellationToken;
use crate::config::retry::RetryConfig;
use crate::error::ConfigError;

/// Options for one logical call.
///
/// Fields left unset here are filled from the per-method [`Qos`] policy and
/// then from the static [`RetryConfig`], in that priority order.
///
/// # Example
///
/// ```
/// use plexrpc_client::config::CallOptions;
/// use std::time::Duration;
///
/// let options = CallOptions::new()
///     .timeout(Duration::from_secs(5))
///     .attempts(3)
///     .metadata("x-request-id", "abc-123");
/// ```
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    timeout: Option<Duration>,
    attempts: Option<u32>,
    metadata: Metadata,
    propagate_deadline: bool,
    cancel_token: Option<CancellationToken>,
}

impl CallOptions {
    /// Create default options: no timeout, attempt budget from config,
    /// deadline propagation off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-attempt timeout.
    ///
    /// With retries enabled the timeout applies to each attempt; the overall
    /// deadline is bounded by `timeout * attempts`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the attempt budget, including the original attempt.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Add an ASCII metadata entry.
    ///
    /// # Panics
    ///
    /// Panics if the key or value is invalid metadata material.
    pub fn metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .insert(key, value)
            .expect("invalid metadata entry");
        self
    }

    /// Mutable access to the outgoing metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Ask the transport to forward the attempt deadline to the server (for
    /// wire protocols with a timeout header), so the server can abandon work
    /// the client will no longer wait for.
    pub fn propagate_deadline(mut self, enabled: bool) -> Self {
        self.propagate_deadline = enabled;
        self
    }

    /// Attach a caller-held cancellation token. Cancelling it aborts the
    /// call, including any pending retry backoff.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Get the configured per-attempt timeout, if set.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Get the configured attempt budget, if set.
    pub fn get_attempts(&self) -> Option<u32> {
        self.attempts
    }

    /// Borrow the outgoing metadata.
    pub fn get_metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Whether deadline propagation is enabled.
    pub fn deadline_propagation(&self) -> bool {
        self.propagate_deadline
    }
}

/// Per-method quality-of-service policy from a dynamic configuration
/// document.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Qos {
    /// Per-attempt timeout in milliseconds.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: Option<u64>,
    /// Attempt budget, including the original attempt.
    pub attempts: Option<u32>,
}

/// QoS policies for all methods of one client, keyed by full call name
/// (`package.Service/Method`), with an optional default.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientQos {
    #[serde(default)]
    pub methods: HashMap<String, Qos>,
    #[serde(rename = "default")]
    pub default_qos: Option<Qos>,
}

impl ClientQos {
    /// Parse from a JSON configuration document.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(document).map_err(ConfigError::InvalidDocument)
    }

    /// The policy applying to `call_name`: the method entry if present,
    /// otherwise the default.
    pub fn for_method(&self, call_name: &str) -> Option<&Qos> {
        self.methods.get(call_name).or(self.default_qos.as_ref())
    }
}

/// Call options with every layered field resolved to a concrete value.
#[derive(Clone, Debug)]
pub struct ResolvedCallOptions {
    pub timeout: Option<Duration>,
    pub attempts: u32,
    pub metadata: Metadata,
    pub propagate_deadline: bool,
    pub cancel_token: CancellationToken,
}

/// Merge per-call options with the method QoS policy and the static retry
/// config.
///
/// Explicit per-call values win; the QoS policy fills what the caller left
/// unset; the static config is the fallback for the attempt budget. An
/// attempt budget below 1, wherever it came from, is a configuration fault.
pub fn resolve_call_options(
    options: CallOptions,
    qos: Option<&Qos>,
    retry_config: &RetryConfig,
) -> Result<ResolvedCallOptions, ConfigError> {
    let timeout = options
        .timeout
        .or_else(|| qos.and_then(|q| q.timeout_ms).map(Duration::from_millis));

    let attempts = options
        .attempts
        .or_else(|| qos.and_then(|q| q.attempts))
        .unwrap_or_else(|| retry_config.attempts());

    if attempts < 1 {
        return Err(ConfigError::InvalidAttempts(attempts));
    }

    Ok(ResolvedCallOptions {
        timeout,
        attempts,
        metadata: options.metadata,
        propagate_deadline: options.propagate_deadline,
        cancel_token: options.cancel_token.unwrap_or_default(),
    })
}
