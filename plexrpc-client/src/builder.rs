//! Client construction.

use std::sync::Arc;

use crate::call::SpanMode;
use crate::channel::Channel;
use crate::client::{ClientInner, RpcClient};
use crate::config::{ChannelArgumentsBuilder, ChannelTuning, ClientQos, RetryConfig};
use crate::error::ConfigError;
use crate::middleware::{Middleware, MiddlewarePipeline};

/// Builder for [`RpcClient`].
///
/// Configuration faults are detected here, at construction time; a built
/// client never fails a call because of bad static configuration.
///
/// # Example
///
/// ```no_run
/// use plexrpc_client::RpcClientBuilder;
/// use plexrpc_client::middleware::LoggingMiddleware;
/// use std::sync::Arc;
///
/// # fn demo(channel: Arc<dyn plexrpc_client::channel::Channel>) -> Result<(), Box<dyn std::error::Error>> {
/// let client = RpcClientBuilder::new("greeter-client", channel)
///     .with_middleware(Arc::new(LoggingMiddleware))
///     .retry_config_json(r#"{ "attempts": 3 }"#)?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RpcClientBuilder {
    client_name: String,
    channel: Arc<dyn Channel>,
    middlewares: Vec<Arc<dyn Middleware>>,
    tuning: ChannelTuning,
    service_config: Option<String>,
    retry_config: RetryConfig,
    client_qos: ClientQos,
    span_mode: SpanMode,
}

impl RpcClientBuilder {
    /// Start building a client for `channel`, identified by `client_name` in
    /// logs and spans.
    pub fn new(client_name: impl Into<String>, channel: Arc<dyn Channel>) -> Self {
        Self {
            client_name: client_name.into(),
            channel,
            middlewares: Vec::new(),
            tuning: ChannelTuning::default(),
            service_config: None,
            retry_config: RetryConfig::default(),
            client_qos: ClientQos::default(),
            span_mode: SpanMode::default(),
        }
    }

    /// Append a middleware. Hooks run in the order middlewares were added.
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Set transport tuning for the channel.
    pub fn channel_tuning(mut self, tuning: ChannelTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Attach a service routing policy document (opaque JSON). Validated in
    /// [`build`](Self::build).
    pub fn service_config(mut self, document: impl Into<String>) -> Self {
        self.service_config = Some(document.into());
        self
    }

    /// Set the static retry configuration.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Parse the static retry configuration from JSON.
    pub fn retry_config_json(mut self, document: &str) -> Result<Self, ConfigError> {
        self.retry_config = RetryConfig::from_json(document)?;
        Ok(self)
    }

    /// Set per-method QoS policies.
    pub fn client_qos(mut self, qos: ClientQos) -> Self {
        self.client_qos = qos;
        self
    }

    /// Parse per-method QoS policies from JSON.
    pub fn client_qos_json(mut self, document: &str) -> Result<Self, ConfigError> {
        self.client_qos = ClientQos::from_json(document)?;
        Ok(self)
    }

    /// Choose how tracing spans relate to retried attempts.
    pub fn span_mode(mut self, mode: SpanMode) -> Self {
        self.span_mode = mode;
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> Result<RpcClient, ConfigError> {
        self.retry_config.validate()?;

        let mut args_builder = ChannelArgumentsBuilder::new(self.tuning);
        if let Some(document) = &self.service_config {
            args_builder = args_builder.service_config(document)?;
        }
        let channel_args = args_builder.build_with_qos(&self.client_qos);

        Ok(RpcClient::from_inner(ClientInner {
            client_name: Arc::from(self.client_name),
            channel: self.channel,
            pipeline: MiddlewarePipeline::new(self.middlewares),
            channel_args,
            retry_config: self.retry_config,
            client_qos: self.client_qos,
            span_mode: self.span_mode,
        }))
    }
}
