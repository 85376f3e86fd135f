//! The client handle: entry point for issuing calls over a channel.

use std::sync::Arc;

use bytes::Bytes;

use crate::call::{CallParams, InputStream, SpanMode, UnaryCall, UnaryResponse};
use crate::channel::Channel;
use crate::config::{
    CallOptions, ChannelArguments, ClientQos, RetryConfig, resolve_call_options,
};
use crate::error::RpcError;
use crate::middleware::MiddlewarePipeline;

/// A client for one logical service over one channel.
///
/// Cheap to clone; clones share the channel, the middleware pipeline and the
/// configuration. All methods take `&self` and may run concurrently.
///
/// Built with [`RpcClientBuilder`](crate::RpcClientBuilder).
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) client_name: Arc<str>,
    pub(crate) channel: Arc<dyn Channel>,
    pub(crate) pipeline: MiddlewarePipeline,
    pub(crate) channel_args: Arc<ChannelArguments>,
    pub(crate) retry_config: RetryConfig,
    pub(crate) client_qos: ClientQos,
    pub(crate) span_mode: SpanMode,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("client_name", &self.inner.client_name)
            .field("middlewares", &self.inner.pipeline.len())
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    pub(crate) fn from_inner(inner: ClientInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The name this client was registered under.
    pub fn client_name(&self) -> &str {
        &self.inner.client_name
    }

    /// The channel arguments the client was built with.
    pub fn channel_arguments(&self) -> &ChannelArguments {
        &self.inner.channel_args
    }

    /// Perform a unary call: send one serialized request, await one response.
    ///
    /// Runs the full lifecycle including middleware, per-attempt deadlines
    /// and the retry policy resolved from the call options.
    pub async fn perform_unary_call(
        &self,
        call_name: &str,
        request: Bytes,
        options: CallOptions,
    ) -> Result<UnaryResponse, RpcError> {
        let params = self.create_params(call_name, options)?;
        UnaryCall::new(
            self.inner.channel.as_ref(),
            &self.inner.pipeline,
            params,
            self.inner.span_mode,
        )
        .perform(request)
        .await
    }

    /// Open a server stream: send one serialized request, then read response
    /// messages until the server finishes the stream. Streams are never
    /// retried.
    pub fn server_stream(
        &self,
        call_name: &str,
        request: Bytes,
        options: CallOptions,
    ) -> Result<InputStream<'_>, RpcError> {
        let params = self.create_params(call_name, options)?;
        InputStream::open(
            self.inner.channel.as_ref(),
            &self.inner.pipeline,
            params,
            self.inner.span_mode,
            request,
        )
    }

    fn create_params(&self, call_name: &str, options: CallOptions) -> Result<CallParams, RpcError> {
        let qos = self.inner.client_qos.for_method(call_name);
        let resolved = resolve_call_options(options, qos, &self.inner.retry_config)?;
        Ok(CallParams {
            client_name: Arc::clone(&self.inner.client_name),
            call_name: Arc::from(call_name),
            options: resolved,
        })
    }
}
