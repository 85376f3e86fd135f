//! Middleware pipeline for call lifecycle events.
//!
//! Middlewares are registered once at client construction time; the order of
//! registration is a deployment contract (authentication before logging, and
//! so on) and is preserved exactly for every hook on every call. Each hook
//! has a default no-op implementation, so a middleware implements only the
//! lifecycle points it cares about.

use std::sync::Arc;

use plexrpc_core::Status;
use tracing::warn;

use crate::call::{CallContext, CallState};
use crate::error::MiddlewareError;

/// A cross-cutting handler invoked at fixed points of a call's lifecycle.
///
/// Implementations are shared, read-mostly, and invoked concurrently from
/// independent calls; per-call data belongs in the [`CallContext`], never in
/// the middleware itself.
///
/// An error returned from any hook aborts the pipeline for that hook and
/// fails the attempt as a non-retryable middleware fault.
pub trait Middleware: Send + Sync {
    /// Runs before the outgoing call object is built; may mutate outgoing
    /// metadata.
    fn pre_start_call(&self, context: &mut CallContext<'_>) -> Result<(), MiddlewareError> {
        let _ = context;
        Ok(())
    }

    /// Runs once per outgoing message, before it is handed to the transport.
    fn pre_send_message(
        &self,
        context: &mut CallContext<'_>,
        message: &[u8],
    ) -> Result<(), MiddlewareError> {
        let _ = (context, message);
        Ok(())
    }

    /// Runs once per received message.
    fn post_recv_message(
        &self,
        context: &mut CallContext<'_>,
        message: &[u8],
    ) -> Result<(), MiddlewareError> {
        let _ = (context, message);
        Ok(())
    }

    /// Runs exactly once per attempt with the terminal status, on every
    /// path including failures.
    fn post_finish(
        &self,
        context: &mut CallContext<'_>,
        status: &Status,
    ) -> Result<(), MiddlewareError> {
        let _ = (context, status);
        Ok(())
    }
}

/// Which lifecycle hooks fire during one pipeline run.
#[derive(Clone, Copy, Default)]
pub struct Hooks<'m> {
    start_call: bool,
    send_message: Option<&'m [u8]>,
    recv_message: Option<&'m [u8]>,
    status: Option<&'m Status>,
}

impl<'m> Hooks<'m> {
    /// Hooks for starting a call: `pre_start_call`, plus `pre_send_message`
    /// when the call carries an initial request message.
    pub fn start_call(request: Option<&'m [u8]>) -> Self {
        Self {
            start_call: true,
            send_message: request,
            ..Self::default()
        }
    }

    /// Hooks for one received streaming message.
    pub fn recv_message(message: &'m [u8]) -> Self {
        Self {
            recv_message: Some(message),
            ..Self::default()
        }
    }

    /// Hooks for attempt completion: `post_recv_message` for the response if
    /// the status is OK, then `post_finish` with the status.
    pub fn finish(status: &'m Status, response: Option<&'m [u8]>) -> Self {
        Self {
            recv_message: if status.is_ok() { response } else { None },
            status: Some(status),
            ..Self::default()
        }
    }

    fn run(
        &self,
        middleware: &dyn Middleware,
        context: &mut CallContext<'_>,
    ) -> Result<(), MiddlewareError> {
        if self.start_call {
            middleware.pre_start_call(context)?;
        }
        if let Some(message) = self.send_message {
            middleware.pre_send_message(context, message)?;
        }
        if let Some(message) = self.recv_message {
            middleware.post_recv_message(context, message)?;
        }
        if let Some(status) = self.status {
            middleware.post_finish(context, status)?;
        }
        Ok(())
    }
}

/// Ordered, immutable set of middlewares, fixed at construction.
///
/// The pipeline holds no per-call state; everything mutable travels in the
/// [`CallContext`] passed through.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("count", &self.middlewares.len())
            .finish()
    }
}

impl MiddlewarePipeline {
    /// Build a pipeline from middlewares in invocation order.
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Run the selected hooks across all middlewares in registration order.
    ///
    /// A hook error skips the remaining middlewares, is logged, and
    /// propagates to the orchestration as a non-retryable fault.
    pub fn run(&self, state: &mut CallState, hooks: Hooks<'_>) -> Result<(), MiddlewareError> {
        let mut context = CallContext::new(state);
        for middleware in &self.middlewares {
            if let Err(error) = hooks.run(middleware.as_ref(), &mut context) {
                warn!(
                    call_name = context.call_name(),
                    attempt = context.attempt(),
                    %error,
                    "middleware hook failed, aborting pipeline"
                );
                return Err(error);
            }
        }
        Ok(())
    }
}

/// Middleware that logs call start and completion.
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn pre_start_call(&self, context: &mut CallContext<'_>) -> Result<(), MiddlewareError> {
        tracing::debug!(
            call_name = context.call_name(),
            attempt = context.attempt(),
            "starting call attempt"
        );
        Ok(())
    }

    fn post_finish(
        &self,
        context: &mut CallContext<'_>,
        status: &Status,
    ) -> Result<(), MiddlewareError> {
        if status.is_ok() {
            tracing::debug!(
                call_name = context.call_name(),
                attempt = context.attempt(),
                "call attempt finished"
            );
        } else {
            tracing::info!(
                call_name = context.call_name(),
                attempt = context.attempt(),
                code = %status.code(),
                "call attempt failed"
            );
        }
        Ok(())
    }
}
