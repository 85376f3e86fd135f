//! Unary call orchestration: the per-attempt state machine plus the retry
//! loop tying together middleware, backoff and the completion bridge.

use bytes::Bytes;
use plexrpc_core::{Metadata, Status};
use tokio::time::Instant;
use tracing::{Instrument, Span};

use crate::call::state::{CallKind, CallParams, CallState, SpanMode, Stage};
use crate::channel::{Channel, ClientContext, UnaryOperation};
use crate::completion::WaitOutcome;
use crate::config::{RetryBackoff, is_retryable, total_timeout};
use crate::error::RpcError;
use crate::middleware::{Hooks, MiddlewarePipeline};

/// Successful result of a unary call: the serialized response payload and
/// the trailing metadata received with the OK status.
#[derive(Clone, Debug)]
pub struct UnaryResponse {
    payload: Bytes,
    trailers: Metadata,
}

impl UnaryResponse {
    /// The serialized response message.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the response, yielding the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Trailing metadata from the server.
    pub fn trailers(&self) -> &Metadata {
        &self.trailers
    }
}

/// How one attempt ended, before the retry decision.
enum AttemptOutcome {
    Completed(Status, Option<Bytes>),
    CallerCancelled(Status),
}

/// One logical unary call, possibly spanning several attempts.
pub(crate) struct UnaryCall<'a> {
    channel: &'a dyn Channel,
    pipeline: &'a MiddlewarePipeline,
    params: CallParams,
    span_mode: SpanMode,
}

impl<'a> UnaryCall<'a> {
    pub(crate) fn new(
        channel: &'a dyn Channel,
        pipeline: &'a MiddlewarePipeline,
        params: CallParams,
        span_mode: SpanMode,
    ) -> Self {
        Self {
            channel,
            pipeline,
            params,
            span_mode,
        }
    }

    /// Run the retry loop to completion.
    ///
    /// Attempt-level failures are evaluated here; only the final attempt's
    /// failure, or the first non-retryable one, crosses this boundary.
    pub(crate) async fn perform(self, request: Bytes) -> Result<UnaryResponse, RpcError> {
        let max_attempts = self.params.options.attempts;
        let cancel = self.params.options.cancel_token.clone();
        let overall_deadline = self
            .params
            .options
            .timeout
            .map(|timeout| Instant::now() + total_timeout(timeout, max_attempts));

        let call_span = match self.span_mode {
            SpanMode::PerCall => self.make_span(None),
            SpanMode::PerAttempt => Span::none(),
        };

        let mut backoff = RetryBackoff::new();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RpcError::from_status(Status::cancelled("call cancelled")));
            }

            attempt += 1;
            let span = match self.span_mode {
                SpanMode::PerCall => call_span.clone(),
                SpanMode::PerAttempt => self.make_span(Some(attempt)),
            };
            let mut state = CallState::new(
                &self.params,
                CallKind::Unary,
                attempt,
                attempt_deadline(self.params.options.timeout, overall_deadline),
                span,
            );

            let attempt_span = state.span().clone();
            let outcome = self
                .perform_attempt(&mut state, &request)
                .instrument(attempt_span)
                .await?;
            let status = match outcome {
                AttemptOutcome::CallerCancelled(status) => {
                    return Err(RpcError::from_status(status));
                }
                AttemptOutcome::Completed(status, payload) => {
                    if status.is_ok() {
                        return Ok(UnaryResponse {
                            payload: payload.unwrap_or_default(),
                            trailers: status.trailers().clone(),
                        });
                    }
                    status
                }
            };

            if attempt >= max_attempts || !is_retryable(status.code()) {
                return Err(RpcError::from_status(status));
            }

            let delay = backoff.next_attempt_delay();
            if let Some(deadline) = overall_deadline
                && Instant::now() + delay >= deadline
            {
                // The backoff would outlive the overall deadline; return the
                // last terminal failure rather than synthesizing a new one.
                return Err(RpcError::from_status(status));
            }

            tracing::debug!(
                call_name = &*self.params.call_name,
                code = %status.code(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after transient failure"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(RpcError::from_status(Status::cancelled(
                        "call cancelled during retry backoff",
                    )));
                }
            }
        }
    }

    /// Drive the state machine for one attempt, suspending at the completion
    /// bridge.
    async fn perform_attempt(
        &self,
        state: &mut CallState,
        request: &Bytes,
    ) -> Result<AttemptOutcome, RpcError> {
        let cancel = self.params.options.cancel_token.clone();

        if let Err(source) = self.pipeline.run(state, Hooks::start_call(Some(&request[..]))) {
            // The fault terminates the attempt before anything was sent; the
            // message must not go out. The terminal state still reaches
            // post_finish exactly once.
            let status = Status::internal("middleware fault before call start");
            let _ = self.pipeline.run(state, Hooks::finish(&status, None));
            state.finish(status);
            return Err(RpcError::Middleware { source });
        }

        // Middleware had its chance to mutate metadata; freeze it into the
        // outgoing context.
        let ctx = ClientContext::new(
            state.deadline(),
            state.metadata().clone(),
            self.params.options.propagate_deadline,
        );
        state.advance(Stage::MetadataSent);

        let (op, waiter, slot) = UnaryOperation::create();
        self.channel
            .start_unary(&ctx, state.call_name(), request.clone(), op);
        state.advance(Stage::AwaitingResponse);

        let wait = waiter.wait_until(state.deadline(), &cancel).await;
        let caller_cancelled = matches!(wait, WaitOutcome::Cancelled);
        let (status, payload) = match wait {
            WaitOutcome::Ok => match slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
                Some(reply) => (reply.status, reply.payload),
                None => (
                    Status::internal("transport completed without a reply"),
                    None,
                ),
            },
            WaitOutcome::Error => {
                // The transport aborted the operation. Keep a status it
                // managed to record; otherwise synthesize one.
                match slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    Some(reply) if !reply.status.is_ok() => (reply.status, None),
                    _ => (
                        Status::internal("client-side finish completion failed"),
                        None,
                    ),
                }
            }
            WaitOutcome::DeadlineExpired => (
                Status::deadline_exceeded("per-attempt deadline expired"),
                None,
            ),
            WaitOutcome::Cancelled => (Status::cancelled("call cancelled"), None),
        };

        let finish_result = self
            .pipeline
            .run(state, Hooks::finish(&status, payload.as_deref()));
        state.finish(status.clone());
        if let Err(source) = finish_result {
            return Err(RpcError::Middleware { source });
        }

        if caller_cancelled {
            Ok(AttemptOutcome::CallerCancelled(status))
        } else {
            Ok(AttemptOutcome::Completed(status, payload))
        }
    }

    fn make_span(&self, attempt: Option<u32>) -> Span {
        match attempt {
            Some(attempt) => tracing::info_span!(
                "rpc_call",
                otel.kind = "client",
                rpc.method = &*self.params.call_name,
                rpc.attempt = attempt,
            ),
            None => tracing::info_span!(
                "rpc_call",
                otel.kind = "client",
                rpc.method = &*self.params.call_name,
            ),
        }
    }
}

/// Deadline for one attempt: the per-attempt timeout from now, clipped to
/// the overall call deadline.
pub(crate) fn attempt_deadline(
    per_attempt: Option<std::time::Duration>,
    overall: Option<Instant>,
) -> Option<Instant> {
    let from_timeout = per_attempt.map(|timeout| Instant::now() + timeout);
    match (from_timeout, overall) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_attempt_deadline_clips_to_overall() {
        let now = Instant::now();
        let overall = now + Duration::from_millis(100);
        let deadline = attempt_deadline(Some(Duration::from_millis(500)), Some(overall));
        assert_eq!(deadline, Some(overall));

        let deadline = attempt_deadline(Some(Duration::from_millis(50)), Some(overall));
        assert_eq!(deadline, Some(now + Duration::from_millis(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_deadline_without_timeout() {
        assert_eq!(attempt_deadline(None, None), None);

        let overall = Instant::now() + Duration::from_secs(1);
        assert_eq!(attempt_deadline(None, Some(overall)), Some(overall));
    }
}
