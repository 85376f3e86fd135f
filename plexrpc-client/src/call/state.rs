//! Per-attempt call state and the lifecycle state machine.

use std::sync::Arc;

use plexrpc_core::{Metadata, Status};
use tokio::time::Instant;
use tracing::Span;

use crate::config::ResolvedCallOptions;

/// What shape of exchange a call is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Unary,
    ServerStream,
}

/// Lifecycle stage of one call attempt.
///
/// Stages advance monotonically; only a streaming call cycles between
/// `AwaitingResponse` and `MessageReceived`. `Finished` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Created,
    MetadataSent,
    AwaitingResponse,
    MessageReceived,
    Finished,
}

impl Stage {
    fn can_advance_to(self, next: Stage) -> bool {
        match (self, next) {
            // Failure can terminate an attempt from any live stage.
            (Stage::Finished, _) => false,
            (_, Stage::Finished) => true,
            (Stage::Created, Stage::MetadataSent) => true,
            (Stage::MetadataSent, Stage::AwaitingResponse) => true,
            (Stage::AwaitingResponse, Stage::MessageReceived) => true,
            (Stage::MessageReceived, Stage::AwaitingResponse) => true,
            _ => false,
        }
    }
}

/// Identity and options of one logical call, immutable for its lifetime.
#[derive(Clone, Debug)]
pub struct CallParams {
    pub client_name: Arc<str>,
    pub call_name: Arc<str>,
    pub options: ResolvedCallOptions,
}

/// Whether retried attempts share one tracing span or each get their own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpanMode {
    /// One span spans the whole logical call, retries included.
    #[default]
    PerCall,
    /// Every attempt opens a fresh span carrying the attempt index.
    PerAttempt,
}

/// Mutable state of one in-flight call attempt.
///
/// Owned exclusively by the orchestration for the duration of the attempt;
/// a retry builds a fresh `CallState` instead of resetting this one, so
/// stale state can never leak between attempts.
#[derive(Debug)]
pub struct CallState {
    client_name: Arc<str>,
    call_name: Arc<str>,
    kind: CallKind,
    attempt: u32,
    stage: Stage,
    started_at: Instant,
    deadline: Option<Instant>,
    span: Span,
    metadata: Metadata,
    status: Option<Status>,
}

impl CallState {
    pub(crate) fn new(
        params: &CallParams,
        kind: CallKind,
        attempt: u32,
        deadline: Option<Instant>,
        span: Span,
    ) -> Self {
        Self {
            client_name: Arc::clone(&params.client_name),
            call_name: Arc::clone(&params.call_name),
            kind,
            attempt,
            stage: Stage::Created,
            started_at: Instant::now(),
            deadline,
            span,
            metadata: params.options.metadata.clone(),
            status: None,
        }
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn call_name(&self) -> &str {
        &self.call_name
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    /// 1-based attempt index within the logical call.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Absolute deadline of this attempt, if the call has a timeout.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Outgoing metadata; middleware may mutate it before the call object is
    /// built.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Terminal status, set exactly once when the attempt finishes.
    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    /// Advance the state machine.
    ///
    /// # Panics
    ///
    /// Panics on a transition the lifecycle does not allow; stages are
    /// driven only by the engine, so an invalid transition is a bug.
    pub(crate) fn advance(&mut self, next: Stage) {
        assert!(
            self.stage.can_advance_to(next),
            "invalid call stage transition {:?} -> {:?}",
            self.stage,
            next
        );
        self.stage = next;
    }

    /// Record the terminal status and move to `Finished`.
    pub(crate) fn finish(&mut self, status: Status) {
        assert!(self.status.is_none(), "attempt already has a terminal status");
        self.status = Some(status);
        self.advance(Stage::Finished);
    }
}

/// Stable facade over [`CallState`] handed to middleware.
///
/// Middleware observes the call through this context only; which parts of
/// the identity persist across retries is controlled by [`SpanMode`].
pub struct CallContext<'a> {
    state: &'a mut CallState,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(state: &'a mut CallState) -> Self {
        Self { state }
    }

    pub fn client_name(&self) -> &str {
        self.state.client_name()
    }

    pub fn call_name(&self) -> &str {
        self.state.call_name()
    }

    pub fn call_kind(&self) -> CallKind {
        self.state.kind()
    }

    pub fn attempt(&self) -> u32 {
        self.state.attempt()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline()
    }

    pub fn span(&self) -> &Span {
        self.state.span()
    }

    /// Outgoing metadata. Mutations are only observed by the transport when
    /// made from the `pre_start_call` hook, before the metadata is sent.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        self.state.metadata_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CallOptions, RetryConfig, resolve_call_options};

    fn test_params() -> CallParams {
        CallParams {
            client_name: Arc::from("greeter-client"),
            call_name: Arc::from("test.Greeter/SayHello"),
            options: resolve_call_options(CallOptions::new(), None, &RetryConfig::default())
                .unwrap(),
        }
    }

    fn test_state(kind: CallKind) -> CallState {
        CallState::new(&test_params(), kind, 1, None, Span::none())
    }

    #[tokio::test]
    async fn test_unary_stage_progression() {
        let mut state = test_state(CallKind::Unary);
        assert_eq!(state.stage(), Stage::Created);
        state.advance(Stage::MetadataSent);
        state.advance(Stage::AwaitingResponse);
        state.finish(Status::ok());
        assert_eq!(state.stage(), Stage::Finished);
        assert!(state.status().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_stream_cycles_between_await_and_message() {
        let mut state = test_state(CallKind::ServerStream);
        state.advance(Stage::MetadataSent);
        state.advance(Stage::AwaitingResponse);
        state.advance(Stage::MessageReceived);
        state.advance(Stage::AwaitingResponse);
        state.advance(Stage::MessageReceived);
        state.finish(Status::ok());
        assert_eq!(state.stage(), Stage::Finished);
    }

    #[tokio::test]
    async fn test_failure_can_finish_from_any_live_stage() {
        let mut state = test_state(CallKind::Unary);
        // A middleware fault in pre_start_call finishes the attempt before
        // metadata was ever sent.
        state.finish(Status::internal("middleware fault"));
        assert_eq!(state.stage(), Stage::Finished);
    }

    #[tokio::test]
    #[should_panic(expected = "invalid call stage transition")]
    async fn test_stage_cannot_be_revisited() {
        let mut state = test_state(CallKind::Unary);
        state.advance(Stage::MetadataSent);
        state.advance(Stage::AwaitingResponse);
        state.advance(Stage::MetadataSent);
    }

    #[tokio::test]
    #[should_panic(expected = "invalid call stage transition")]
    async fn test_finished_is_terminal() {
        let mut state = test_state(CallKind::Unary);
        state.finish(Status::ok());
        state.advance(Stage::AwaitingResponse);
    }

    #[tokio::test]
    async fn test_context_exposes_identity_and_metadata() {
        let mut state = test_state(CallKind::Unary);
        let mut context = CallContext::new(&mut state);
        assert_eq!(context.client_name(), "greeter-client");
        assert_eq!(context.call_name(), "test.Greeter/SayHello");
        assert_eq!(context.attempt(), 1);
        context.metadata_mut().insert("x-injected", "yes").unwrap();
        assert_eq!(state.metadata().get("x-injected"), Some("yes"));
    }
}
