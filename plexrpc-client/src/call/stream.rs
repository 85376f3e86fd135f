//! Server-streaming calls.
//!
//! A stream is never retried: once the first message may have been observed
//! by the caller, replaying the call could duplicate data. Transient failures
//! surface directly as the terminal status.

use bytes::Bytes;
use futures::Stream;
use plexrpc_core::Status;

use crate::call::state::{CallKind, CallParams, CallState, SpanMode, Stage};
use crate::call::unary::attempt_deadline;
use crate::channel::{Channel, ClientContext, ReadOperation, StreamItem, StreamSession};
use crate::completion::{CancellationToken, WaitOutcome};
use crate::error::RpcError;
use crate::middleware::{Hooks, MiddlewarePipeline};

/// Client view of an open server stream.
///
/// Dropping the stream abandons the exchange; the transport observes the
/// session being dropped and tears down its side.
pub struct InputStream<'a> {
    pipeline: &'a MiddlewarePipeline,
    session: Box<dyn StreamSession>,
    state: CallState,
    cancel: CancellationToken,
    finished: bool,
}

impl<'a> InputStream<'a> {
    pub(crate) fn open(
        channel: &dyn Channel,
        pipeline: &'a MiddlewarePipeline,
        params: CallParams,
        span_mode: SpanMode,
        request: Bytes,
    ) -> Result<Self, RpcError> {
        let cancel = params.options.cancel_token.clone();
        let deadline = attempt_deadline(params.options.timeout, None);
        let span = match span_mode {
            // Streams have a single attempt, so both modes produce one span.
            SpanMode::PerCall => stream_span(&params.call_name, None),
            SpanMode::PerAttempt => stream_span(&params.call_name, Some(1)),
        };
        let mut state = CallState::new(&params, CallKind::ServerStream, 1, deadline, span);

        if let Err(source) = pipeline.run(&mut state, Hooks::start_call(Some(&request[..]))) {
            let status = Status::internal("middleware fault before call start");
            let _ = pipeline.run(&mut state, Hooks::finish(&status, None));
            state.finish(status);
            return Err(RpcError::Middleware { source });
        }

        let ctx = ClientContext::new(
            state.deadline(),
            state.metadata().clone(),
            params.options.propagate_deadline,
        );
        state.advance(Stage::MetadataSent);
        let session = channel.start_server_stream(&ctx, state.call_name(), request);
        state.advance(Stage::AwaitingResponse);

        Ok(Self {
            pipeline,
            session,
            state,
            cancel,
            finished: false,
        })
    }

    /// Read the next message from the stream.
    ///
    /// Returns `Ok(Some(payload))` per message, `Ok(None)` when the stream
    /// finished with an OK status, and an error when it finished otherwise.
    /// After a terminal result every further call returns that the stream is
    /// over.
    pub async fn next_message(&mut self) -> Result<Option<Bytes>, RpcError> {
        if self.finished {
            return match self.state.status() {
                Some(status) if status.is_ok() => Ok(None),
                Some(status) => Err(RpcError::from_status(status.clone())),
                None => Ok(None),
            };
        }

        if self.state.stage() == Stage::MessageReceived {
            self.state.advance(Stage::AwaitingResponse);
        }

        let (op, waiter, slot) = ReadOperation::create();
        self.session.read(op);

        let wait = waiter.wait_until(self.state.deadline(), &self.cancel).await;
        let item = match wait {
            WaitOutcome::Ok => slot.lock().unwrap_or_else(|e| e.into_inner()).take(),
            WaitOutcome::Error => Some(StreamItem::Finished(Status::internal(
                "client-side read completion failed",
            ))),
            WaitOutcome::DeadlineExpired => Some(StreamItem::Finished(
                Status::deadline_exceeded("stream deadline expired"),
            )),
            WaitOutcome::Cancelled => {
                Some(StreamItem::Finished(Status::cancelled("call cancelled")))
            }
        };

        match item {
            Some(StreamItem::Message(payload)) => {
                self.state.advance(Stage::MessageReceived);
                if let Err(source) = self
                    .pipeline
                    .run(&mut self.state, Hooks::recv_message(&payload[..]))
                {
                    // The recv fault is the primary failure; a secondary
                    // fault from the finish hooks does not displace it.
                    let status = Status::internal("middleware fault on received message");
                    let _ = self.terminate(status);
                    return Err(RpcError::Middleware { source });
                }
                Ok(Some(payload))
            }
            Some(StreamItem::Finished(status)) => {
                let is_ok = status.is_ok();
                self.terminate(status.clone())?;
                if is_ok {
                    Ok(None)
                } else {
                    Err(RpcError::from_status(status))
                }
            }
            None => {
                let status = Status::internal("transport completed read without an item");
                self.terminate(status.clone())?;
                Err(RpcError::from_status(status))
            }
        }
    }

    /// The terminal status, once the stream has finished.
    pub fn finish_status(&self) -> Option<&Status> {
        self.state.status()
    }

    /// Adapt the stream to [`futures::Stream`], yielding message payloads
    /// until the server finishes the exchange.
    pub fn into_message_stream(self) -> impl Stream<Item = Result<Bytes, RpcError>> + 'a {
        futures::stream::try_unfold(self, |mut stream| async move {
            match stream.next_message().await? {
                Some(payload) => Ok(Some((payload, stream))),
                None => Ok(None),
            }
        })
    }

    /// Run the finish hooks and record the terminal status. A hook fault
    /// still finishes the stream, then propagates to the caller.
    fn terminate(&mut self, status: Status) -> Result<(), RpcError> {
        let result = self
            .pipeline
            .run(&mut self.state, Hooks::finish(&status, None));
        self.state.finish(status);
        self.finished = true;
        result.map_err(|source| RpcError::Middleware { source })
    }
}

fn stream_span(call_name: &str, attempt: Option<u32>) -> tracing::Span {
    match attempt {
        Some(attempt) => tracing::info_span!(
            "rpc_stream",
            otel.kind = "client",
            rpc.method = call_name,
            rpc.attempt = attempt,
        ),
        None => tracing::info_span!(
            "rpc_stream",
            otel.kind = "client",
            rpc.method = call_name,
        ),
    }
}
