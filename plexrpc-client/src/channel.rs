//! The transport seam.
//!
//! The engine treats the wire-level transport as a black box behind the
//! [`Channel`] trait: it hands the transport an operation plus a completion
//! token and suspends until the transport signals one-shot completion. The
//! transport writes the reply into the operation's slot *before* notifying,
//! which establishes the happens-before edge the resuming task relies on.

use std::sync::Arc;
use std::sync::Mutex;

use bytes::Bytes;
use plexrpc_core::{Metadata, Status};
use tokio::time::Instant;

use crate::completion::{CompletionToken, CompletionWaiter, completion};

/// Per-attempt context handed to the transport: the absolute deadline for the
/// attempt and the outgoing metadata, both frozen at operation start.
#[derive(Clone, Debug)]
pub struct ClientContext {
    deadline: Option<Instant>,
    metadata: Metadata,
    propagate_deadline: bool,
}

impl ClientContext {
    /// Build a context from an attempt deadline and outgoing metadata.
    pub fn new(deadline: Option<Instant>, metadata: Metadata, propagate_deadline: bool) -> Self {
        Self {
            deadline,
            metadata,
            propagate_deadline,
        }
    }

    /// Absolute deadline for this attempt, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Outgoing metadata for this attempt.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Whether the transport should forward [`deadline`](Self::deadline) to
    /// the server (e.g. as a wire-level timeout header) so the server can
    /// abandon work the client will no longer wait for.
    pub fn propagate_deadline(&self) -> bool {
        self.propagate_deadline
    }
}

/// The reply to a unary operation: terminal status plus the serialized
/// response payload when the status is OK.
#[derive(Clone, Debug)]
pub struct UnaryReply {
    pub status: Status,
    pub payload: Option<Bytes>,
}

/// One item produced by a server-streaming read operation.
#[derive(Clone, Debug)]
pub enum StreamItem {
    /// A response message arrived; more may follow.
    Message(Bytes),
    /// The stream terminated with this status. No further reads will
    /// produce anything.
    Finished(Status),
}

/// A pending unary operation, owned by the transport until it completes it.
pub struct UnaryOperation {
    slot: Arc<Mutex<Option<UnaryReply>>>,
    token: CompletionToken,
}

impl UnaryOperation {
    pub(crate) fn create() -> (Self, CompletionWaiter, Arc<Mutex<Option<UnaryReply>>>) {
        let (token, waiter) = completion();
        let slot = Arc::new(Mutex::new(None));
        let op = Self {
            slot: Arc::clone(&slot),
            token,
        };
        (op, waiter, slot)
    }

    /// Store the reply and wake the caller. At most one of `complete` /
    /// `abort` takes effect; later calls are no-ops.
    pub fn complete(&self, reply: UnaryReply) {
        {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                *slot = Some(reply);
            }
        }
        self.token.notify(true);
    }

    /// Report transport-level failure without a status (the completion-queue
    /// `ok=false` path). The engine synthesizes an internal status.
    pub fn abort(&self) {
        self.token.notify(false);
    }
}

/// A pending read on a server stream, owned by the transport until it
/// completes it.
pub struct ReadOperation {
    slot: Arc<Mutex<Option<StreamItem>>>,
    token: CompletionToken,
}

impl ReadOperation {
    pub(crate) fn create() -> (Self, CompletionWaiter, Arc<Mutex<Option<StreamItem>>>) {
        let (token, waiter) = completion();
        let slot = Arc::new(Mutex::new(None));
        let op = Self {
            slot: Arc::clone(&slot),
            token,
        };
        (op, waiter, slot)
    }

    /// Store the next stream item and wake the reader.
    pub fn complete(&self, item: StreamItem) {
        {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                *slot = Some(item);
            }
        }
        self.token.notify(true);
    }

    /// Report transport-level failure for this read.
    pub fn abort(&self) {
        self.token.notify(false);
    }
}

/// Wire-level transport for one destination.
///
/// Implementations must be thread-safe and reentrant; the engine issues
/// operations from unlimited concurrent calls. Connection pooling and
/// multiplexing are the transport's concern.
pub trait Channel: Send + Sync {
    /// Start a unary exchange. The transport must eventually call
    /// `op.complete` or `op.abort`, from any thread.
    fn start_unary(&self, ctx: &ClientContext, call_name: &str, request: Bytes, op: UnaryOperation);

    /// Open a server stream. Errors during connection establishment are
    /// surfaced through the first read on the returned session.
    fn start_server_stream(
        &self,
        ctx: &ClientContext,
        call_name: &str,
        request: Bytes,
    ) -> Box<dyn StreamSession>;
}

/// One open server-streaming exchange.
pub trait StreamSession: Send {
    /// Request the next item. The transport must eventually call
    /// `op.complete` or `op.abort`, from any thread.
    fn read(&mut self, op: ReadOperation);
}
