//! One-shot bridge between a transport operation and a suspended task.
//!
//! A transport accepts an operation together with a [`CompletionToken`] and,
//! when the network event fires, calls [`CompletionToken::notify`] from
//! whatever thread handles I/O. The task that issued the operation suspends on
//! the paired [`CompletionWaiter`], racing the completion against a deadline
//! timer and caller cancellation. Exactly one resumption occurs: the first
//! signal wins and the losers are discarded as no-ops.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Result of waiting for a transport operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The transport reported the operation as successful.
    Ok,
    /// The transport reported the operation as failed, or abandoned it
    /// without notifying.
    Error,
    /// The wait deadline expired before the operation completed.
    DeadlineExpired,
    /// The caller cancelled the wait.
    Cancelled,
}

/// Create a linked completion pair for one pending transport operation.
pub fn completion() -> (CompletionToken, CompletionWaiter) {
    let (tx, rx) = oneshot::channel();
    let token = CompletionToken {
        tx: Arc::new(Mutex::new(Some(tx))),
    };
    (token, CompletionWaiter { rx })
}

/// Notification handle held by the transport.
///
/// Cloneable so the transport can stash it wherever its I/O machinery needs;
/// all clones refer to the same one-shot slot.
#[derive(Clone, Debug)]
pub struct CompletionToken {
    tx: Arc<Mutex<Option<oneshot::Sender<bool>>>>,
}

impl CompletionToken {
    /// Record the operation outcome and wake the suspended waiter, if any.
    ///
    /// Only the first call has any effect; the token is inert afterwards.
    /// Returns whether this call was the effective one.
    pub fn notify(&self, ok: bool) -> bool {
        let sender = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        match sender {
            // A send error means the waiter already gave up (deadline or
            // cancellation won the race); that is a no-op by design of the
            // race, so the notify itself still counts as effective.
            Some(tx) => {
                let _ = tx.send(ok);
                true
            }
            None => false,
        }
    }

    /// Whether `notify` has already been called.
    pub fn is_notified(&self) -> bool {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}

/// Suspension handle held by the calling task.
pub struct CompletionWaiter {
    rx: oneshot::Receiver<bool>,
}

impl CompletionWaiter {
    /// Suspend until the transport notifies.
    pub async fn wait(self) -> WaitOutcome {
        match self.rx.await {
            Ok(true) => WaitOutcome::Ok,
            Ok(false) => WaitOutcome::Error,
            Err(_) => WaitOutcome::Error,
        }
    }

    /// Suspend until the transport notifies, the deadline expires, or the
    /// caller cancels, whichever fires first.
    pub async fn wait_until(
        self,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            // A completion that has already fired wins ties against the
            // timer and cancellation.
            biased;
            result = self.rx => match result {
                Ok(true) => WaitOutcome::Ok,
                Ok(false) => WaitOutcome::Error,
                Err(_) => WaitOutcome::Error,
            },
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            _ = timer => WaitOutcome::DeadlineExpired,
        }
    }
}

/// Caller-driven cancellation signal.
///
/// Unlike a completion token this can be awaited repeatedly: the retry loop
/// checks it at the top of every attempt and races it against backoff sleeps.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Suspend until cancellation is requested. Resolves immediately if it
    /// already was.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register with the notifier before re-checking the flag, so a
            // cancel between the check and the await cannot be missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_notify_wakes_waiter() {
        let (token, waiter) = completion();
        token.notify(true);
        assert_eq!(waiter.wait().await, WaitOutcome::Ok);
    }

    #[tokio::test]
    async fn test_notify_not_ok_is_error() {
        let (token, waiter) = completion();
        token.notify(false);
        assert_eq!(waiter.wait().await, WaitOutcome::Error);
    }

    #[tokio::test]
    async fn test_second_notify_is_noop() {
        let (token, waiter) = completion();
        assert!(token.notify(false));
        // The second notify must not change the recorded outcome.
        assert!(!token.notify(true));
        assert!(token.is_notified());
        assert_eq!(waiter.wait().await, WaitOutcome::Error);
    }

    #[tokio::test]
    async fn test_abandoned_operation_is_error() {
        let (token, waiter) = completion();
        drop(token);
        assert_eq!(waiter.wait().await, WaitOutcome::Error);
    }

    #[tokio::test]
    async fn test_notify_from_another_thread() {
        let (token, waiter) = completion();
        let handle = std::thread::spawn(move || token.notify(true));
        assert_eq!(waiter.wait().await, WaitOutcome::Ok);
        assert!(handle.join().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_beats_missing_completion() {
        let (token, waiter) = completion();
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + Duration::from_millis(50);
        let outcome = waiter.wait_until(Some(deadline), &cancel).await;
        assert_eq!(outcome, WaitOutcome::DeadlineExpired);
        // The late notify is a no-op for the (gone) waiter but still marks
        // the token inert.
        assert!(token.notify(true));
        assert!(token.is_notified());
    }

    #[tokio::test]
    async fn test_cancellation_beats_missing_completion() {
        let (_token, waiter) = completion();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = waiter.wait_until(None, &cancel).await;
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_cancellation_token_wakes_waiter() {
        let cancel = CancellationToken::new();
        let observer = cancel.clone();
        let task = tokio::spawn(async move { observer.cancelled().await });
        tokio::task::yield_now().await;
        cancel.cancel();
        task.await.unwrap();
        assert!(cancel.is_cancelled());
    }
}
