//! Progress reporting
//!
//! [`ProgressSink`] is the notification surface a [`FileBody`](crate::body::FileBody)
//! writes into. Progress updates are optional; the [`Completion`] is delivered
//! exactly once for every `write` call that returned `Ok`.

use crate::body::BodyError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, trace, warn};

/// Final outcome of a scheduled body transfer
#[derive(Debug)]
pub struct Completion {
    /// Content length reported to the caller before the write
    pub content_length: u64,
    /// Bytes transferred, or why the transfer failed
    pub result: Result<u64, BodyError>,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn bytes_transferred(&self) -> Option<u64> {
        self.result.as_ref().ok().copied()
    }
}

/// Consumer of transfer progress and completion notifications
pub trait ProgressSink: Send + Sync {
    /// Cumulative bytes written so far out of `total`
    fn on_progress(&self, _transferred: u64, _total: u64) {}

    /// Final notification
    fn on_complete(&self, completion: Completion);
}

/// Sink that hands the completion to an awaiting task
///
/// ```no_run
/// # async fn example() {
/// use filebody::progress::CompletionSignal;
///
/// let (sink, done) = CompletionSignal::new();
/// // ... body.write(&channel, WriteContext::new(sink, length))?;
/// let completion = done.await.expect("sink dropped");
/// # }
/// ```
pub struct CompletionSignal {
    tx: Mutex<Option<oneshot::Sender<Completion>>>,
}

impl CompletionSignal {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }
}

impl ProgressSink for CompletionSignal {
    fn on_complete(&self, completion: Completion) {
        if let Some(tx) = self.tx.lock().take() {
            // Receiver gone means nobody is waiting any more.
            let _ = tx.send(completion);
        }
    }
}

/// Sink that only logs
#[derive(Debug, Default)]
pub struct LoggingSink;

impl ProgressSink for LoggingSink {
    fn on_progress(&self, transferred: u64, total: u64) {
        trace!(transferred, total, "body transfer progress");
    }

    fn on_complete(&self, completion: Completion) {
        match &completion.result {
            Ok(bytes) => info!(
                bytes,
                content_length = completion.content_length,
                "body transfer finished"
            ),
            Err(e) => warn!(
                error = %e,
                content_length = completion.content_length,
                "body transfer failed"
            ),
        }
    }
}
