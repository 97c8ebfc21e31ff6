//! Transfer completion promise
//!
//! A channel keeps the [`TransferPromise`] for each queued transfer and
//! completes it when the bytes are out; the submitter gets the paired
//! [`TransferFuture`] and registers one [`TransferListener`] on it.
//!
//! The listener's `on_complete` runs exactly once:
//! - on the channel's task when the promise is completed,
//! - immediately inside `add_listener` when the outcome is already known,
//! - with [`ChannelError::Closed`] when the promise is dropped unfinished
//!   (the channel died with the transfer still queued or in flight).

use super::ChannelError;
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives progress and the final outcome of one transfer
pub trait TransferListener: Send + 'static {
    /// Called after each write with the cumulative byte count
    fn on_progress(&mut self, _transferred: u64, _total: u64) {}

    /// Called once with the bytes transferred or the failure cause
    fn on_complete(self: Box<Self>, result: Result<u64, ChannelError>);
}

enum State {
    Waiting {
        listener: Option<Box<dyn TransferListener>>,
        /// Latest count reported while no listener was registered
        last_progress: Option<u64>,
    },
    Completed(Option<Result<u64, ChannelError>>),
}

struct Shared {
    state: Mutex<State>,
    total: u64,
}

/// Create a linked promise/future pair for a transfer of `total` bytes
pub fn transfer_promise(total: u64) -> (TransferPromise, TransferFuture) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Waiting {
            listener: None,
            last_progress: None,
        }),
        total,
    });
    (
        TransferPromise {
            shared: Arc::clone(&shared),
            done: false,
        },
        TransferFuture { shared },
    )
}

/// Channel-side half: reports progress and completes the transfer
pub struct TransferPromise {
    shared: Arc<Shared>,
    done: bool,
}

impl TransferPromise {
    /// Total bytes the transfer is expected to move
    pub fn total(&self) -> u64 {
        self.shared.total
    }

    /// Report cumulative progress.
    ///
    /// Without a listener yet, the count is kept and replayed on registration.
    pub fn progress(&self, transferred: u64) {
        let mut state = self.shared.state.lock();
        if let State::Waiting {
            listener,
            last_progress,
        } = &mut *state
        {
            match listener {
                Some(listener) => listener.on_progress(transferred, self.shared.total),
                None => *last_progress = Some(transferred),
            }
        }
    }

    /// Complete the transfer
    pub fn complete(mut self, result: Result<u64, ChannelError>) {
        self.finish(result);
    }

    fn finish(&mut self, result: Result<u64, ChannelError>) {
        if self.done {
            return;
        }
        self.done = true;

        let listener = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Waiting { listener, .. } => {
                    let listener = listener.take();
                    if listener.is_none() {
                        *state = State::Completed(Some(result));
                        return;
                    }
                    *state = State::Completed(None);
                    listener
                }
                State::Completed(_) => return,
            }
        };

        if let Some(listener) = listener {
            listener.on_complete(result);
        }
    }
}

impl Drop for TransferPromise {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!("transfer promise dropped before completion");
            self.finish(Err(ChannelError::Closed));
        }
    }
}

/// Submitter-side half: the pending transfer handle returned by `submit`
pub struct TransferFuture {
    shared: Arc<Shared>,
}

impl TransferFuture {
    pub fn total(&self) -> u64 {
        self.shared.total
    }

    /// Whether the outcome is already known
    pub fn is_done(&self) -> bool {
        matches!(&*self.shared.state.lock(), State::Completed(_))
    }

    /// Register the completion listener.
    ///
    /// Consumes the future, so a transfer has at most one listener.
    pub fn add_listener<L: TransferListener>(self, listener: L) {
        let mut listener: Box<dyn TransferListener> = Box::new(listener);

        let outcome = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Waiting {
                    listener: slot,
                    last_progress,
                } => {
                    if let Some(transferred) = last_progress.take() {
                        listener.on_progress(transferred, self.shared.total);
                    }
                    *slot = Some(listener);
                    return;
                }
                State::Completed(outcome) => outcome.take(),
            }
        };

        match outcome {
            Some(result) => {
                if let Ok(bytes) = &result {
                    listener.on_progress(*bytes, self.shared.total);
                }
                listener.on_complete(result);
            }
            // Completed and already delivered; unreachable with a single future.
            None => listener.on_complete(Err(ChannelError::Closed)),
        }
    }
}
