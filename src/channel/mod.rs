//! Channel module
//!
//! The writable-connection abstraction a [`FileBody`](crate::body::FileBody)
//! is written to, plus [`StreamChannel`], a task-driven implementation over
//! tokio streams with `sendfile(2)` on Linux.

use std::io;
use thiserror::Error;

pub mod promise;
pub mod stream;
pub mod transfer;
pub mod zero_copy;

pub use promise::{transfer_promise, TransferFuture, TransferListener, TransferPromise};
pub use stream::{ChannelStream, Plain, Secured, StreamChannel};
pub use transfer::{ChunkedFile, FileHandle, FileRegion, Transfer};

/// Channel errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File ended after {transferred} of {expected} bytes")]
    UnexpectedEof { expected: u64, transferred: u64 },
}

impl ChannelError {
    /// Build an equivalent error for a second observer.
    ///
    /// `io::Error` is not `Clone`, so the kind and message are carried over.
    pub(crate) fn replicate(&self) -> Self {
        match self {
            Self::Closed => Self::Closed,
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::UnexpectedEof {
                expected,
                transferred,
            } => Self::UnexpectedEof {
                expected: *expected,
                transferred: *transferred,
            },
        }
    }
}

/// An open, writable outbound connection.
///
/// Submissions are asynchronous: `submit` queues the transfer and hands back a
/// [`TransferFuture`] that completes once the bytes are written (or the
/// channel fails). Everything submitted is written in submission order.
pub trait Channel: Send + Sync {
    /// Whether the channel runs over an encrypted transport
    fn is_secure(&self) -> bool;

    /// Queue a body transfer
    fn submit(&self, transfer: Transfer) -> Result<TransferFuture, ChannelError>;

    /// Queue the empty end-of-body marker and flush
    fn write_terminal_marker(&self) -> Result<(), ChannelError>;
}

impl<C: Channel + ?Sized> Channel for std::sync::Arc<C> {
    fn is_secure(&self) -> bool {
        (**self).is_secure()
    }

    fn submit(&self, transfer: Transfer) -> Result<TransferFuture, ChannelError> {
        (**self).submit(transfer)
    }

    fn write_terminal_marker(&self) -> Result<(), ChannelError> {
        (**self).write_terminal_marker()
    }
}
