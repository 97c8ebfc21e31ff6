//! File body module
//!
//! Writes a file, or a byte range of one, as the body of an outbound message.
//!
//! # Flow
//!
//! 1. [`FileBody::new`] / [`FileBody::with_range`] check that the path is a
//!    regular file and that the range fits inside it
//! 2. [`FileBody::write`] opens the file, picks a [`Strategy`] and submits
//!    the transfer to the channel, followed by the end-of-body marker
//! 3. When the channel finishes, the file is closed and the outcome goes to
//!    the [`ProgressSink`]
//!
//! # Example
//!
//! ```no_run
//! use filebody::body::{FileBody, WriteContext};
//! use filebody::channel::StreamChannel;
//! use filebody::config::TransferConfig;
//! use filebody::progress::CompletionSignal;
//! use tokio::net::TcpStream;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TransferConfig::default();
//! let body = FileBody::new("/var/data/report.bin", &config)?;
//! let length = body.content_length();
//!
//! let channel = StreamChannel::spawn(TcpStream::connect("127.0.0.1:8080").await?);
//! let (sink, done) = CompletionSignal::new();
//! body.write(&channel, WriteContext::new(sink, length))?;
//!
//! let completion = done.await?;
//! println!("sent {:?} bytes", completion.bytes_transferred());
//! # Ok(())
//! # }
//! ```

use crate::channel::{Channel, ChannelError, FileHandle, TransferFuture};
use crate::config::TransferConfig;
use crate::progress::ProgressSink;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

mod completion;
mod strategy;

use completion::{CloseFile, CompletionHandler, ForwardToSink};
pub use strategy::Strategy;

/// File body errors
#[derive(Error, Debug)]
pub enum BodyError {
    #[error("File {} is not a file or doesn't exist", path.display())]
    FileNotAccessible { path: PathBuf },

    #[error("Range {offset}+{length} exceeds file size {file_size}")]
    InvalidRange {
        offset: u64,
        length: u64,
        file_size: u64,
    },

    #[error("Failed to open {}: {source}", path.display())]
    FileOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to submit transfer: {0}")]
    TransferSubmissionFailed(#[source] ChannelError),

    #[error("Transfer failed: {0}")]
    TransferFailed(#[source] ChannelError),
}

impl BodyError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileNotAccessible { .. } => "file_not_accessible",
            Self::InvalidRange { .. } => "invalid_range",
            Self::FileOpenFailed { .. } => "file_open_failed",
            Self::TransferSubmissionFailed(_) => "transfer_submission_failed",
            Self::TransferFailed(_) => "transfer_failed",
        }
    }
}

/// What `write` needs to report back
#[derive(Clone)]
pub struct WriteContext {
    sink: Arc<dyn ProgressSink>,
    content_length: u64,
}

impl WriteContext {
    /// `content_length` is the value previously reported to the caller,
    /// normally [`FileBody::content_length`].
    pub fn new(sink: Arc<dyn ProgressSink>, content_length: u64) -> Self {
        Self {
            sink,
            content_length,
        }
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }
}

/// A file (or file range) to be sent as a message body
///
/// Immutable once built. [`write`](FileBody::write) consumes it, so one
/// instance drives exactly one transfer attempt.
#[derive(Debug)]
pub struct FileBody {
    path: PathBuf,
    offset: u64,
    length: u64,
    config: TransferConfig,
    record_metrics: bool,
}

impl FileBody {
    /// Body covering the whole file, sized at construction time
    pub fn new<P: AsRef<Path>>(path: P, config: &TransferConfig) -> Result<Self, BodyError> {
        let path = path.as_ref();
        let file_size = regular_file_size(path)?;
        Ok(Self::build(path, 0, file_size, config))
    }

    /// Body covering `length` bytes starting at `offset`
    pub fn with_range<P: AsRef<Path>>(
        path: P,
        offset: u64,
        length: u64,
        config: &TransferConfig,
    ) -> Result<Self, BodyError> {
        let path = path.as_ref();
        let file_size = regular_file_size(path)?;
        check_range(offset, length, file_size)?;
        Ok(Self::build(path, offset, length, config))
    }

    fn build(path: &Path, offset: u64, length: u64, config: &TransferConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            offset,
            length,
            config: *config,
            record_metrics: true,
        }
    }

    /// Turn transfer metrics on or off for this body
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.record_metrics = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of body bytes; known before anything is sent
    pub fn content_length(&self) -> u64 {
        self.length
    }

    /// Always `None`: the caller supplies content type out of band
    pub fn content_type(&self) -> Option<&str> {
        None
    }

    /// Schedule the body on `channel`.
    ///
    /// Returns once the transfer is queued. On `Ok`, the sink in `context`
    /// receives exactly one completion, after the file has been closed. On
    /// `Err`, the file is already closed and the sink hears nothing.
    pub fn write<C>(self, channel: &C, context: WriteContext) -> Result<(), BodyError>
    where
        C: Channel + ?Sized,
    {
        let strategy = Strategy::select(channel.is_secure(), self.config.is_zero_copy_disabled());
        let span = tracing::info_span!(
            "body.write",
            transfer.id = %uuid::Uuid::new_v4(),
            file = %self.path.display(),
            offset = self.offset,
            length = self.length,
            mode = strategy.as_str(),
        );
        let _enter = span.enter();

        let file = match FileHandle::open(&self.path) {
            Ok(file) => Arc::new(file),
            Err(source) => {
                return Err(self.fail(BodyError::FileOpenFailed {
                    path: absolute_path(&self.path),
                    source,
                }))
            }
        };

        let future = match self.submit(channel, &file, strategy) {
            Ok(future) => future,
            Err(e) => {
                close_quietly(&file);
                return Err(self.fail(e));
            }
        };

        future.add_listener(CompletionHandler {
            cleanup: CloseFile(file),
            forward: ForwardToSink {
                sink: context.sink,
                content_length: context.content_length,
            },
            strategy,
            record_metrics: self.record_metrics,
            started: Instant::now(),
            span: span.clone(),
        });

        // The body is already queued; if the channel is gone its completion
        // reports that, so a marker failure is only logged.
        if let Err(e) = channel.write_terminal_marker() {
            warn!(error = %e, "failed to queue end-of-body marker");
        }

        debug!("file body scheduled");
        Ok(())
    }

    fn submit<C>(
        &self,
        channel: &C,
        file: &Arc<FileHandle>,
        strategy: Strategy,
    ) -> Result<TransferFuture, BodyError>
    where
        C: Channel + ?Sized,
    {
        let file_size = file.len().map_err(|source| BodyError::FileOpenFailed {
            path: absolute_path(&self.path),
            source,
        })?;
        check_range(self.offset, self.length, file_size)?;

        let transfer = strategy.transfer(
            Arc::clone(file),
            self.offset,
            self.length,
            self.config.chunk_size(),
        );
        channel
            .submit(transfer)
            .map_err(BodyError::TransferSubmissionFailed)
    }

    fn fail(&self, error: BodyError) -> BodyError {
        warn!(error = %error, "file body write failed");
        #[cfg(feature = "metrics")]
        if self.record_metrics {
            crate::metrics::record_error(error.kind());
        }
        error
    }
}

/// Close a file handle, logging instead of returning any error
pub(crate) fn close_quietly(file: &FileHandle) {
    if let Err(e) = file.close() {
        debug!(path = %file.path().display(), error = %e, "ignoring error while closing file");
    }
}

fn regular_file_size(path: &Path) -> Result<u64, BodyError> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
        _ => Err(BodyError::FileNotAccessible {
            path: absolute_path(path),
        }),
    }
}

fn check_range(offset: u64, length: u64, file_size: u64) -> Result<(), BodyError> {
    match offset.checked_add(length) {
        Some(end) if end <= file_size => Ok(()),
        _ => Err(BodyError::InvalidRange {
            offset,
            length,
            file_size,
        }),
    }
}

fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
