//! Task-driven channel over a tokio stream
//!
//! [`StreamChannel::spawn`] moves the stream into a dedicated task that
//! drains an ordered queue of body transfers and end-of-body markers. The
//! queue is what gives the channel its ordering guarantee: a marker queued
//! after a transfer is flushed only once that transfer has been written.

use super::promise::{transfer_promise, TransferFuture, TransferPromise};
use super::transfer::{FileRegion, Transfer};
use super::zero_copy::{copy_range, DEFAULT_BUFFER_SIZE};
use super::{Channel, ChannelError};
use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Byte sink a [`StreamChannel`] writes into
#[async_trait]
pub trait ChannelStream: Send + 'static {
    /// Whether bytes written here are encrypted before they reach the wire
    fn is_secure(&self) -> bool {
        false
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;

    async fn shutdown(&mut self) -> io::Result<()>;

    /// Move a whole file region.
    ///
    /// The default copies through a buffer; raw sockets override it with a
    /// kernel-side copy.
    async fn send_region(
        &mut self,
        region: &FileRegion,
        promise: &TransferPromise,
    ) -> Result<u64, ChannelError> {
        copy_range(
            self,
            region.file(),
            region.offset(),
            region.length(),
            DEFAULT_BUFFER_SIZE,
            promise,
        )
        .await
    }
}

#[async_trait]
impl ChannelStream for TcpStream {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(self, buf).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(self).await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(self).await
    }

    #[cfg(target_os = "linux")]
    async fn send_region(
        &mut self,
        region: &FileRegion,
        promise: &TransferPromise,
    ) -> Result<u64, ChannelError> {
        super::zero_copy::send_region(self, region, promise).await
    }
}

/// Plaintext stream without a raw socket underneath; regions are copied
pub struct Plain<S>(pub S);

/// Stream whose bytes are encrypted by a layer the caller set up (e.g. TLS)
///
/// Reports `is_secure() == true`, which steers writers onto the chunked path.
pub struct Secured<S>(pub S);

macro_rules! wrapped_stream {
    ($wrapper:ident, $secure:expr) => {
        #[async_trait]
        impl<S> ChannelStream for $wrapper<S>
        where
            S: AsyncWrite + Unpin + Send + 'static,
        {
            fn is_secure(&self) -> bool {
                $secure
            }

            async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
                self.0.write_all(buf).await
            }

            async fn flush(&mut self) -> io::Result<()> {
                self.0.flush().await
            }

            async fn shutdown(&mut self) -> io::Result<()> {
                self.0.shutdown().await
            }
        }
    };
}

wrapped_stream!(Plain, false);
wrapped_stream!(Secured, true);

enum Outbound {
    Transfer {
        transfer: Transfer,
        promise: TransferPromise,
    },
    TerminalMarker,
}

/// Channel backed by a tokio task that owns the stream
pub struct StreamChannel {
    secure: bool,
    tx: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<Result<(), ChannelError>>,
}

impl StreamChannel {
    /// Move `stream` into a writer task. Must be called inside a tokio runtime.
    pub fn spawn<S: ChannelStream>(stream: S) -> Self {
        let secure = stream.is_secure();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(stream, rx));
        Self { secure, tx, task }
    }

    /// Whether the writer task has stopped accepting work
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Stop accepting work, let queued items drain, and shut the stream down
    pub async fn close(self) -> Result<(), ChannelError> {
        drop(self.tx);
        self.task.await.map_err(io::Error::from)?
    }
}

impl Channel for StreamChannel {
    fn is_secure(&self) -> bool {
        self.secure
    }

    fn submit(&self, transfer: Transfer) -> Result<TransferFuture, ChannelError> {
        let (promise, future) = transfer_promise(transfer.length());
        self.tx
            .send(Outbound::Transfer { transfer, promise })
            .map_err(|_| ChannelError::Closed)?;
        Ok(future)
    }

    fn write_terminal_marker(&self) -> Result<(), ChannelError> {
        self.tx
            .send(Outbound::TerminalMarker)
            .map_err(|_| ChannelError::Closed)
    }
}

/// Writer task body
///
/// The first failure stops the task. Dropping the receiver then drops every
/// queued promise, which completes each with [`ChannelError::Closed`].
async fn drive<S: ChannelStream>(
    mut stream: S,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) -> Result<(), ChannelError> {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Transfer { transfer, promise } => {
                let result = match &transfer {
                    Transfer::Region(region) => stream.send_region(region, &promise).await,
                    Transfer::Chunked(chunked) => {
                        copy_range(
                            &mut stream,
                            chunked.file(),
                            chunked.offset(),
                            chunked.length(),
                            chunked.chunk_size(),
                            &promise,
                        )
                        .await
                    }
                };

                match result {
                    Ok(bytes) => {
                        debug!(
                            bytes,
                            zero_copy = transfer.is_zero_copy(),
                            "channel transfer written"
                        );
                        promise.complete(Ok(bytes));
                    }
                    Err(e) => {
                        warn!(error = %e, "channel transfer failed, closing channel");
                        let returned = e.replicate();
                        promise.complete(Err(e));
                        return Err(returned);
                    }
                }
            }
            Outbound::TerminalMarker => {
                if let Err(e) = stream.flush().await {
                    warn!(error = %e, "flush after end-of-body marker failed, closing channel");
                    return Err(e.into());
                }
            }
        }
    }

    stream.shutdown().await?;
    Ok(())
}
