//! Zero-copy transfer implementation
//!
//! Uses Linux sendfile(2) to move a file region straight into a socket.
//! Falls back to buffered positional reads and writes everywhere else, and
//! for streams without a raw socket underneath (TLS, in-memory pipes).

use super::promise::TransferPromise;
use super::stream::ChannelStream;
use super::transfer::FileHandle;
use super::ChannelError;

/// Default buffer size for buffered region copies
pub const DEFAULT_BUFFER_SIZE: usize = 65536; // 64KB

/// Upper bound on a single sendfile(2) call
pub const MAX_SENDFILE_CHUNK: usize = 1048576; // 1MB

// ============================================================================
// Linux Implementation (Zero-Copy)
// ============================================================================

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use crate::channel::transfer::FileRegion;
    use nix::sys::sendfile::sendfile;
    use std::io;
    use std::os::fd::AsFd;
    use tokio::io::Interest;
    use tokio::net::TcpStream;

    /// Send `region` to `socket` with sendfile(2)
    ///
    /// The socket is non-blocking; on `EAGAIN` the loop waits for writability
    /// instead of spinning.
    pub async fn send_region(
        socket: &TcpStream,
        region: &FileRegion,
        promise: &TransferPromise,
    ) -> Result<u64, ChannelError> {
        let length = region.length();
        let mut transferred: u64 = 0;

        while transferred < length {
            socket.writable().await?;

            let count = std::cmp::min(length - transferred, MAX_SENDFILE_CHUNK as u64) as usize;
            let position = region.offset() + transferred;

            let result = socket.try_io(Interest::WRITABLE, || {
                region.file().with_file(|file| {
                    let mut offset = position as libc::off_t;
                    sendfile(socket.as_fd(), file, Some(&mut offset), count).map_err(io::Error::from)
                })
            });

            match result {
                Ok(0) => {
                    return Err(ChannelError::UnexpectedEof {
                        expected: length,
                        transferred,
                    })
                }
                Ok(n) => {
                    transferred += n as u64;
                    promise.progress(transferred);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(transferred)
    }
}

#[cfg(target_os = "linux")]
pub use linux::send_region;

// ============================================================================
// Buffered Copy (all platforms)
// ============================================================================

/// Copy `length` bytes starting at `offset` through a buffer of `chunk_size`
///
/// Every chunk is written as soon as it is read; progress is reported after
/// each write. A file that ends early fails with
/// [`ChannelError::UnexpectedEof`].
pub async fn copy_range<S>(
    stream: &mut S,
    file: &FileHandle,
    offset: u64,
    length: u64,
    chunk_size: usize,
    promise: &TransferPromise,
) -> Result<u64, ChannelError>
where
    S: ChannelStream + ?Sized,
{
    let buffer_size = usize::try_from(length)
        .unwrap_or(usize::MAX)
        .clamp(1, chunk_size.max(1));
    let mut buffer = vec![0u8; buffer_size];
    let mut transferred: u64 = 0;

    while transferred < length {
        let to_read = std::cmp::min(length - transferred, buffer_size as u64) as usize;
        let n = file.read_at(&mut buffer[..to_read], offset + transferred)?;
        if n == 0 {
            return Err(ChannelError::UnexpectedEof {
                expected: length,
                transferred,
            });
        }

        stream.write_all(&buffer[..n]).await?;
        transferred += n as u64;
        promise.progress(transferred);
    }

    Ok(transferred)
}
