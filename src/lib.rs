//! filebody
//!
//! Sends a file, or a byte range of one, as the body of an outbound message.
//!
//! # Features
//!
//! - **Zero-Copy**: Uses `sendfile(2)` on Linux for plaintext channels
//! - **Buffered Fallback**: Chunked reads for secured channels or when
//!   zero-copy is disabled in configuration
//! - **Exactly-Once Cleanup**: The file handle is closed on every exit path
//! - **Progress Reporting**: Per-chunk progress and a single completion
//!
//! # Example
//!
//! ```no_run
//! use filebody::{Config, FileBody, StreamChannel, WriteContext};
//! use filebody::progress::CompletionSignal;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let body = FileBody::new("payload.bin", &config.transfer)?;
//!     let length = body.content_length();
//!
//!     let stream = tokio::net::TcpStream::connect("127.0.0.1:9000").await?;
//!     let channel = StreamChannel::spawn(stream);
//!     let (sink, done) = CompletionSignal::new();
//!     body.write(&channel, WriteContext::new(sink, length))?;
//!
//!     let completion = done.await?;
//!     channel.close().await?;
//!     println!("{:?}", completion.result);
//!     Ok(())
//! }
//! ```

pub mod body;
pub mod channel;
pub mod config;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod progress;

// Re-export commonly used types
pub use body::{BodyError, FileBody, Strategy, WriteContext};
pub use channel::{Channel, ChannelError, StreamChannel, Transfer};
pub use config::{Config, TransferConfig};
pub use progress::{Completion, ProgressSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if zero-copy is available on this platform
#[inline]
pub fn zero_copy_available() -> bool {
    cfg!(target_os = "linux")
}
