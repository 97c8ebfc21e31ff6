//! filebody-send - send a file over TCP as a message body
//!
//! Connects to a peer and streams a file (or a range of it) using the same
//! writer the library exposes, zero-copy where the platform allows.

use anyhow::Context;
use clap::Parser;
use filebody::progress::CompletionSignal;
use filebody::{Config, FileBody, StreamChannel, WriteContext};
use std::path::PathBuf;
use tokio::net::TcpStream;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Send a file body over TCP with sendfile(2) or buffered fallback
#[derive(Parser, Debug)]
#[command(name = "filebody-send")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File to send
    #[arg(short, long)]
    file: PathBuf,

    /// Peer address (host:port)
    #[arg(long)]
    connect: String,

    /// Byte offset to start from
    #[arg(long, requires = "length")]
    offset: Option<u64>,

    /// Number of bytes to send
    #[arg(long, requires = "offset")]
    length: Option<u64>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    if args.json {
        builder.json().init();
    } else {
        builder.init();
    }

    info!("Starting filebody-send v{}", filebody::VERSION);

    let config = match &args.config {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    let body = match (args.offset, args.length) {
        (Some(offset), Some(length)) => {
            FileBody::with_range(&args.file, offset, length, &config.transfer)?
        }
        _ => FileBody::new(&args.file, &config.transfer)?,
    }
    .with_metrics(config.metrics.enabled);
    let content_length = body.content_length();

    let stream = TcpStream::connect(&args.connect)
        .await
        .with_context(|| format!("connecting to {}", args.connect))?;
    let channel = StreamChannel::spawn(stream);
    info!(
        peer = %args.connect,
        content_length,
        zero_copy = !config.transfer.is_zero_copy_disabled() && filebody::zero_copy_available(),
        "Sending file body"
    );

    let (sink, done) = CompletionSignal::new();
    body.write(&channel, WriteContext::new(sink, content_length))?;

    let completion = done.await.context("completion was never delivered")?;
    let closed = channel.close().await;

    #[cfg(feature = "metrics")]
    if config.metrics.enabled {
        debug!(metrics = %filebody::metrics::gather_text(), "Transfer metrics");
    }

    let bytes = completion.result?;
    closed?;
    info!(bytes, "File body sent");
    Ok(())
}
