//! Completion handling for a scheduled file body
//!
//! One handler per `write`, run by the channel when the transfer ends. It
//! does two things in a fixed order: close the file, then tell the sink.

use super::{close_quietly, BodyError, Strategy};
use crate::channel::{ChannelError, FileHandle, TransferListener};
use crate::progress::{Completion, ProgressSink};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Span};

/// Cleanup stage: release the file descriptor
pub(crate) struct CloseFile(pub(crate) Arc<FileHandle>);

impl CloseFile {
    fn run(self) {
        close_quietly(&self.0);
    }
}

/// Forward stage: report to the progress sink
pub(crate) struct ForwardToSink {
    pub(crate) sink: Arc<dyn ProgressSink>,
    pub(crate) content_length: u64,
}

impl ForwardToSink {
    fn progress(&self, transferred: u64, total: u64) {
        self.sink.on_progress(transferred, total);
    }

    fn finish(self, result: Result<u64, ChannelError>) {
        self.sink.on_complete(Completion {
            content_length: self.content_length,
            result: result.map_err(BodyError::TransferFailed),
        });
    }
}

pub(crate) struct CompletionHandler {
    pub(crate) cleanup: CloseFile,
    pub(crate) forward: ForwardToSink,
    pub(crate) strategy: Strategy,
    pub(crate) record_metrics: bool,
    pub(crate) started: Instant,
    pub(crate) span: Span,
}

impl TransferListener for CompletionHandler {
    fn on_progress(&mut self, transferred: u64, total: u64) {
        self.forward.progress(transferred, total);
    }

    fn on_complete(self: Box<Self>, result: Result<u64, ChannelError>) {
        let Self {
            cleanup,
            forward,
            strategy,
            record_metrics,
            started,
            span,
        } = *self;
        let _enter = span.enter();

        cleanup.run();

        let elapsed = started.elapsed();
        match &result {
            Ok(bytes) => info!(
                bytes,
                duration_ms = elapsed.as_millis(),
                "file body transfer completed"
            ),
            Err(e) => warn!(
                error = %e,
                duration_ms = elapsed.as_millis(),
                "file body transfer failed"
            ),
        }

        #[cfg(feature = "metrics")]
        if record_metrics {
            match &result {
                Ok(bytes) => crate::metrics::record_transfer_success(
                    strategy.as_str(),
                    *bytes,
                    elapsed.as_secs_f64(),
                ),
                Err(_) => {
                    crate::metrics::record_transfer_failure(strategy.as_str(), elapsed.as_secs_f64());
                    crate::metrics::record_error("transfer_failed");
                }
            }
        }
        #[cfg(not(feature = "metrics"))]
        let _ = (strategy, record_metrics);

        forward.finish(result);
    }
}
