//! Transfer strategy selection

use crate::channel::{ChunkedFile, FileHandle, FileRegion, Transfer};
use std::sync::Arc;

/// How a file body is moved onto the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Hand the channel the file region itself
    ZeroCopy,
    /// Read the file through a buffer and write each chunk
    Chunked,
}

impl Strategy {
    /// Encrypted channels have to see the plaintext, so they always get chunks.
    pub fn select(secure_channel: bool, zero_copy_disabled: bool) -> Self {
        if secure_channel || zero_copy_disabled {
            Self::Chunked
        } else {
            Self::ZeroCopy
        }
    }

    /// Build the descriptor to submit for this strategy
    pub fn transfer(
        self,
        file: Arc<FileHandle>,
        offset: u64,
        length: u64,
        chunk_size: usize,
    ) -> Transfer {
        match self {
            Self::ZeroCopy => Transfer::Region(FileRegion::new(file, offset, length)),
            Self::Chunked => Transfer::Chunked(ChunkedFile::new(file, offset, length, chunk_size)),
        }
    }

    /// Label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ZeroCopy => "zero_copy",
            Self::Chunked => "buffered",
        }
    }
}
