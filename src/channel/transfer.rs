//! Transfer descriptors
//!
//! A [`Transfer`] names a byte range of an open file and how the channel
//! should move it: as a raw region (zero-copy) or as buffered chunks.

use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only file handle shared between a writer and the channel moving its bytes.
///
/// The descriptor is released by an explicit [`close`](FileHandle::close);
/// reads after that fail instead of touching a recycled descriptor.
#[derive(Debug)]
pub struct FileHandle {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileHandle {
    /// Open `path` read-only
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
        })
    }

    /// Path the handle was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the open file
    pub fn len(&self) -> io::Result<u64> {
        self.with_file(|file| file.metadata().map(|m| m.len()))
    }

    /// Whether the descriptor has been released
    pub fn is_closed(&self) -> bool {
        self.file.lock().is_none()
    }

    /// Positional read that leaves no cursor state behind
    pub fn read_at(&self, buf: &mut [u8], position: u64) -> io::Result<usize> {
        self.with_file(|file| {
            #[cfg(unix)]
            {
                use std::os::unix::fs::FileExt;
                file.read_at(buf, position)
            }
            #[cfg(windows)]
            {
                use std::os::windows::fs::FileExt;
                file.seek_read(buf, position)
            }
        })
    }

    /// Run `f` against the open file, failing if it was already closed
    pub fn with_file<T>(&self, f: impl FnOnce(&File) -> io::Result<T>) -> io::Result<T> {
        let guard = self.file.lock();
        match guard.as_ref() {
            Some(file) => f(file),
            None => Err(io::Error::other(format!(
                "file handle for {} is closed",
                self.path.display()
            ))),
        }
    }

    /// Release the descriptor.
    ///
    /// Returns `Ok(true)` when this call closed it and `Ok(false)` when it was
    /// already closed, so repeated calls never report an error.
    pub fn close(&self) -> io::Result<bool> {
        let Some(file) = self.file.lock().take() else {
            return Ok(false);
        };

        #[cfg(target_os = "linux")]
        nix::unistd::close(file).map_err(io::Error::from)?;
        #[cfg(not(target_os = "linux"))]
        drop(file);

        Ok(true)
    }
}

/// A file range handed to the channel as-is, for a kernel-side copy
#[derive(Debug, Clone)]
pub struct FileRegion {
    file: Arc<FileHandle>,
    offset: u64,
    length: u64,
}

impl FileRegion {
    pub fn new(file: Arc<FileHandle>, offset: u64, length: u64) -> Self {
        Self {
            file,
            offset,
            length,
        }
    }

    pub fn file(&self) -> &Arc<FileHandle> {
        &self.file
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }
}

/// A file range read through a buffer `chunk_size` bytes at a time
#[derive(Debug, Clone)]
pub struct ChunkedFile {
    file: Arc<FileHandle>,
    offset: u64,
    length: u64,
    chunk_size: usize,
}

impl ChunkedFile {
    /// A zero `chunk_size` is raised to one byte.
    pub fn new(file: Arc<FileHandle>, offset: u64, length: u64, chunk_size: usize) -> Self {
        Self {
            file,
            offset,
            length,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn file(&self) -> &Arc<FileHandle> {
        &self.file
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Body transfer submitted to a [`Channel`](super::Channel)
#[derive(Debug, Clone)]
pub enum Transfer {
    Region(FileRegion),
    Chunked(ChunkedFile),
}

impl Transfer {
    pub fn file(&self) -> &Arc<FileHandle> {
        match self {
            Self::Region(region) => region.file(),
            Self::Chunked(chunked) => chunked.file(),
        }
    }

    /// Bytes this transfer is expected to move
    pub fn length(&self) -> u64 {
        match self {
            Self::Region(region) => region.length(),
            Self::Chunked(chunked) => chunked.length(),
        }
    }

    pub fn is_zero_copy(&self) -> bool {
        matches!(self, Self::Region(_))
    }
}
