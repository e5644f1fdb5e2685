//! The slice of the file layer that demand paging needs: positioned reads
//! and writes on an already-open file.

pub mod tempfs;

use alloc::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// the underlying device failed
    Io,
    /// no space left on device
    NoSpace,
    /// writes to this file are denied (e.g. a running executable)
    ReadOnly,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io => write!(f, "i/o error"),
            Self::NoSpace => write!(f, "no space left on device"),
            Self::ReadOnly => write!(f, "file is read-only"),
        }
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

/// An open file.
///
/// Implementations synchronise internally; the VM calls these from whichever
/// thread happens to be faulting or evicting.
pub trait File: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is short only at end of file.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;
    /// Write `buf` starting at `offset`, returning the number of bytes written.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize>;
    /// Current length in bytes.
    fn length(&self) -> u64;
}

/// Shared handle to an open file, as held by page table entries.
pub type FileRef = Arc<dyn File>;
