//! Error types for archive extraction.
//!
//! Every failure the extractor can hit maps onto one of three coarse
//! [`ErrorKind`]s: the archive could not be found, the archive is not a
//! ZIP file we can read, or the filesystem refused an operation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A Result type alias over [`ExtractError`].
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Coarse classification of an [`ExtractError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source archive does not exist or is not a regular file.
    NotFound,
    /// The source is not a valid or supported ZIP archive.
    Format,
    /// Reading the archive or writing the destination failed.
    Io,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot open archive '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("not a ZIP archive: unable to locate the end of central directory record")]
    UnableToLocateEocd,
    #[error("unexpected {record} signature (actual: {actual:#010x}, expected: {expected:#010x})")]
    UnexpectedHeader {
        record: &'static str,
        actual: u32,
        expected: u32,
    },
    #[error("archive is truncated")]
    Truncated,
    #[error("archive is corrupt: {0}")]
    Corrupt(&'static str),
    #[error("archives that span multiple disks are not supported")]
    MultiDisk,
    #[error("'{name}': compression method {method} is not supported")]
    CompressionNotSupported { name: String, method: u16 },
    #[error("'{0}' is encrypted, password-protected entries are not supported")]
    Encrypted(String),
    #[error("'{name}': file name in local header differs from central directory ('{local}')")]
    NameMismatch { name: String, local: String },
    #[error("'{name}': bad CRC-32 (expected {expected:#010x}, actual {actual:#010x})")]
    Crc32Mismatch {
        name: String,
        expected: u32,
        actual: u32,
    },
    #[error("'{name}': decompressed size {actual} does not match recorded size {expected}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("failed to read archive: {0}")]
    Read(#[source] io::Error),
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Open { source, .. } => match source.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::IsADirectory => ErrorKind::NotFound,
                _ => ErrorKind::Io,
            },
            ExtractError::Read(_) | ExtractError::Write { .. } => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| ExtractError::Write { path, source }
    }
}

impl From<io::Error> for ExtractError {
    /// Short reads inside the archive mean the archive lies about its layout.
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ExtractError::Truncated
        } else {
            ExtractError::Read(err)
        }
    }
}
