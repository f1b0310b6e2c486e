//! # unzipdir
//!
//! Extract every entry of a ZIP archive into a destination directory.
//!
//! The archive is read through its central directory, each entry is
//! decompressed (STORED or DEFLATE) and checked against its recorded
//! CRC-32, and the result is written beneath the destination with the
//! entry's relative path. Intermediate directories are created as needed
//! and existing files are overwritten. Entry names that try to climb out
//! of the destination (`../x`, `/abs/path`) are confined to it.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let summary = unzipdir::extract(Path::new("archive.zip"), Path::new("out")).await?;
//!     println!("{} files extracted", summary.files);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

use std::path::Path;
use std::sync::Arc;

pub use crate::cli::Cli;
pub use crate::error::{ErrorKind, ExtractError, Result};
pub use crate::io::{LocalFileReader, ReadAt};
pub use crate::zip::{ExtractSummary, ZipExtractor, ZipFileEntry};

/// Extract the archive at `src` into `dest`.
///
/// `dest` and any missing parents are created once the archive has been
/// confirmed readable. The archive is closed before this returns, whether
/// or not extraction succeeded.
pub async fn extract(src: &Path, dest: &Path) -> Result<ExtractSummary> {
    let reader = Arc::new(LocalFileReader::new(src)?);
    ZipExtractor::new(reader).extract_all(dest).await
}
