//! ZIP archive parsing and extraction.
//!
//! This module provides functionality for reading and extracting ZIP archives,
//! supporting both standard ZIP format and ZIP64 extensions for large archives.
//!
//! ## Architecture
//!
//! The module is organized into five components:
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - `cp437`: Decoding of legacy (non-UTF-8) entry names
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`path`]: Mapping untrusted entry names onto the destination directory
//! - [`extractor`]: Decompression, verification and writing to disk
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! This implementation reads the EOCD first (from the end of the file),
//! then the Central Directory, so a file that is not an archive is
//! rejected before anything is written.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - Archive comments and data prepended to the archive
//! - STORED (no compression) and DEFLATE compression methods
//! - CRC-32 verification of every extracted entry
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod cp437;
mod extractor;
mod parser;
mod path;
mod structures;

pub use extractor::{ExtractSummary, ZipExtractor};
pub use parser::{CentralDirectory, ZipParser};
pub use path::sanitize_entry_path;
pub use structures::*;
