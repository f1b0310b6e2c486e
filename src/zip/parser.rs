//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data
//!
//! Archives with data prepended to them (self-extracting stubs, for
//! example) are handled by comparing where the central directory actually
//! ends with where the EOCD claims it starts, and shifting every offset
//! by the difference.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::error::{ExtractError, Result};
use crate::io::ReadAt;

use super::cp437;
use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Location of the central directory, already corrected for prepended data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CentralDirectory {
    /// Absolute offset of the first central directory header
    pub offset: u64,
    /// Size of the central directory in bytes
    pub size: u64,
    /// Number of entries recorded in the EOCD
    pub total_entries: u64,
    /// Bytes found in front of the archive proper
    pub prepended: u64,
}

/// Low-level ZIP file parser.
///
/// This struct handles reading and parsing ZIP structures from
/// a data source. It's generic over the reader type so tests can
/// parse archives held in memory.
///
/// ## Usage
///
/// Typically used through [`ZipExtractor`](super::ZipExtractor)
/// rather than directly.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// let entries = parser.list_files().await?;
/// for entry in entries {
///     let offset = parser.get_data_offset(&entry).await?;
///     // Read file data from offset...
/// }
/// ```
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD is located at the end of the ZIP file. This method
    /// handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::UnableToLocateEocd`] if no valid EOCD can
    /// be found, indicating the file is not a ZIP archive.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < eocd_size {
            return Err(ExtractError::UnableToLocateEocd);
        }

        // Common case: no archive comment, the EOCD is the last 22 bytes.
        let offset = self.size - eocd_size;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf).await?;

        if buf[0..4] == EndOfCentralDirectory::SIGNATURE.to_le_bytes() && buf[20..22] == [0, 0] {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        // The EOCD is followed by a comment; search backwards for it.
        let search_size = (MAX_COMMENT_SIZE + eocd_size).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        let signature = EndOfCentralDirectory::SIGNATURE.to_le_bytes();
        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if buf[i..i + 4] != signature {
                continue;
            }
            // The comment must fit in the file. Bytes after it are
            // tolerated, as some writers pad archives.
            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if i + EndOfCentralDirectory::SIZE + comment_len <= buf.len() {
                let eocd =
                    EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        Err(ExtractError::UnableToLocateEocd)
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF) or a ZIP64 locator precedes it.
    ///
    /// # Returns
    ///
    /// The parsed ZIP64 EOCD and the offset it was actually found at.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<(Zip64EOCD, u64)> {
        // The ZIP64 EOCD Locator is located immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or(ExtractError::Truncated)?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;
        if locator.spans_disks() {
            return Err(ExtractError::MultiDisk);
        }

        // Prefer the offset recorded in the locator. If data was prepended
        // to the archive that offset is stale, so fall back to the record
        // sitting directly in front of the locator.
        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        let recorded = self
            .reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await;
        if recorded.is_ok() {
            if let Ok(eocd64) = Zip64EOCD::from_bytes(&eocd64_buf) {
                return Ok((eocd64, locator.eocd64_offset));
            }
        }

        let adjacent = locator_offset
            .checked_sub(Zip64EOCD::MIN_SIZE as u64)
            .ok_or(ExtractError::Truncated)?;
        self.reader.read_exact_at(adjacent, &mut eocd64_buf).await?;
        Ok((Zip64EOCD::from_bytes(&eocd64_buf)?, adjacent))
    }

    /// Whether a ZIP64 EOCD locator sits directly in front of the EOCD.
    async fn has_zip64_locator(&self, eocd_offset: u64) -> Result<bool> {
        let Some(locator_offset) = eocd_offset.checked_sub(Zip64EOCDLocator::SIZE as u64) else {
            return Ok(false);
        };
        let mut sig = [0u8; 4];
        self.reader.read_exact_at(locator_offset, &mut sig).await?;
        Ok(u32::from_le_bytes(sig) == Zip64EOCDLocator::SIGNATURE)
    }

    /// Locate the central directory.
    ///
    /// The central directory is assumed to end right where the (ZIP64)
    /// EOCD begins. Any gap between that and the offsets the EOCD records
    /// is data prepended to the archive.
    pub async fn central_directory(&self) -> Result<CentralDirectory> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        // Some writers emit ZIP64 records even when no EOCD field is
        // saturated, and the central directory then ends before them.
        let zip64 = eocd.is_zip64() || self.has_zip64_locator(eocd_offset).await?;

        let (cd_offset, cd_size, total_entries, cd_end) = if zip64 {
            let (eocd64, eocd64_offset) = self.read_zip64_eocd(eocd_offset).await?;
            if eocd64.spans_disks() {
                return Err(ExtractError::MultiDisk);
            }
            (
                eocd64.cd_offset,
                eocd64.cd_size,
                eocd64.total_entries,
                eocd64_offset,
            )
        } else {
            if eocd.spans_disks() {
                return Err(ExtractError::MultiDisk);
            }
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
                eocd_offset,
            )
        };

        let prepended = cd_offset
            .checked_add(cd_size)
            .and_then(|recorded_end| cd_end.checked_sub(recorded_end))
            .ok_or(ExtractError::Corrupt("bad offset for central directory"))?;

        Ok(CentralDirectory {
            offset: cd_offset + prepended,
            size: cd_size,
            total_entries,
            prepended,
        })
    }

    /// List all files in the ZIP archive.
    ///
    /// Reads the Central Directory to get metadata for all entries.
    /// This method reads the EOCD first, then fetches and parses the
    /// entire Central Directory.
    ///
    /// # Returns
    ///
    /// A vector of [`ZipFileEntry`] structures, one for each file/directory
    /// in the archive, in central directory order.
    ///
    /// # Errors
    ///
    /// Returns a format error if the archive is invalid, or
    /// [`ExtractError::Read`] if it cannot be read.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let cd = self.central_directory().await?;

        // Every header is at least 46 bytes, which bounds both the
        // allocation and the entry count against a lying EOCD.
        if cd.total_entries.saturating_mul(CDFH_MIN_SIZE as u64) > cd.size {
            return Err(ExtractError::Corrupt(
                "central directory too small for its entry count",
            ));
        }

        // Read the entire Central Directory in one request
        let mut cd_data = vec![0u8; cd.size as usize];
        self.reader.read_exact_at(cd.offset, &mut cd_data).await?;

        let mut entries = Vec::with_capacity(cd.total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..cd.total_entries {
            let mut entry = self.parse_cdfh(&mut cursor)?;
            entry.lfh_offset = entry
                .lfh_offset
                .checked_add(cd.prepended)
                .ok_or(ExtractError::Corrupt("local header offset out of range"))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Parse a Central Directory File Header from a cursor.
    ///
    /// The CDFH contains metadata about a file in the archive, including
    /// its name, sizes, and location of the actual file data.
    fn parse_cdfh(&self, cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        check_signature("central directory file header", &sig, CDFH_SIGNATURE)?;

        // Read fixed-size header fields
        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        let file_name = decode_file_name(&file_name_bytes, flags);

        // Directory entries end with '/'
        let is_directory = file_name.ends_with('/');

        let mut extra = vec![0u8; extra_field_length as usize];
        cursor.read_exact(&mut extra)?;
        let mut extra = Cursor::new(extra.as_slice());

        while extra.position() + 4 <= extra_field_length as u64 {
            let header_id = extra.read_u16::<LittleEndian>()?;
            let field_size = extra.read_u16::<LittleEndian>()? as u64;
            let field_end = extra.position() + field_size;

            if header_id == ZIP64_EXTRA_ID {
                // Fields are present only if the corresponding header field
                // is saturated, and always in this order.
                if uncompressed_size == 0xFFFFFFFF {
                    uncompressed_size = read_zip64_field(&mut extra, field_end)?;
                }
                if compressed_size == 0xFFFFFFFF {
                    compressed_size = read_zip64_field(&mut extra, field_end)?;
                }
                if lfh_offset == 0xFFFFFFFF {
                    lfh_offset = read_zip64_field(&mut extra, field_end)?;
                }
            }
            extra.set_position(field_end);
        }

        // Skip over the file comment
        let mut comment = vec![0u8; file_comment_length as usize];
        cursor.read_exact(&mut comment)?;

        Ok(ZipFileEntry {
            file_name,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            flags,
            last_mod_time,
            last_mod_date,
            is_directory,
        })
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The Local File Header (LFH) has variable-length fields (filename,
    /// extra field) that may differ from the Central Directory entry.
    /// This method reads the LFH to calculate where the actual file
    /// data begins, and checks that the LFH describes the same file.
    ///
    /// # Errors
    ///
    /// Returns a format error if the LFH is missing or names a
    /// different file than the central directory.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader
            .read_exact_at(entry.lfh_offset, &mut lfh_buf)
            .await?;
        check_signature("local file header", &lfh_buf, LFH_SIGNATURE)?;

        // Read the variable field lengths from fixed positions in LFH
        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26);

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;
        let local_flags = u16::from_le_bytes([lfh_buf[6], lfh_buf[7]]);

        let mut name_buf = vec![0u8; file_name_length as usize];
        self.reader
            .read_exact_at(entry.lfh_offset + LFH_SIZE as u64, &mut name_buf)
            .await?;
        let local_name = decode_file_name(&name_buf, local_flags);
        if local_name != entry.file_name {
            return Err(ExtractError::NameMismatch {
                name: entry.file_name.clone(),
                local: local_name,
            });
        }

        // Data starts after: LFH (30 bytes) + filename + extra field
        Ok(entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Decode a stored file name. Anything after a NUL byte is discarded.
/// Names flagged as UTF-8 have invalid sequences replaced rather than
/// rejected; all others are CP437.
fn decode_file_name(bytes: &[u8], flags: u16) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    if flags & FLAG_UTF8 != 0 {
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    } else {
        cp437::decode(&bytes[..end])
    }
}

fn read_zip64_field(extra: &mut Cursor<&[u8]>, field_end: u64) -> Result<u64> {
    if extra.position() + 8 > field_end {
        return Err(ExtractError::Corrupt("ZIP64 extra field too short"));
    }
    Ok(extra.read_u64::<LittleEndian>()?)
}
