use flate2::write::DeflateDecoder;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{ExtractError, Result};
use crate::io::ReadAt;

use super::parser::ZipParser;
use super::path::sanitize_entry_path;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Entry data is moved through the decompressor in chunks of this size.
const CHUNK_SIZE: usize = 64 * 1024;

/// What [`ZipExtractor::extract_all`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    /// Entries whose name sanitized to nothing
    pub skipped: usize,
}

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all files in the archive
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Extract every entry beneath `dest`, in archive order.
    ///
    /// The central directory is read and validated before anything is
    /// created, so an unreadable archive leaves the filesystem untouched.
    /// A failure part way through leaves earlier entries in place.
    pub async fn extract_all(&self, dest: &Path) -> Result<ExtractSummary> {
        let entries = self.list_files().await?;
        log::debug!(
            "archive lists {} entries, extracting to {}",
            entries.len(),
            dest.display()
        );

        fs::create_dir_all(dest)
            .await
            .map_err(ExtractError::write(dest))?;

        let mut summary = ExtractSummary::default();
        for entry in &entries {
            let Some(relative) = sanitize_entry_path(&entry.file_name) else {
                log::warn!("skipping entry with unusable name {:?}", entry.file_name);
                summary.skipped += 1;
                continue;
            };
            let output_path = dest.join(relative);

            if entry.is_directory {
                log::debug!("   creating: {}", output_path.display());
                fs::create_dir_all(&output_path)
                    .await
                    .map_err(ExtractError::write(&output_path))?;
                summary.directories += 1;
            } else {
                let (year, month, day) = entry.mod_date();
                let (hour, minute, _) = entry.mod_time();
                log::debug!(
                    "  inflating: {} ({} bytes, {:04}-{:02}-{:02} {:02}:{:02})",
                    output_path.display(),
                    entry.uncompressed_size,
                    year,
                    month,
                    day,
                    hour,
                    minute
                );
                self.extract_to_file(entry, &output_path).await?;
                summary.files += 1;
            }
        }

        Ok(summary)
    }

    /// Extract file data to memory
    pub async fn extract_to_memory(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(entry.uncompressed_size.min(CHUNK_SIZE as u64) as usize);
        self.copy_entry(entry, &mut buf).await?;
        Ok(buf)
    }

    /// Extract file to disk, replacing whatever file is already there.
    pub async fn extract_to_file(&self, entry: &ZipFileEntry, output_path: &Path) -> Result<()> {
        // Validate the entry before touching the destination
        let data_offset = self.open_entry(entry).await?;

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(ExtractError::write(parent))?;
            }
        }

        let mut file = fs::File::create(output_path)
            .await
            .map_err(ExtractError::write(output_path))?;

        self.copy_from(entry, data_offset, &mut file)
            .await
            .map_err(|e| match e {
                ExtractError::Write { source, .. } => ExtractError::Write {
                    path: output_path.to_path_buf(),
                    source,
                },
                other => other,
            })?;
        Ok(())
    }

    /// Decompress an entry into `writer`, verifying its size and CRC-32.
    ///
    /// Returns the number of bytes written.
    pub async fn copy_entry<W>(&self, entry: &ZipFileEntry, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let data_offset = self.open_entry(entry).await?;
        self.copy_from(entry, data_offset, writer).await
    }

    /// Check that the entry can be extracted at all and locate its data.
    async fn open_entry(&self, entry: &ZipFileEntry) -> Result<u64> {
        if entry.is_encrypted() {
            return Err(ExtractError::Encrypted(entry.file_name.clone()));
        }
        if let CompressionMethod::Unknown(method) = entry.compression_method {
            return Err(ExtractError::CompressionNotSupported {
                name: entry.file_name.clone(),
                method,
            });
        }
        self.parser.get_data_offset(entry).await
    }

    async fn copy_from<W>(&self, entry: &ZipFileEntry, data_offset: u64, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut decoder = match entry.compression_method {
            CompressionMethod::Stored => None,
            CompressionMethod::Deflate => Some(DeflateDecoder::new(Vec::with_capacity(CHUNK_SIZE))),
            CompressionMethod::Unknown(method) => {
                return Err(ExtractError::CompressionNotSupported {
                    name: entry.file_name.clone(),
                    method,
                });
            }
        };

        let mut sink = VerifyingSink::new(entry, writer);
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut offset = data_offset;
        let mut remaining = entry.compressed_size;

        while remaining > 0 {
            let n = remaining.min(CHUNK_SIZE as u64) as usize;
            let chunk = &mut buf[..n];
            self.parser.reader().read_exact_at(offset, chunk).await?;
            offset += n as u64;
            remaining -= n as u64;

            match decoder.as_mut() {
                None => sink.write(chunk).await?,
                Some(decoder) => {
                    decoder.get_mut().clear();
                    // Output lags one write behind; try_finish drains the rest.
                    decoder
                        .write_all(chunk)
                        .map_err(|e| inflate_error(entry, e))?;
                    sink.write(decoder.get_ref()).await?;
                }
            }
        }

        if let Some(decoder) = decoder.as_mut() {
            decoder.get_mut().clear();
            decoder.try_finish().map_err(|e| inflate_error(entry, e))?;
            sink.write(decoder.get_ref()).await?;
        }

        sink.finish().await
    }
}

/// Forwards decompressed bytes to a writer while tracking their CRC-32
/// and count against what the central directory recorded.
struct VerifyingSink<'a, W> {
    entry: &'a ZipFileEntry,
    writer: &'a mut W,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl<'a, W: AsyncWrite + Unpin + Send> VerifyingSink<'a, W> {
    fn new(entry: &'a ZipFileEntry, writer: &'a mut W) -> Self {
        Self {
            entry,
            writer,
            hasher: crc32fast::Hasher::new(),
            written: 0,
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.written += data.len() as u64;
        // Stop early rather than inflating past the recorded size.
        if self.written > self.entry.uncompressed_size {
            return Err(self.size_mismatch());
        }
        self.hasher.update(data);
        self.writer
            .write_all(data)
            .await
            .map_err(ExtractError::write(&self.entry.file_name))
    }

    async fn finish(self) -> Result<u64> {
        if self.written != self.entry.uncompressed_size {
            return Err(self.size_mismatch());
        }
        let actual = self.hasher.clone().finalize();
        if actual != self.entry.crc32 {
            return Err(ExtractError::Crc32Mismatch {
                name: self.entry.file_name.clone(),
                expected: self.entry.crc32,
                actual,
            });
        }
        self.writer
            .flush()
            .await
            .map_err(ExtractError::write(&self.entry.file_name))?;
        Ok(self.written)
    }

    fn size_mismatch(&self) -> ExtractError {
        ExtractError::SizeMismatch {
            name: self.entry.file_name.clone(),
            expected: self.entry.uncompressed_size,
            actual: self.written,
        }
    }
}

fn inflate_error(entry: &ZipFileEntry, err: io::Error) -> ExtractError {
    log::debug!("inflate failed for {}: {err}", entry.file_name);
    ExtractError::Corrupt("invalid deflate stream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;

    use crate::zip::structures::{CDFH_SIGNATURE, EndOfCentralDirectory, LFH_SIGNATURE};

    struct Stored<'a> {
        name: &'a str,
        method: u16,
        flags: u16,
        payload: Vec<u8>,
        size: u32,
        crc: u32,
    }

    impl<'a> Stored<'a> {
        fn plain(name: &'a str, data: &[u8]) -> Self {
            Self {
                name,
                method: 0,
                flags: 0,
                payload: data.to_vec(),
                size: data.len() as u32,
                crc: crc32fast::hash(data),
            }
        }

        fn deflated(name: &'a str, data: &[u8]) -> Self {
            let mut enc = DeflateEncoder::new(Vec::new(), Compression::best());
            enc.write_all(data).unwrap();
            Self {
                method: 8,
                payload: enc.finish().unwrap(),
                ..Self::plain(name, data)
            }
        }
    }

    fn build(entries: &[Stored]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();
        for e in entries {
            let offset = out.len() as u32;
            let mut header = Vec::new();
            header.extend_from_slice(&20u16.to_le_bytes());
            header.extend_from_slice(&e.flags.to_le_bytes());
            header.extend_from_slice(&e.method.to_le_bytes());
            header.extend_from_slice(&[0, 0, 0x21, 0]);
            header.extend_from_slice(&e.crc.to_le_bytes());
            header.extend_from_slice(&(e.payload.len() as u32).to_le_bytes());
            header.extend_from_slice(&e.size.to_le_bytes());
            header.extend_from_slice(&(e.name.len() as u16).to_le_bytes());
            header.extend_from_slice(&0u16.to_le_bytes());

            out.extend_from_slice(&LFH_SIGNATURE.to_le_bytes());
            out.extend_from_slice(&header);
            out.extend_from_slice(e.name.as_bytes());
            out.extend_from_slice(&e.payload);

            central.extend_from_slice(&CDFH_SIGNATURE.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&header);
            central.extend_from_slice(&[0; 10]);
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(e.name.as_bytes());
        }
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&central);
        out.extend_from_slice(&EndOfCentralDirectory::SIGNATURE.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    async fn first_entry(bytes: Vec<u8>) -> (ZipExtractor<Vec<u8>>, ZipFileEntry) {
        let extractor = ZipExtractor::new(Arc::new(bytes));
        let entry = extractor.list_files().await.unwrap().remove(0);
        (extractor, entry)
    }

    #[tokio::test]
    async fn extracts_stored_entry() {
        let (extractor, entry) = first_entry(build(&[Stored::plain("a.txt", b"stored data")])).await;
        assert_eq!(extractor.extract_to_memory(&entry).await.unwrap(), b"stored data");
    }

    #[tokio::test]
    async fn extracts_deflated_entry_across_chunks() {
        // Poorly compressible, so the compressed stream spans several chunks
        let mut state = 0x1234_5678u32;
        let data: Vec<u8> = (0..200_000)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect();
        let (extractor, entry) = first_entry(build(&[Stored::deflated("big.bin", &data)])).await;
        assert_eq!(entry.compression_method, CompressionMethod::Deflate);
        assert!(entry.compressed_size > CHUNK_SIZE as u64);
        assert_eq!(extractor.extract_to_memory(&entry).await.unwrap(), data);
    }

    #[tokio::test]
    async fn extracts_empty_entry() {
        let (extractor, entry) = first_entry(build(&[Stored::plain("empty", b"")])).await;
        assert!(extractor.extract_to_memory(&entry).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_crc() {
        let mut e = Stored::plain("a.txt", b"payload");
        e.crc ^= 1;
        let (extractor, entry) = first_entry(build(&[e])).await;
        let err = extractor.extract_to_memory(&entry).await.unwrap_err();
        assert!(matches!(err, ExtractError::Crc32Mismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[tokio::test]
    async fn rejects_wrong_size() {
        let mut e = Stored::deflated("a.txt", b"some longer payload for deflate");
        e.size -= 4;
        let (extractor, entry) = first_entry(build(&[e])).await;
        assert!(matches!(
            extractor.extract_to_memory(&entry).await,
            Err(ExtractError::SizeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_garbage_deflate_stream() {
        let mut e = Stored::plain("a.txt", b"not deflate");
        e.method = 8;
        e.payload = vec![0xFF; 16];
        let (extractor, entry) = first_entry(build(&[e])).await;
        let err = extractor.extract_to_memory(&entry).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[tokio::test]
    async fn rejects_encrypted_and_unknown_methods() {
        let mut encrypted = Stored::plain("secret", b"x");
        encrypted.flags = 0x0001;
        let (extractor, entry) = first_entry(build(&[encrypted])).await;
        assert!(matches!(
            extractor.extract_to_memory(&entry).await,
            Err(ExtractError::Encrypted(name)) if name == "secret"
        ));

        let mut bzip2 = Stored::plain("b.bz2", b"x");
        bzip2.method = 12;
        let (extractor, entry) = first_entry(build(&[bzip2])).await;
        assert!(matches!(
            extractor.extract_to_memory(&entry).await,
            Err(ExtractError::CompressionNotSupported { method: 12, .. })
        ));
    }

    #[tokio::test]
    async fn unsupported_entry_creates_no_file() {
        let mut bzip2 = Stored::plain("b.bin", b"x");
        bzip2.method = 12;
        let (extractor, entry) = first_entry(build(&[bzip2])).await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("b.bin");
        assert!(extractor.extract_to_file(&entry, &target).await.is_err());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn extract_to_file_replaces_existing_content() {
        let (extractor, entry) =
            first_entry(build(&[Stored::deflated("note.txt", b"fresh content")])).await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sub/dir/note.txt");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, b"stale content that is much longer").unwrap();

        extractor.extract_to_file(&entry, &target).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"fresh content");
    }

    #[tokio::test]
    async fn file_entry_without_usable_name_is_skipped() {
        let bytes = build(&[
            Stored::plain("..", b"nameless"),
            Stored::plain("./.", b"dotted"),
            Stored::plain("kept.txt", b"kept"),
        ]);
        let extractor = ZipExtractor::new(Arc::new(bytes));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");

        let summary = extractor.extract_all(&dest).await.unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.skipped, 2);
        assert!(dest.is_dir());
        assert_eq!(std::fs::read(dest.join("kept.txt")).unwrap(), b"kept");
        let names: Vec<_> = std::fs::read_dir(&dest)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, ["kept.txt"]);
    }

    #[tokio::test]
    async fn extract_all_writes_tree() {
        let bytes = build(&[
            Stored::plain("top/", b""),
            Stored::plain("top/a.txt", b"alpha"),
            Stored::deflated("top/nested/b.txt", b"bravo bravo bravo"),
            Stored::plain("../escape.txt", b"contained"),
            Stored::plain("./", b""),
        ]);
        let extractor = ZipExtractor::new(Arc::new(bytes));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");

        let summary = extractor.extract_all(&dest).await.unwrap();
        assert_eq!(
            summary,
            ExtractSummary {
                files: 3,
                directories: 1,
                skipped: 1,
            }
        );
        assert_eq!(std::fs::read(dest.join("top/a.txt")).unwrap(), b"alpha");
        assert_eq!(
            std::fs::read(dest.join("top/nested/b.txt")).unwrap(),
            b"bravo bravo bravo"
        );
        assert_eq!(std::fs::read(dest.join("escape.txt")).unwrap(), b"contained");
        assert!(!dir.path().join("escape.txt").exists());
    }
}
