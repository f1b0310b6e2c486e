#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;

use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// One archive member used to author fixtures.
pub enum Member<'a> {
    File(&'a str, &'a [u8]),
    Dir(&'a str),
}

pub const SAMPLE: &[Member<'static>] = &[
    Member::File("readme.txt", b"top level file\n"),
    Member::Dir("docs/"),
    Member::File("docs/guide.md", b"# Guide\n\nSome words, some more words.\n"),
    Member::File("a/b/c.txt", b"deeply nested"),
    Member::File("empty.bin", b""),
];

pub fn options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(method)
}

/// Author an archive in memory with the `zip` crate.
pub fn build_zip(members: &[Member], opts: SimpleFileOptions) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for member in members {
        match member {
            Member::File(name, data) => {
                writer.start_file(*name, opts).unwrap();
                writer.write_all(data).unwrap();
            }
            Member::Dir(name) => writer.add_directory(*name, opts).unwrap(),
        }
    }
    writer.finish().unwrap().into_inner()
}

pub fn write_zip(path: &Path, members: &[Member], opts: SimpleFileOptions) {
    std::fs::write(path, build_zip(members, opts)).unwrap();
}

/// Assert every file member exists under `dest` with identical bytes and
/// every directory member exists as a directory.
pub fn assert_extracted(dest: &Path, members: &[Member]) {
    for member in members {
        match member {
            Member::File(name, data) => {
                let got = std::fs::read(dest.join(name))
                    .unwrap_or_else(|e| panic!("reading extracted {name}: {e}"));
                assert_eq!(&got, data, "content of {name}");
            }
            Member::Dir(name) => {
                assert!(dest.join(name).is_dir(), "{name} should be a directory");
            }
        }
    }
}

/// Deterministic, poorly compressible bytes.
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}
