//! Mapping stored entry names onto the destination directory.
//!
//! Entry names come from the archive and cannot be trusted: `../../x`,
//! `/etc/passwd` or `C:\x` would all escape the destination if joined
//! naively. Names are reduced to their plain segments instead, so every
//! entry lands somewhere beneath the destination.

use std::path::{Component, Path, PathBuf};

/// Whether `c` separates path segments in a stored entry name.
///
/// ZIP names always use `/`. On Windows a `\` would be read as a
/// separator by the filesystem, so it is treated as one here too.
fn is_separator(c: char) -> bool {
    c == '/' || (cfg!(windows) && c == '\\')
}

/// Convert a stored entry name into a relative path that cannot leave
/// the destination directory.
///
/// Empty, `.` and `..` segments are dropped, as is anything the platform
/// would interpret as a root or drive prefix. Returns `None` if nothing
/// is left.
pub fn sanitize_entry_path(name: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();

    for segment in name.split(is_separator) {
        if matches!(segment, "" | "." | "..") {
            continue;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => path.push(part),
            _ => log::debug!("dropping segment {segment:?} of entry {name:?}"),
        }
    }

    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}
