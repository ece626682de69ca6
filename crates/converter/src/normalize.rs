//! ASCII name normalization.
//!
//! ffmpeg builds on some platforms cannot address non-ASCII paths reliably,
//! so every path component below the scan root is transliterated to its
//! closest ASCII spelling before any tool sees it.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use deunicode::deunicode;

/// Transliterate a single path component to ASCII
///
/// ASCII input is returned unchanged. The result never contains a path
/// separator and is never empty.
pub fn ascii_component(name: &OsStr) -> String {
    let lossy = name.to_string_lossy();
    if lossy.is_ascii() {
        return lossy.into_owned();
    }

    let converted: String = deunicode(&lossy)
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect();

    if converted.trim().is_empty() {
        "_".to_string()
    } else {
        converted
    }
}

/// Check whether every component of `path` below `root` is already ASCII
pub fn is_normalized(root: &Path, path: &Path) -> bool {
    match path.strip_prefix(root) {
        Ok(rel) => rel.as_os_str().to_str().map(|s| s.is_ascii()).unwrap_or(false),
        Err(_) => path.as_os_str().to_str().map(|s| s.is_ascii()).unwrap_or(false),
    }
}

/// Normalize every component of `path` that lies below `root`
///
/// The root itself is left as-is. Paths outside the root are returned
/// unchanged.
pub fn ascii_path(root: &Path, path: &Path) -> PathBuf {
    let rel = match path.strip_prefix(root) {
        Ok(rel) => rel,
        Err(_) => return path.to_path_buf(),
    };

    let mut out = root.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(name) => out.push(ascii_component(name)),
            other => out.push(other.as_os_str()),
        }
    }
    out
}
