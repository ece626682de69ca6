use std::path::{Path, PathBuf};

/// A media file discovered by the scanner
///
/// `path` is the normalized (ASCII) location every later stage works on.
/// `original` is where the file was found before normalization; it equals
/// `path` when no rename was needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaFile {
    pub path: PathBuf,
    pub original: PathBuf,
}

impl MediaFile {
    /// A file that was found at its normalized location
    pub fn new(path: PathBuf) -> Self {
        Self {
            original: path.clone(),
            path,
        }
    }

    /// A file that was renamed from `original` to `path`
    pub fn renamed(original: PathBuf, path: PathBuf) -> Self {
        Self { path, original }
    }

    pub fn was_renamed(&self) -> bool {
        self.path != self.original
    }

    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    /// Where the converted output lands: same directory, same stem, target extension
    pub fn destination(&self, target_ext: &str) -> PathBuf {
        self.directory().join(format!("{}.{}", self.stem(), target_ext))
    }
}
