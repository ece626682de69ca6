use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use thiserror::Error;
use walkdir::WalkDir;
use crate::config::Settings;
use crate::media::MediaFile;
use crate::normalize;

/// A candidate file the scanner could not hand out
#[derive(Debug, Error)]
pub enum ScanError {
    /// Two names transliterate to the same ASCII form
    #[error("refusing to rename {} over existing {}", .from.display(), .to.display())]
    NameCollision { from: PathBuf, to: PathBuf },
    #[error("failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Lazy, recursive walk over a media root
///
/// Yields each allow-listed file once, after moving it to its ASCII-only
/// location. The temp and archive directories are skipped when they sit
/// inside the root.
pub struct Scanner<'a> {
    cfg: &'a Settings,
    root: PathBuf,
    walker: walkdir::IntoIter,
    excluded: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    entries: usize,
}

impl<'a> Scanner<'a> {
    /// Start a scan of `root`
    pub fn new(cfg: &'a Settings, root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve media root: {}", root.display()))?;

        let excluded = [&cfg.tmp_dir, &cfg.archive_dir]
            .into_iter()
            .filter_map(|dir| dir.canonicalize().ok())
            .filter(|dir| dir != &root)
            .collect();

        info!("Scanning {}", root.display());

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Ok(Self {
            cfg,
            root,
            walker,
            excluded,
            seen: HashSet::new(),
            entries: 0,
        })
    }

    fn is_candidate(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| self.cfg.accepts_extension(ext))
            .unwrap_or(false)
    }

    /// Move a file to its ASCII-only location if it isn't there already
    fn normalize(&self, path: &Path) -> Result<MediaFile, ScanError> {
        let target = normalize::ascii_path(&self.root, path);
        if target == path {
            return Ok(MediaFile::new(path.to_path_buf()));
        }

        // Another run renamed it after our directory listing was taken
        if !path.exists() && target.is_file() {
            debug!("Already normalized: {}", target.display());
            return Ok(MediaFile::renamed(path.to_path_buf(), target));
        }

        if target.exists() {
            return Err(ScanError::NameCollision {
                from: path.to_path_buf(),
                to: target,
            });
        }

        info!("Unicode in filename: {} | {}", path.display(), target.display());

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ScanError::Rename {
                from: path.to_path_buf(),
                to: target.clone(),
                source,
            })?;
        }

        match fs::rename(path, &target) {
            Ok(()) => Ok(MediaFile::renamed(path.to_path_buf(), target)),
            // Another run got there first
            Err(e) if e.kind() == io::ErrorKind::NotFound && target.is_file() => {
                debug!("Already normalized: {}", target.display());
                Ok(MediaFile::renamed(path.to_path_buf(), target))
            }
            Err(source) => Err(ScanError::Rename {
                from: path.to_path_buf(),
                to: target,
                source,
            }),
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<MediaFile, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error reading directory entry: {}", e);
                    continue;
                }
            };

            self.entries += 1;
            if self.entries % 1000 == 0 {
                info!("Scanned {} entries so far in {}...", self.entries, self.root.display());
            }

            let path = entry.path();

            if entry.file_type().is_dir() {
                if self.excluded.iter().any(|dir| dir == path) {
                    debug!("Skipping working directory: {}", path.display());
                    self.walker.skip_current_dir();
                }
                continue;
            }

            if !entry.file_type().is_file() || !self.is_candidate(path) {
                continue;
            }

            // Cheap duplicate check before touching the filesystem
            if self.seen.contains(path) {
                continue;
            }

            let result = self.normalize(path);
            if let Ok(file) = &result {
                if !self.seen.insert(file.path.clone()) {
                    continue;
                }
                debug!("Found media file: {}", file.path.display());
            }
            return Some(result);
        }
    }
}
