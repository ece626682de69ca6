//! Cross-run claims on working files.
//!
//! The working file of a conversion doubles as its lock: while it exists and
//! has been touched recently, other runs leave the source alone. A file that
//! nobody has touched for [`STALE_CLAIM_AGE`] belongs to a run that died and
//! may be taken over. This is advisory only; it does not stop two runs that
//! start within the same window from both transcoding.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use anyhow::{Context, Result};
use log::debug;
use sha2::{Digest, Sha256};

/// Working files untouched for longer than this are considered abandoned
pub const STALE_CLAIM_AGE: Duration = Duration::from_secs(2 * 60);

/// Stable identifier of a source file across runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClaimToken(String);

impl ClaimToken {
    /// Hash of the absolute source path, hex encoded
    pub fn for_path(path: &Path) -> Self {
        let digest = Sha256::digest(path.to_string_lossy().as_bytes());
        ClaimToken(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{tmp_dir}/{token}.{ext}`
    pub fn working_path(&self, tmp_dir: &Path, ext: &str) -> PathBuf {
        tmp_dir.join(format!("{}.{}", self.0, ext))
    }
}

/// State of a working-file slot, without changing anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    Free,
    /// Touched within the staleness window
    Held { age: Duration },
    /// Older than the staleness window
    Stale { age: Duration },
}

/// Result of trying to take a working-file slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Slot was free and is now ours
    Claimed,
    /// A stale working file was removed and the slot is now ours
    Reclaimed { age: Duration },
    /// Another run holds the slot
    Busy { age: Duration },
}

/// Time since a file was last read or written
fn last_touched_age(path: &Path, now: SystemTime) -> io::Result<Duration> {
    let meta = fs::metadata(path)?;
    let modified = meta.modified()?;
    let touched = match meta.accessed() {
        Ok(accessed) if accessed > modified => accessed,
        _ => modified,
    };
    // Timestamps in the future count as fresh
    Ok(now.duration_since(touched).unwrap_or(Duration::ZERO))
}

/// Inspect a working-file slot
pub fn claim_status(working: &Path, now: SystemTime) -> Result<ClaimStatus> {
    match last_touched_age(working, now) {
        Ok(age) if age > STALE_CLAIM_AGE => Ok(ClaimStatus::Stale { age }),
        Ok(age) => Ok(ClaimStatus::Held { age }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ClaimStatus::Free),
        Err(e) => Err(e).with_context(|| format!("Failed to stat working file: {}", working.display())),
    }
}

/// Take the slot at `working`, removing a stale working file if needed
///
/// On success an empty working file exists at `working` and marks the claim
/// until the transcoder overwrites it.
pub fn try_claim(working: &Path, now: SystemTime) -> Result<ClaimOutcome> {
    let outcome = match claim_status(working, now)? {
        ClaimStatus::Held { age } => return Ok(ClaimOutcome::Busy { age }),
        ClaimStatus::Free => ClaimOutcome::Claimed,
        ClaimStatus::Stale { age } => {
            debug!("Removing stale working file {} ({}s old)", working.display(), age.as_secs());
            match fs::remove_file(working) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to remove stale working file: {}", working.display())
                    })
                }
            }
            ClaimOutcome::Reclaimed { age }
        }
    };

    if let Some(dir) = working.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create temp directory: {}", dir.display()))?;
    }

    // create_new so that two runs racing on a free slot can't both win
    match OpenOptions::new().write(true).create_new(true).open(working) {
        Ok(_) => Ok(outcome),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Ok(ClaimOutcome::Busy { age: Duration::ZERO })
        }
        Err(e) => Err(e).with_context(|| format!("Failed to create working file: {}", working.display())),
    }
}
