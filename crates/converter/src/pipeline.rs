use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use crate::claim::{self, ClaimOutcome, ClaimToken};
use crate::config::Settings;
use crate::ffmpeg::{TranscodeOutcome, TranscodeParams, Transcoder};
use crate::media::MediaFile;

/// Where a conversion job is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    /// Working file created or taken over
    Claimed,
    /// Transcoder invoked
    Running,
    /// Output exists and is non-empty
    Verified,
    /// Output unusable; working file kept for inspection
    Failed,
    /// Source disposed of, output in place, working file gone
    Finalized,
}

/// One file being converted
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub source: MediaFile,
    pub token: ClaimToken,
    pub working: PathBuf,
    pub destination: PathBuf,
    pub state: JobState,
}

impl ConversionJob {
    pub fn new(cfg: &Settings, source: MediaFile) -> Self {
        let token = ClaimToken::for_path(&source.path);
        let working = token.working_path(&cfg.tmp_dir, &cfg.target.extension);
        let destination = source.destination(&cfg.target.extension);
        Self {
            source,
            token,
            working,
            destination,
            state: JobState::Pending,
        }
    }

    /// Short prefix of the claim token for log lines
    pub fn id(&self) -> &str {
        &self.token.as_str()[..12]
    }

    fn advance(&mut self, next: JobState) {
        debug!("Job {}: {:?} -> {:?}", self.id(), self.state, next);
        self.state = next;
    }
}

/// Why a transcode was judged to have failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeFailure {
    /// Working file missing or 0 bytes
    EmptyOutput,
    /// Transcoder exited unsuccessfully
    ExitCode(i32),
}

/// How the pipeline left a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Output promoted to `destination`, source disposed of
    Converted { destination: PathBuf, elapsed: Duration },
    /// Another run holds the claim
    Busy { age: Duration },
    /// Output unusable; source untouched, working file kept
    TranscodeFailed { working: PathBuf, failure: TranscodeFailure },
    /// Dry-run: claim taken and released, nothing transcoded or moved
    DryRun { destination: PathBuf },
}

/// Claim → transcode → verify → dispose → finalize, for one file at a time
pub struct Pipeline<'a, T: Transcoder> {
    cfg: &'a Settings,
    transcoder: &'a T,
    params: TranscodeParams,
}

impl<'a, T: Transcoder> Pipeline<'a, T> {
    pub fn new(cfg: &'a Settings, transcoder: &'a T) -> Self {
        Self {
            cfg,
            transcoder,
            params: TranscodeParams::from_settings(cfg),
        }
    }

    /// Convert a file that the classifier flagged
    ///
    /// Errors from the transcoder or the filesystem are returned as-is and
    /// leave the working file behind; it acts as the claim for a later run.
    pub async fn convert(&self, file: &MediaFile) -> Result<PipelineOutcome> {
        let mut job = ConversionJob::new(self.cfg, file.clone());
        self.run_job(&mut job).await
    }

    async fn run_job(&self, job: &mut ConversionJob) -> Result<PipelineOutcome> {
        debug!("Source: {}", job.source.path.display());
        debug!("Temp: {}", job.working.display());
        debug!("Dest: {}", job.destination.display());

        // Step 1: Claim
        match claim::try_claim(&job.working, SystemTime::now())? {
            ClaimOutcome::Busy { age } => {
                debug!(
                    "Conversion in process {} (working file touched {}s ago)",
                    job.source.path.display(),
                    age.as_secs()
                );
                return Ok(PipelineOutcome::Busy { age });
            }
            ClaimOutcome::Reclaimed { age } => {
                info!(
                    "Job {}: Reclaimed abandoned working file {} ({}s old)",
                    job.id(),
                    job.working.display(),
                    age.as_secs()
                );
            }
            ClaimOutcome::Claimed => {}
        }
        job.advance(JobState::Claimed);

        let start = Instant::now();

        // Step 2: Invoke
        job.advance(JobState::Running);
        if self.cfg.dry_run {
            return self.dry_run(job);
        }
        let result = self
            .transcoder
            .transcode(&job.source.path, &job.working, &self.params)
            .await?;

        // Step 3: Verify
        if let Some(failure) = self.verify(job, &result)? {
            job.advance(JobState::Failed);
            match &failure {
                TranscodeFailure::EmptyOutput => {
                    error!("0 Byte File: {}", job.source.path.display());
                }
                TranscodeFailure::ExitCode(code) => {
                    error!(
                        "Transcode failed with exit code {}: {}\n{}",
                        code,
                        job.source.path.display(),
                        stderr_tail(&result.stderr)
                    );
                }
            }
            return Ok(PipelineOutcome::TranscodeFailed {
                working: job.working.clone(),
                failure,
            });
        }
        job.advance(JobState::Verified);

        // Step 4: Dispose of source
        self.dispose_source(&job.source)?;

        // Step 5: Finalize
        info!("Moving converted file into place of original...");
        self.finalize(job)?;
        job.advance(JobState::Finalized);

        // Step 6: Report
        let elapsed = start.elapsed();
        info!("Conversion finished {:.2?}: {}", elapsed, job.destination.display());

        Ok(PipelineOutcome::Converted {
            destination: job.destination.clone(),
            elapsed,
        })
    }

    fn verify(&self, job: &ConversionJob, result: &TranscodeOutcome) -> Result<Option<TranscodeFailure>> {
        let size = match fs::metadata(&job.working) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to stat working file: {}", job.working.display())
                })
            }
        };

        if size == 0 {
            return Ok(Some(TranscodeFailure::EmptyOutput));
        }
        if !result.success() {
            return Ok(Some(TranscodeFailure::ExitCode(result.exit_code)));
        }
        Ok(None)
    }

    /// Paths that may still hold the source: where it was found and where it was renamed to
    fn source_paths(file: &MediaFile) -> Vec<&Path> {
        let mut paths = vec![file.original.as_path()];
        if file.was_renamed() {
            paths.push(file.path.as_path());
        }
        paths
    }

    fn dispose_source(&self, file: &MediaFile) -> Result<()> {
        if self.cfg.keep_original {
            fs::create_dir_all(&self.cfg.archive_dir).with_context(|| {
                format!("Failed to create archive directory: {}", self.cfg.archive_dir.display())
            })?;

            for path in Self::source_paths(file) {
                if !path.is_file() {
                    continue;
                }
                let name = path
                    .file_name()
                    .with_context(|| format!("Source has no file name: {}", path.display()))?;
                let target = self.cfg.archive_dir.join(name);
                debug!("Keeping original: {}", target.display());
                move_file(path, &target)?;
            }
        } else {
            for path in Self::source_paths(file) {
                if !path.is_file() {
                    continue;
                }
                debug!("Deleting original: {}", path.display());
                fs::remove_file(path)
                    .with_context(|| format!("Failed to delete original: {}", path.display()))?;
            }
        }
        Ok(())
    }

    /// Copy the output into place, then drop the working file
    ///
    /// The temp directory may be on another filesystem, so no rename.
    fn finalize(&self, job: &ConversionJob) -> Result<()> {
        fs::copy(&job.working, &job.destination).with_context(|| {
            format!(
                "Failed to copy converted file into place: {} -> {}",
                job.working.display(),
                job.destination.display()
            )
        })?;
        fs::remove_file(&job.working)
            .with_context(|| format!("Failed to remove working file: {}", job.working.display()))?;
        Ok(())
    }

    /// Finish a claimed job without transcoding
    ///
    /// The source and destination are left alone and the claim is released.
    fn dry_run(&self, job: &mut ConversionJob) -> Result<PipelineOutcome> {
        let args = crate::ffmpeg::build_command(&job.source.path, &job.working, &self.params);
        info!("Job {}: Dry run, skipping ffmpeg {:?}", job.id(), args);
        job.advance(JobState::Verified);

        for path in Self::source_paths(&job.source) {
            if self.cfg.keep_original {
                info!("Dry run: would archive {} to {}", path.display(), self.cfg.archive_dir.display());
            } else {
                info!("Dry run: would delete {}", path.display());
            }
        }
        info!("Dry run: would move converted file into place: {}", job.destination.display());
        job.advance(JobState::Finalized);

        fs::remove_file(&job.working)
            .with_context(|| format!("Failed to release working file: {}", job.working.display()))?;

        Ok(PipelineOutcome::DryRun {
            destination: job.destination.clone(),
        })
    }
}

/// EXDEV: rename across filesystems
#[cfg(not(windows))]
const CROSS_DEVICE: i32 = 18;
/// ERROR_NOT_SAME_DEVICE
#[cfg(windows)]
const CROSS_DEVICE: i32 = 17;

fn crosses_devices(e: &io::Error) -> bool {
    e.raw_os_error() == Some(CROSS_DEVICE)
}

/// Rename, falling back to copy + delete across filesystems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if crosses_devices(&e) => {
            debug!("{} is on another filesystem, copying", to.display());
            copy_then_remove(from, to)
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to move {} -> {}", from.display(), to.display()))
        }
    }
}

fn copy_then_remove(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} -> {}", from.display(), to.display()))?;
    fs::remove_file(from)
        .with_context(|| format!("Failed to remove {} after copy", from.display()))?;
    Ok(())
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(10);
    lines[start..].join("\n")
}
