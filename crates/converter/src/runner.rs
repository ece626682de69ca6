use std::path::Path;
use anyhow::Result;
use log::{debug, error, info};
use crate::classifier::{Classification, Classifier, TrackProfile};
use crate::config::Settings;
use crate::ffmpeg::Transcoder;
use crate::media::MediaFile;
use crate::mediainfo::MetadataProbe;
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::scan::Scanner;

/// What happened to one scanned file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Conforming,
    Unsupported { audio_tracks: usize },
    Pipeline(PipelineOutcome),
}

/// Counts for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files: usize,
    pub conforming: usize,
    pub converted: usize,
    pub unsupported: usize,
    pub busy: usize,
    pub failed_transcodes: usize,
    pub dry_run: usize,
    /// Files whose processing hit an unexpected error
    pub errors: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Conforming => self.conforming += 1,
            FileOutcome::Unsupported { .. } => self.unsupported += 1,
            FileOutcome::Pipeline(p) => match p {
                PipelineOutcome::Converted { .. } => self.converted += 1,
                PipelineOutcome::Busy { .. } => self.busy += 1,
                PipelineOutcome::TranscodeFailed { .. } => self.failed_transcodes += 1,
                PipelineOutcome::DryRun { .. } => self.dry_run += 1,
            },
        }
    }

    /// True when no file hit an unexpected error
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

/// Drives scanner, classifier and pipeline over a media root
pub struct Runner<'a, P: MetadataProbe, T: Transcoder> {
    cfg: &'a Settings,
    probe: &'a P,
    pipeline: Pipeline<'a, T>,
}

impl<'a, P: MetadataProbe, T: Transcoder> Runner<'a, P, T> {
    pub fn new(cfg: &'a Settings, probe: &'a P, transcoder: &'a T) -> Self {
        Self {
            cfg,
            probe,
            pipeline: Pipeline::new(cfg, transcoder),
        }
    }

    /// Process every candidate under `root`, one at a time
    ///
    /// A failure on one file is logged and counted; the run carries on with
    /// the next file.
    pub async fn run(&self, root: &Path) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for item in Scanner::new(self.cfg, root)? {
            summary.files += 1;

            let file = match item {
                Ok(file) => file,
                Err(e) => {
                    error!("{}", e);
                    summary.errors += 1;
                    continue;
                }
            };

            match self.process_file(&file).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    error!("Failed to process {}: {:#}", file.path.display(), e);
                    summary.errors += 1;
                }
            }
        }

        info!(
            "Run Complete: {} files, {} converted, {} already conforming, {} unsupported, {} in progress elsewhere, {} failed transcodes, {} dry run, {} errors",
            summary.files,
            summary.converted,
            summary.conforming,
            summary.unsupported,
            summary.busy,
            summary.failed_transcodes,
            summary.dry_run,
            summary.errors
        );

        Ok(summary)
    }

    /// Probe, classify and, if needed, convert a single file
    pub async fn process_file(&self, file: &MediaFile) -> Result<FileOutcome> {
        debug!("Working on {}", file.path.display());

        let tracks = self.probe.probe(&file.path).await?;
        let profile = TrackProfile::from_tracks(&tracks);
        let classifier = Classifier::new(&self.cfg.target);

        match classifier.classify(&file.path, &profile) {
            Classification::Conforming => {
                info!("Not converting this file: {}", file.path.display());
                Ok(FileOutcome::Conforming)
            }
            Classification::Unsupported { audio_tracks } => {
                Ok(FileOutcome::Unsupported { audio_tracks })
            }
            Classification::NeedsConversion(_) => {
                let outcome = self.pipeline.convert(file).await?;
                Ok(FileOutcome::Pipeline(outcome))
            }
        }
    }
}
