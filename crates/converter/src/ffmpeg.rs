use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use tokio::process::Command;
use crate::config::Settings;

/// Encoder settings for a conversion
///
/// Every file gets the same parameters; nothing here depends on the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeParams {
    /// x264 CRF
    pub video_quality: u8,
    pub h264_level: Option<String>,
    /// x264 preset
    pub speed_preset: String,
    /// AAC VBR quality
    pub audio_quality: u8,
    /// Extra arguments passed through verbatim
    pub extra_args: Vec<String>,
}

impl TranscodeParams {
    pub fn from_settings(cfg: &Settings) -> Self {
        Self {
            video_quality: cfg.video_quality,
            h264_level: cfg.h264_level.clone().filter(|l| !l.is_empty()),
            speed_preset: cfg.conversion_speed.clone(),
            audio_quality: cfg.audio_quality,
            extra_args: cfg.custom_ffmpeg_args.clone(),
        }
    }
}

/// What the transcoder reported back
///
/// A zero exit code does not mean the output is usable; callers still
/// check the output file.
#[derive(Debug, Clone)]
pub struct TranscodeOutcome {
    pub exit_code: i32,
    pub stderr: String,
}

impl TranscodeOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Produces an H.264/AAC file at `output` from `input`
///
/// Errors are reserved for failures to run the tool at all.
#[async_trait]
pub trait Transcoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        params: &TranscodeParams,
    ) -> Result<TranscodeOutcome>;
}

/// Transcoder backed by a local ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_bin: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(cfg: &Settings) -> Self {
        Self {
            ffmpeg_bin: cfg.ffmpeg_bin.clone(),
        }
    }
}

/// Build the ffmpeg argument list for a conversion
///
/// - Video: libx264 at the configured CRF, level and preset
/// - Audio: native AAC encoder in VBR mode
/// - Subtitles: converted to mov_text so they survive in MP4
/// - moov atom moved to the front for progressive playback
pub fn build_command(input: &Path, output: &Path, params: &TranscodeParams) -> Vec<String> {
    let mut args = Vec::new();

    // Overwrite the claim marker left in the working path
    args.push("-y".to_string());

    // Input file
    args.push("-i".to_string());
    args.push(input.to_string_lossy().to_string());

    // Video
    args.push("-c:v".to_string());
    args.push("libx264".to_string());
    args.push("-crf".to_string());
    args.push(params.video_quality.to_string());

    if let Some(level) = &params.h264_level {
        args.push("-level".to_string());
        args.push(level.clone());
    }

    args.extend(params.extra_args.iter().cloned());

    args.push("-preset".to_string());
    args.push(params.speed_preset.clone());

    // Audio
    args.push("-c:a".to_string());
    args.push("aac".to_string());
    args.push("-q:a".to_string());
    args.push(params.audio_quality.to_string());

    // Subtitles
    args.push("-c:s".to_string());
    args.push("mov_text".to_string());

    // Muxing options
    args.push("-movflags".to_string());
    args.push("+faststart".to_string());
    args.push("-strict".to_string());
    args.push("-2".to_string());

    // Output file
    args.push(output.to_string_lossy().to_string());

    args
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        params: &TranscodeParams,
    ) -> Result<TranscodeOutcome> {
        let args = build_command(input, output, params);
        debug!("Running Command: {} {:?}", self.ffmpeg_bin.display(), args);

        let result = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .with_context(|| format!(
                "Failed to execute ffmpeg at {} for: {}",
                self.ffmpeg_bin.display(),
                input.display()
            ))?;

        let exit_code = result.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&result.stderr).to_string();
        debug!("ffmpeg exit code: {}, stderr length: {}", exit_code, stderr.len());

        Ok(TranscodeOutcome { exit_code, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn default_params() -> TranscodeParams {
        TranscodeParams::from_settings(&Settings::default())
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_default_command_line() {
        let args = build_command(
            Path::new("/media/movie.avi"),
            Path::new("/tmp/abc.mp4"),
            &default_params(),
        );
        let expected: Vec<String> = [
            "-y", "-i", "/media/movie.avi", "-c:v", "libx264", "-crf", "21", "-level", "4.0",
            "-preset", "veryfast", "-c:a", "aac", "-q:a", "6", "-c:s", "mov_text",
            "-movflags", "+faststart", "-strict", "-2", "/tmp/abc.mp4",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_level_is_optional() {
        let mut params = default_params();
        params.h264_level = None;
        let args = build_command(Path::new("in.avi"), Path::new("out.mp4"), &params);
        assert!(!args.contains(&"-level".to_string()));
    }

    #[test]
    fn test_empty_level_in_settings_is_dropped() {
        let cfg = Settings {
            h264_level: Some(String::new()),
            ..Settings::default()
        };
        assert_eq!(TranscodeParams::from_settings(&cfg).h264_level, None);
    }

    #[test]
    fn test_passthrough_args_come_before_preset() {
        let mut params = default_params();
        params.extra_args = vec!["-af".to_string(), "volume=5dB".to_string()];
        let args = build_command(Path::new("in.avi"), Path::new("out.mp4"), &params);
        let af = args.iter().position(|a| a == "-af").unwrap();
        let preset = args.iter().position(|a| a == "-preset").unwrap();
        assert!(af < preset);
        assert_eq!(value_after(&args, "-af"), Some("volume=5dB"));
    }

    #[test]
    fn test_paths_with_spaces_and_quotes_stay_single_arguments() {
        let input = Path::new("/media/My \"Best\" Movie; rm -rf.avi");
        let args = build_command(input, Path::new("/tmp/out.mp4"), &default_params());
        assert_eq!(value_after(&args, "-i"), Some("/media/My \"Best\" Movie; rm -rf.avi"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let cfg = Settings {
            ffmpeg_bin: PathBuf::from("/nonexistent/bin/ffmpeg"),
            ..Settings::default()
        };
        let transcoder = FfmpegTranscoder::new(&cfg);
        let result = transcoder
            .transcode(Path::new("in.avi"), Path::new("out.mp4"), &default_params())
            .await;
        assert!(result.is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_output_is_always_last_and_codecs_fixed(
            crf in 0u8..52,
            aq in 0u8..10,
            preset in prop_oneof![Just("ultrafast"), Just("veryfast"), Just("medium"), Just("slow")],
        ) {
            let params = TranscodeParams {
                video_quality: crf,
                h264_level: None,
                speed_preset: preset.to_string(),
                audio_quality: aq,
                extra_args: Vec::new(),
            };
            let args = build_command(Path::new("in.mkv"), Path::new("/tmp/w.mp4"), &params);
            prop_assert_eq!(args.last().map(String::as_str), Some("/tmp/w.mp4"));
            prop_assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
            prop_assert_eq!(value_after(&args, "-c:a"), Some("aac"));
            let crf_s = crf.to_string();
            prop_assert_eq!(value_after(&args, "-crf"), Some(crf_s.as_str()));
            prop_assert_eq!(value_after(&args, "-preset"), Some(preset));
        }
    }
}
