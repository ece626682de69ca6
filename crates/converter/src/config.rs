use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Canonical names of the profile every converted file must match.
///
/// The names are the format identifiers reported by the metadata probe
/// (MediaInfo), not ffmpeg codec names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetProfile {
    /// Container format reported for the General track
    pub container: String,
    /// Video format reported for the Video track
    pub video_codec: String,
    /// Audio format reported for the first Audio track
    pub audio_codec: String,
    /// File extension of converted output (without the dot)
    pub extension: String,
}

impl Default for TargetProfile {
    fn default() -> Self {
        Self {
            container: "MPEG-4".to_string(),
            video_codec: "AVC".to_string(),
            audio_codec: "AAC".to_string(),
            extension: "mp4".to_string(),
        }
    }
}

/// Configuration for a conversion run
///
/// Built once at startup and passed by reference to the scanner,
/// classifier and pipeline. Nothing mutates it after loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding in-progress working files (`{token}.{ext}`)
    pub tmp_dir: PathBuf,
    /// Move originals here instead of deleting them
    pub keep_original: bool,
    /// Flat archive directory used when `keep_original` is set
    pub archive_dir: PathBuf,
    /// Append-only report log; `None` logs to stderr
    pub report_file: Option<PathBuf>,
    /// x264 speed preset (ultrafast .. veryslow)
    pub conversion_speed: String,
    /// x264 constant rate factor
    pub video_quality: u8,
    /// H.264 level passed to the encoder, if any
    pub h264_level: Option<String>,
    /// AAC VBR quality
    pub audio_quality: u8,
    /// Extra ffmpeg arguments inserted before the preset, one argument per entry
    pub custom_ffmpeg_args: Vec<String>,
    /// Walk the whole state machine without invoking ffmpeg or touching files
    pub dry_run: bool,
    /// Extensions to consider, with or without a leading dot
    pub file_types: Vec<String>,
    /// Path to the ffmpeg binary
    pub ffmpeg_bin: PathBuf,
    /// Path to the mediainfo binary
    pub mediainfo_bin: PathBuf,
    /// Profile converted files must match
    pub target: TargetProfile,
}

impl Default for Settings {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Settings {
    /// Create a default configuration matching the stock converter setup
    pub fn default_config() -> Self {
        Self {
            tmp_dir: PathBuf::from("/tmp"),
            keep_original: false,
            archive_dir: PathBuf::from("/media/converted-sources"),
            report_file: Some(PathBuf::from("report.txt")),
            conversion_speed: "veryfast".to_string(),
            video_quality: 21,
            h264_level: Some("4.0".to_string()),
            audio_quality: 6,
            custom_ffmpeg_args: Vec::new(),
            dry_run: false,
            file_types: [
                "asf", "asx", "avi", "divx", "flv", "m2ts", "m4v", "mkv", "mov", "mp4",
                "mpeg", "mpg", "vob", "wmv",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            mediainfo_bin: PathBuf::from("mediainfo"),
            target: TargetProfile::default(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // TOML by extension, JSON otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// Check whether a file extension is on the allow-list (case-insensitive)
    pub fn accepts_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.file_types
            .iter()
            .any(|t| t.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}
