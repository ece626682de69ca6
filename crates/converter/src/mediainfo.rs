use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use tokio::process::Command;
use crate::config::Settings;

/// Kind of a track as reported by MediaInfo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Container-level information
    General,
    Video,
    Audio,
    /// Text, menu, image and anything else we don't look at
    Other,
}

impl TrackKind {
    fn from_type(track_type: &str) -> Self {
        match track_type {
            "General" => TrackKind::General,
            "Video" => TrackKind::Video,
            "Audio" => TrackKind::Audio,
            _ => TrackKind::Other,
        }
    }
}

/// One track of a probed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub kind: TrackKind,
    pub format: Option<String>,
}

impl Track {
    pub fn new(kind: TrackKind, format: Option<&str>) -> Self {
        Self {
            kind,
            format: format.map(str::to_string),
        }
    }
}

/// Source of container/codec metadata for a file
///
/// A probe is a pure query: it must not modify the file.
#[async_trait]
pub trait MetadataProbe {
    async fn probe(&self, path: &Path) -> Result<Vec<Track>>;
}

/// Probe backed by the `mediainfo` CLI
#[derive(Debug, Clone)]
pub struct MediaInfoProbe {
    mediainfo_bin: PathBuf,
}

impl MediaInfoProbe {
    pub fn new(cfg: &Settings) -> Self {
        Self {
            mediainfo_bin: cfg.mediainfo_bin.clone(),
        }
    }
}

#[async_trait]
impl MetadataProbe for MediaInfoProbe {
    async fn probe(&self, path: &Path) -> Result<Vec<Track>> {
        // Verify file exists before trying to probe
        if !path.exists() {
            anyhow::bail!("File does not exist: {}", path.display());
        }

        debug!("mediainfo: probing {}", path.display());

        let output = Command::new(&self.mediainfo_bin)
            .arg("--Output=JSON")
            .arg(path)
            .output()
            .await
            .with_context(|| format!("Failed to execute mediainfo for: {}", path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "mediainfo failed (exit code {}) for {}: {}",
                output.status.code().unwrap_or(-1),
                path.display(),
                stderr.trim()
            );
        }

        let json_str = String::from_utf8(output.stdout)
            .context("mediainfo output is not valid UTF-8")?;

        parse_tracks(&json_str)
            .with_context(|| format!("Failed to parse mediainfo JSON for: {}", path.display()))
    }
}

#[derive(Debug, Deserialize)]
struct MiOutput {
    media: Option<MiMedia>,
}

#[derive(Debug, Deserialize)]
struct MiMedia {
    #[serde(default)]
    track: Vec<MiTrack>,
}

#[derive(Debug, Deserialize)]
struct MiTrack {
    #[serde(rename = "@type")]
    track_type: String,
    #[serde(rename = "Format")]
    format: Option<String>,
}

/// Turn `mediainfo --Output=JSON` output into tracks, in file order
pub fn parse_tracks(json: &str) -> Result<Vec<Track>> {
    let mi: MiOutput = serde_json::from_str(json)?;

    // Unrecognised files come back as {"media": null}
    let tracks = mi
        .media
        .map(|m| m.track)
        .unwrap_or_default()
        .into_iter()
        .map(|t| Track {
            kind: TrackKind::from_type(&t.track_type),
            format: t.format,
        })
        .collect();

    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AVI_JSON: &str = r#"{
        "creatingLibrary": {"name": "MediaInfoLib", "version": "23.04"},
        "media": {
            "@ref": "/media/movie.avi",
            "track": [
                {"@type": "General", "Format": "AVI", "FileSize": "734003200"},
                {"@type": "Video", "Format": "MPEG-4 Visual", "Width": "720"},
                {"@type": "Audio", "Format": "MPEG Audio", "Channels": "2"}
            ]
        }
    }"#;

    #[test]
    fn test_parse_avi() {
        let tracks = parse_tracks(AVI_JSON).unwrap();
        assert_eq!(
            tracks,
            vec![
                Track::new(TrackKind::General, Some("AVI")),
                Track::new(TrackKind::Video, Some("MPEG-4 Visual")),
                Track::new(TrackKind::Audio, Some("MPEG Audio")),
            ]
        );
    }

    #[test]
    fn test_parse_keeps_every_audio_track_and_other_kinds() {
        let json = r#"{"media": {"track": [
            {"@type": "General", "Format": "Matroska"},
            {"@type": "Video", "Format": "AVC"},
            {"@type": "Audio", "Format": "AAC"},
            {"@type": "Audio", "Format": "AC-3"},
            {"@type": "Text", "Format": "UTF-8"},
            {"@type": "Menu"}
        ]}}"#;
        let tracks = parse_tracks(json).unwrap();
        assert_eq!(tracks.len(), 6);
        assert_eq!(tracks.iter().filter(|t| t.kind == TrackKind::Audio).count(), 2);
        assert_eq!(tracks[5], Track::new(TrackKind::Other, None));
    }

    #[test]
    fn test_parse_unrecognised_file() {
        assert!(parse_tracks(r#"{"media": null}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_an_error() {
        assert!(parse_tracks("mediainfo: not json").is_err());
    }

    #[tokio::test]
    async fn test_probe_missing_file_fails() {
        let probe = MediaInfoProbe::new(&Settings::default());
        let err = probe.probe(Path::new("/nonexistent/movie.avi")).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
