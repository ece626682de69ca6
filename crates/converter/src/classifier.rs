use std::fmt;
use std::path::Path;
use log::{error, info};
use crate::config::TargetProfile;
use crate::mediainfo::{Track, TrackKind};

/// Formats found in a probed file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackProfile {
    pub container_format: Option<String>,
    pub video_codec: Option<String>,
    /// One entry per audio track, in file order
    pub audio_codecs: Vec<String>,
}

impl TrackProfile {
    /// Build a profile from probe output
    ///
    /// If a file reports several General or Video tracks the last one wins.
    /// Audio tracks without a format still count towards the track total.
    pub fn from_tracks(tracks: &[Track]) -> Self {
        let mut profile = TrackProfile::default();
        for track in tracks {
            match track.kind {
                TrackKind::General => profile.container_format = track.format.clone(),
                TrackKind::Video => profile.video_codec = track.format.clone(),
                TrackKind::Audio => profile
                    .audio_codecs
                    .push(track.format.clone().unwrap_or_default()),
                TrackKind::Other => {}
            }
        }
        profile
    }
}

/// A way in which a file misses the target profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    Container { found: Option<String>, expected: String },
    VideoCodec { found: Option<String>, expected: String },
    AudioCodec { found: String, expected: String },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::Container { found, expected } => {
                write!(f, "Container is not {} ({})", expected, found.as_deref().unwrap_or("none"))
            }
            Issue::VideoCodec { found, expected } => {
                write!(f, "Video codec is not {} ({})", expected, found.as_deref().unwrap_or("none"))
            }
            Issue::AudioCodec { found, expected } => {
                write!(f, "Audio codec is not {} ({})", expected, found)
            }
        }
    }
}

/// Outcome of classifying one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Already matches the target profile
    Conforming,
    /// Needs a transcode, for the listed reasons
    NeedsConversion(Vec<Issue>),
    /// Cannot be converted by this tool (audio track count other than one)
    Unsupported { audio_tracks: usize },
}

impl Classification {
    pub fn needs_conversion(&self) -> bool {
        matches!(self, Classification::NeedsConversion(_))
    }
}

/// Decides whether files match the target profile
pub struct Classifier<'a> {
    target: &'a TargetProfile,
}

impl<'a> Classifier<'a> {
    pub fn new(target: &'a TargetProfile) -> Self {
        Classifier { target }
    }

    /// Collect every way the profile misses the target
    pub fn issues(&self, profile: &TrackProfile) -> Vec<Issue> {
        let mut issues = Vec::new();

        if profile.container_format.as_deref() != Some(self.target.container.as_str()) {
            issues.push(Issue::Container {
                found: profile.container_format.clone(),
                expected: self.target.container.clone(),
            });
        }

        if profile.video_codec.as_deref() != Some(self.target.video_codec.as_str()) {
            issues.push(Issue::VideoCodec {
                found: profile.video_codec.clone(),
                expected: self.target.video_codec.clone(),
            });
        }

        if let Some(first) = profile.audio_codecs.first() {
            if first != &self.target.audio_codec {
                issues.push(Issue::AudioCodec {
                    found: first.clone(),
                    expected: self.target.audio_codec.clone(),
                });
            }
        }

        issues
    }

    /// Classify a probed file
    ///
    /// The audio track count is checked last but overrides everything else:
    /// the transcode command line only addresses a single audio stream.
    pub fn classify(&self, path: &Path, profile: &TrackProfile) -> Classification {
        let issues = self.issues(profile);
        for issue in &issues {
            info!("ISSUE: {}", issue);
        }

        if profile.audio_codecs.len() != 1 {
            error!(
                "ERROR: Expected exactly one audio track, found {}: {}",
                profile.audio_codecs.len(),
                path.display()
            );
            return Classification::Unsupported {
                audio_tracks: profile.audio_codecs.len(),
            };
        }

        if issues.is_empty() {
            Classification::Conforming
        } else {
            Classification::NeedsConversion(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn profile(container: Option<&str>, video: Option<&str>, audio: &[&str]) -> TrackProfile {
        TrackProfile {
            container_format: container.map(str::to_string),
            video_codec: video.map(str::to_string),
            audio_codecs: audio.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn container_format() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(Some("MPEG-4".to_string())),
            Just(Some("AVI".to_string())),
            Just(Some("Matroska".to_string())),
            Just(Some("QuickTime".to_string())),
            Just(None),
        ]
    }

    fn video_codec() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(Some("AVC".to_string())),
            Just(Some("HEVC".to_string())),
            Just(Some("MPEG-4 Visual".to_string())),
            Just(Some("VC-1".to_string())),
            Just(None),
        ]
    }

    fn audio_codec() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("AAC".to_string()),
            Just("AC-3".to_string()),
            Just("MPEG Audio".to_string()),
            Just("DTS".to_string()),
        ]
    }

    #[test]
    fn test_profile_from_tracks() {
        let tracks = vec![
            Track::new(TrackKind::General, Some("AVI")),
            Track::new(TrackKind::Video, Some("MPEG-4 Visual")),
            Track::new(TrackKind::Audio, Some("MPEG Audio")),
            Track::new(TrackKind::Other, Some("SubRip")),
        ];
        assert_eq!(
            TrackProfile::from_tracks(&tracks),
            profile(Some("AVI"), Some("MPEG-4 Visual"), &["MPEG Audio"])
        );
    }

    #[test]
    fn test_avi_needs_conversion() {
        let target = TargetProfile::default();
        let classifier = Classifier::new(&target);
        let result = classifier.classify(
            Path::new("movie.avi"),
            &profile(Some("AVI"), Some("MPEG-4 Visual"), &["MPEG Audio"]),
        );
        assert_eq!(
            result,
            Classification::NeedsConversion(vec![
                Issue::Container { found: Some("AVI".to_string()), expected: "MPEG-4".to_string() },
                Issue::VideoCodec { found: Some("MPEG-4 Visual".to_string()), expected: "AVC".to_string() },
                Issue::AudioCodec { found: "MPEG Audio".to_string(), expected: "AAC".to_string() },
            ])
        );
    }

    #[test]
    fn test_issue_report_lines() {
        let issue = Issue::Container { found: None, expected: "MPEG-4".to_string() };
        assert_eq!(issue.to_string(), "Container is not MPEG-4 (none)");
    }

    #[test]
    fn test_conforming_mp4() {
        let target = TargetProfile::default();
        let classifier = Classifier::new(&target);
        let result = classifier.classify(
            Path::new("clip.mp4"),
            &profile(Some("MPEG-4"), Some("AVC"), &["AAC"]),
        );
        assert_eq!(result, Classification::Conforming);
        assert!(!result.needs_conversion());
    }

    #[test]
    fn test_two_audio_tracks_rejected() {
        let target = TargetProfile::default();
        let classifier = Classifier::new(&target);
        let result = classifier.classify(
            Path::new("film.mkv"),
            &profile(Some("Matroska"), Some("AVC"), &["AAC", "AC-3"]),
        );
        assert_eq!(result, Classification::Unsupported { audio_tracks: 2 });
    }

    #[test]
    fn test_silent_file_rejected() {
        let target = TargetProfile::default();
        let classifier = Classifier::new(&target);
        let result = classifier.classify(
            Path::new("silent.mp4"),
            &profile(Some("MPEG-4"), Some("AVC"), &[]),
        );
        assert_eq!(result, Classification::Unsupported { audio_tracks: 0 });
    }

    #[test]
    fn test_only_first_audio_track_is_compared() {
        let target = TargetProfile::default();
        let classifier = Classifier::new(&target);
        let issues = classifier.issues(&profile(Some("MPEG-4"), Some("AVC"), &["AAC", "DTS"]));
        assert!(issues.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Files without exactly one audio track never enter the pipeline
        #[test]
        fn test_audio_count_other_than_one_is_unsupported(
            container in container_format(),
            video in video_codec(),
            audio in prop::collection::vec(audio_codec(), 0..5),
        ) {
            prop_assume!(audio.len() != 1);
            let target = TargetProfile::default();
            let classifier = Classifier::new(&target);
            let p = TrackProfile { container_format: container, video_codec: video, audio_codecs: audio.clone() };
            prop_assert_eq!(
                classifier.classify(Path::new("x.mkv"), &p),
                Classification::Unsupported { audio_tracks: audio.len() }
            );
        }

        /// With one audio track, conversion is needed iff any format differs
        #[test]
        fn test_single_track_decision(
            container in container_format(),
            video in video_codec(),
            audio in audio_codec(),
        ) {
            let target = TargetProfile::default();
            let classifier = Classifier::new(&target);
            let conforming = container.as_deref() == Some("MPEG-4")
                && video.as_deref() == Some("AVC")
                && audio == "AAC";
            let p = TrackProfile { container_format: container, video_codec: video, audio_codecs: vec![audio] };
            let result = classifier.classify(Path::new("x.mkv"), &p);
            prop_assert_eq!(result.needs_conversion(), !conforming);
            prop_assert_eq!(result == Classification::Conforming, conforming);
        }
    }
}
