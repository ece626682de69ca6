pub mod config;
pub mod media;
pub mod normalize;
pub mod scan;
pub mod mediainfo;
pub mod classifier;
pub mod claim;
pub mod ffmpeg;
pub mod pipeline;
pub mod runner;

pub use config::{Settings, TargetProfile};
pub use media::MediaFile;
pub use mediainfo::{MediaInfoProbe, MetadataProbe, Track, TrackKind};
pub use classifier::{Classification, Classifier, TrackProfile};
pub use ffmpeg::{FfmpegTranscoder, Transcoder};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use runner::{Runner, RunSummary};
