//! Brejax: paste a media link, pick a folder and a format, and let `yt-dlp`
//! and `ffmpeg` do the rest while the window shows progress.

pub mod app;
pub mod controller;
pub mod downloader;
pub mod error;
pub mod fsutil;
pub mod model;
pub mod prefs;
pub mod progress;
pub mod runner;
pub mod source;
pub mod thumbnail;
pub mod tools;

pub use controller::Controller;
pub use error::{ConfigurationError, JobError, SourceError};
pub use model::{AudioCodec, JobDescriptor, OutputKind};
pub use runner::{JobRunner, ProgressEvent, RunnerHandle};
pub use source::MediaSource;
