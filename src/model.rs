//! What a job asks for, and how that maps onto the extractor's options.

use std::fmt;
use std::path::{Path, PathBuf};

/// Audio codecs the extractor can convert to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    Mp3,
    M4a,
    Opus,
    Vorbis,
    Flac,
    Wav,
}

impl AudioCodec {
    /// Every codec, in the order the form lists them
    pub const ALL: [AudioCodec; 6] = [
        AudioCodec::Mp3,
        AudioCodec::M4a,
        AudioCodec::Opus,
        AudioCodec::Vorbis,
        AudioCodec::Flac,
        AudioCodec::Wav,
    ];

    /// Name understood by `--audio-format`.
    pub fn as_str(self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::M4a => "m4a",
            AudioCodec::Opus => "opus",
            AudioCodec::Vorbis => "vorbis",
            AudioCodec::Flac => "flac",
            AudioCodec::Wav => "wav",
        }
    }

    /// Case-insensitive inverse of [`AudioCodec::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Lossless codecs ignore the requested bitrate.
    pub fn is_lossless(self) -> bool {
        matches!(self, AudioCodec::Flac | AudioCodec::Wav)
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitrates offered for lossy audio, in kbps.
pub const AUDIO_BITRATES: [u32; 4] = [128, 192, 256, 320];

/// Height ceilings offered for video. `None` in [`OutputKind::Video`] means best.
pub const VIDEO_HEIGHTS: [u32; 6] = [360, 480, 720, 1080, 1440, 2160];

/// Container used when separate video and audio streams are merged.
pub const MERGE_CONTAINER: &str = "mp4";

/// What kind of file the user wants in the end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Best audio, converted to `codec` at `bitrate_kbps`.
    AudioCodec { codec: AudioCodec, bitrate_kbps: u32 },
    /// Best video at or below `ceiling` pixels high, plus best audio.
    Video { ceiling: Option<u32> },
    /// Best audio stream as served, no conversion.
    RawBestAudio,
}

/// One post-processing step handed to the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostStep {
    /// Convert the downloaded stream to an audio file
    ExtractAudio { codec: AudioCodec, bitrate_kbps: u32 },
    /// Join separate video and audio streams into `container`
    MergeStreams { container: &'static str },
    /// Write title, artist and similar tags into the file
    EmbedMetadata,
    /// Keep the thumbnail as a JPEG next to the file
    SaveThumbnail,
}

impl PostStep {
    /// Every step we emit is carried out by the transcoder.
    pub fn requires_transcoder(&self) -> bool {
        match self {
            PostStep::ExtractAudio { .. }
            | PostStep::MergeStreams { .. }
            | PostStep::EmbedMetadata
            | PostStep::SaveThumbnail => true,
        }
    }
}

/// Stream selection and post-processing derived from an [`OutputKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPlan {
    /// Value for `--format`
    pub selector: String,
    /// Primary step first, then the optional extras
    pub steps: Vec<PostStep>,
}

impl OutputKind {
    /// Stream selection expression. The video form ends in `/b` so the
    /// extractor falls back to the best combined stream on its own.
    pub fn selector(&self) -> String {
        match self {
            OutputKind::AudioCodec { .. } => "bestaudio/best".to_string(),
            OutputKind::Video { ceiling: Some(h) } => format!("bv*[height<={h}]+ba/b"),
            OutputKind::Video { ceiling: None } => "bv*+ba/b".to_string(),
            OutputKind::RawBestAudio => "bestaudio".to_string(),
        }
    }

    /// The primary post-processing step, if this kind needs one.
    pub fn primary_step(&self) -> Option<PostStep> {
        match *self {
            OutputKind::AudioCodec {
                codec,
                bitrate_kbps,
            } => Some(PostStep::ExtractAudio {
                codec,
                bitrate_kbps,
            }),
            OutputKind::Video { .. } => Some(PostStep::MergeStreams {
                container: MERGE_CONTAINER,
            }),
            OutputKind::RawBestAudio => None,
        }
    }
}

/// One requested download. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Link or search text, trimmed
    source: String,
    /// Folder the files are written to
    destination_dir: PathBuf,
    /// Requested output
    output_kind: OutputKind,
    /// Download the whole playlist instead of the single item
    include_playlist: bool,
    /// Embed tags into the output
    embed_metadata: bool,
    /// Keep the thumbnail next to the output
    save_thumbnail: bool,
}

impl JobDescriptor {
    /// A single-item job with no extras.
    pub fn new(
        source: impl Into<String>,
        destination_dir: impl Into<PathBuf>,
        output_kind: OutputKind,
    ) -> Self {
        Self {
            source: source.into().trim().to_string(),
            destination_dir: destination_dir.into(),
            output_kind,
            include_playlist: false,
            embed_metadata: false,
            save_thumbnail: false,
        }
    }

    pub fn with_playlist(mut self, yes: bool) -> Self {
        self.include_playlist = yes;
        self
    }

    pub fn with_metadata(mut self, yes: bool) -> Self {
        self.embed_metadata = yes;
        self
    }

    pub fn with_thumbnail(mut self, yes: bool) -> Self {
        self.save_thumbnail = yes;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    pub fn output_kind(&self) -> OutputKind {
        self.output_kind
    }

    pub fn include_playlist(&self) -> bool {
        self.include_playlist
    }

    pub fn embed_metadata(&self) -> bool {
        self.embed_metadata
    }

    pub fn save_thumbnail(&self) -> bool {
        self.save_thumbnail
    }

    /// Resolves the selector and the ordered list of post-processing steps.
    pub fn plan(&self) -> FormatPlan {
        let mut steps: Vec<PostStep> = self.output_kind.primary_step().into_iter().collect();
        if self.embed_metadata {
            steps.push(PostStep::EmbedMetadata);
        }
        if self.save_thumbnail {
            steps.push(PostStep::SaveThumbnail);
        }
        FormatPlan {
            selector: self.output_kind.selector(),
            steps,
        }
    }

    pub fn requires_transcoder(&self) -> bool {
        self.plan().steps.iter().any(PostStep::requires_transcoder)
    }
}
