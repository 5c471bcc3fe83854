//! Turns form input into jobs and job events into what the window shows.
//!
//! The controller owns at most one [`RunnerHandle`]. The window calls
//! [`Controller::poll`] once per frame to drain it; nothing here blocks.

use crate::error::{ConfigurationError, JobError};
use crate::fsutil::{bytes_free, format_bytes, is_url, strip_ansi_codes};
use crate::model::{AudioCodec, JobDescriptor, OutputKind, AUDIO_BITRATES};
use crate::prefs::{keys, PreferenceSnapshot, PreferenceStore};
use crate::runner::{JobRunner, ProgressEvent, RunnerHandle};
use std::path::{Path, PathBuf};

pub const DEFAULT_BITRATE: u32 = 192;

/// Below this much free space at the destination the log gets a warning.
pub const LOW_SPACE_BYTES: u64 = 512 * 1024 * 1024;

/// Output format picked in the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatChoice {
    Audio(AudioCodec),
    Video,
    RawAudio,
}

impl FormatChoice {
    pub fn all() -> Vec<FormatChoice> {
        let mut all: Vec<FormatChoice> = AudioCodec::ALL.into_iter().map(FormatChoice::Audio).collect();
        all.push(FormatChoice::Video);
        all.push(FormatChoice::RawAudio);
        all
    }

    /// Key stored in the preference file.
    pub fn key(self) -> &'static str {
        match self {
            FormatChoice::Audio(codec) => codec.as_str(),
            FormatChoice::Video => "video",
            FormatChoice::RawAudio => "bestaudio",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "video" => Some(FormatChoice::Video),
            "bestaudio" => Some(FormatChoice::RawAudio),
            other => AudioCodec::parse(other).map(FormatChoice::Audio),
        }
    }

    pub fn label(self) -> String {
        match self {
            FormatChoice::Audio(codec) => codec.as_str().to_uppercase(),
            FormatChoice::Video => "Video (MP4)".to_string(),
            FormatChoice::RawAudio => "Best audio (no conversion)".to_string(),
        }
    }
}

/// Everything the user can set in the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    /// Media link as typed
    pub url: String,
    /// Destination folder as typed or picked
    pub output_dir: String,
    pub format: FormatChoice,
    /// Only used for lossy audio
    pub bitrate_kbps: u32,
    /// Height ceiling for video; `None` is best available.
    pub resolution: Option<u32>,
    /// Whole playlist instead of one item
    pub playlist: bool,
    pub embed_metadata: bool,
    pub save_thumbnail: bool,
    /// Open the destination after a successful job
    pub open_folder: bool,
}

impl FormState {
    /// Form as last saved, with `default_dir` for a missing output folder.
    pub fn from_prefs(prefs: &PreferenceSnapshot, default_dir: &Path) -> Self {
        let bitrate = prefs.get_int(keys::AUDIO_BITRATE, i64::from(DEFAULT_BITRATE));
        let bitrate_kbps = AUDIO_BITRATES
            .into_iter()
            .find(|b| i64::from(*b) == bitrate)
            .unwrap_or(DEFAULT_BITRATE);
        let resolution = match prefs.get_int(keys::RESOLUTION, 0) {
            h if h > 0 => u32::try_from(h).ok(),
            _ => None,
        };

        Self {
            url: String::new(),
            output_dir: prefs
                .get_str(keys::OUTPUT_DIR)
                .map(str::to_string)
                .unwrap_or_else(|| default_dir.display().to_string()),
            format: prefs
                .get_str(keys::FORMAT)
                .and_then(FormatChoice::from_key)
                .unwrap_or(FormatChoice::Audio(AudioCodec::Mp3)),
            bitrate_kbps,
            resolution,
            playlist: prefs.get_bool(keys::PLAYLIST, false),
            embed_metadata: prefs.get_bool(keys::EMBED_METADATA, false),
            save_thumbnail: prefs.get_bool(keys::SAVE_THUMBNAIL, false),
            open_folder: prefs.get_bool(keys::OPEN_FOLDER, false),
        }
    }

    /// Copies the persistent options into `prefs`. Returns whether any changed.
    pub fn write_prefs(&self, prefs: &mut PreferenceSnapshot) -> bool {
        let mut changed = false;
        changed |= prefs.set(keys::OUTPUT_DIR, self.output_dir.as_str());
        changed |= prefs.set(keys::FORMAT, self.format.key());
        changed |= prefs.set(keys::AUDIO_BITRATE, self.bitrate_kbps);
        changed |= prefs.set(keys::RESOLUTION, self.resolution.unwrap_or(0));
        changed |= prefs.set(keys::PLAYLIST, self.playlist);
        changed |= prefs.set(keys::EMBED_METADATA, self.embed_metadata);
        changed |= prefs.set(keys::SAVE_THUMBNAIL, self.save_thumbnail);
        changed |= prefs.set(keys::OPEN_FOLDER, self.open_folder);
        changed
    }

    pub fn output_kind(&self) -> OutputKind {
        match self.format {
            FormatChoice::Audio(codec) => OutputKind::AudioCodec {
                codec,
                bitrate_kbps: self.bitrate_kbps,
            },
            FormatChoice::Video => OutputKind::Video {
                ceiling: self.resolution,
            },
            FormatChoice::RawAudio => OutputKind::RawBestAudio,
        }
    }

    pub fn to_descriptor(&self) -> JobDescriptor {
        JobDescriptor::new(self.url.trim(), PathBuf::from(self.output_dir.trim()), self.output_kind())
            .with_playlist(self.playlist)
            .with_metadata(self.embed_metadata)
            .with_thumbnail(self.save_thumbnail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeTone {
    Success,
    Error,
    Cancelled,
}

/// Message shown once a job is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub tone: NoticeTone,
    /// Window title
    pub title: String,
    pub message: String,
}

/// Why a start request never reached the runner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartRejected {
    #[error("a download is already running")]
    Busy,
    #[error(transparent)]
    Invalid(#[from] ConfigurationError),
}

/// What the window should show for one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    /// Replaces the status line
    pub status: Option<String>,
    /// Appended to the log
    pub log: Option<String>,
    /// Pop-up to show
    pub notice: Option<Notice>,
}

/// Maps one job event to status, log and notice updates.
pub fn render(event: &ProgressEvent) -> Rendered {
    match event {
        ProgressEvent::InfoResolved {
            title,
            item_count,
            approx_size,
            ..
        } => {
            let header = match item_count {
                Some(n) if *n > 1 => format!("🎵 {title} ({n} items)"),
                _ => format!("🎵 {title}"),
            };
            let log = match approx_size {
                Some(size) => format!("Found: {header}, about {}", format_bytes(*size)),
                None => format!("Found: {header}"),
            };
            Rendered {
                status: Some(header),
                log: Some(log),
                notice: None,
            }
        }
        ProgressEvent::Downloading {
            title,
            percent,
            speed,
            eta,
        } => {
            let mut line = String::from("⬇️ Downloading");
            if let Some(title) = title {
                line.push_str(&format!(" {title}"));
            }
            line.push_str("...");
            if let Some(p) = percent {
                line.push_str(&format!(" {:.1}%", p * 100.0));
            }
            if let Some(speed) = speed {
                line.push_str(&format!(" @ {speed}"));
            }
            if let Some(eta) = eta {
                line.push_str(&format!(" (ETA {eta})"));
            }
            Rendered {
                status: Some(line),
                log: None,
                notice: None,
            }
        }
        ProgressEvent::Stage { name } => Rendered {
            status: Some(format!("🔄 Converting / processing ({name})...")),
            log: Some(format!("Processing: {name}")),
            notice: None,
        },
        ProgressEvent::Completed { outputs } => {
            let message = match outputs.as_slice() {
                [] => "Download finished.".to_string(),
                [one] => format!("Saved {}", one.display()),
                many => format!("Saved {} files.", many.len()),
            };
            Rendered {
                status: Some("✅ Done!".to_string()),
                log: Some("✅ All done!".to_string()),
                notice: Some(Notice {
                    tone: NoticeTone::Success,
                    title: "Complete".to_string(),
                    message,
                }),
            }
        }
        ProgressEvent::Failed(JobError::Cancelled) => Rendered {
            status: Some("⏹️ Stopped.".to_string()),
            log: Some("Download stopped by user.".to_string()),
            notice: Some(Notice {
                tone: NoticeTone::Cancelled,
                title: "Stopped".to_string(),
                message: "The download was cancelled.".to_string(),
            }),
        },
        ProgressEvent::Failed(err) => Rendered {
            status: Some("❌ Error occurred.".to_string()),
            log: Some(format!("❌ Error: {err}")),
            notice: Some(Notice {
                tone: NoticeTone::Error,
                // Nothing was downloaded when the job never got going
                title: if err.is_configuration() {
                    "Cannot start".to_string()
                } else {
                    "Error".to_string()
                },
                message: err.to_string(),
            }),
        },
    }
}

/// The job the controller is currently draining.
struct ActiveJob {
    handle: RunnerHandle,
    /// Folder the files land in
    destination: PathBuf,
    /// Snapshot of the form option at start time
    open_folder: bool,
}

type FolderOpener = Box<dyn FnMut(&Path)>;

/// UI-side state of the downloader window
pub struct Controller {
    /// Runs the jobs
    runner: JobRunner,
    /// Where the options are persisted
    store: PreferenceStore,
    /// Last saved options
    prefs: PreferenceSnapshot,
    /// Current form input, edited directly by the window
    pub form: FormState,
    /// Running job, if any
    active: Option<ActiveJob>,
    /// One-line status above the progress bar
    status: String,
    /// Fraction of the current item, when known
    progress: Option<f32>,
    /// Log lines of the current job
    log: Vec<String>,
    /// Pop-up shown once a job ends
    notice: Option<Notice>,
    /// Thumbnail URL waiting to be fetched by the window
    thumbnail_request: Option<String>,
    /// Opens the destination folder after a successful job
    open_folder: FolderOpener,
}

impl Controller {
    pub fn new(
        runner: JobRunner,
        store: PreferenceStore,
        prefs: PreferenceSnapshot,
        default_dir: &Path,
    ) -> Self {
        let form = FormState::from_prefs(&prefs, default_dir);
        Self {
            runner,
            store,
            prefs,
            form,
            active: None,
            status: String::new(),
            progress: None,
            log: Vec::new(),
            notice: None,
            thumbnail_request: None,
            open_folder: Box::new(|dir| open_in_file_manager(dir.to_path_buf())),
        }
    }

    /// Replaces how finished downloads open their folder.
    pub fn with_folder_opener(mut self, opener: impl FnMut(&Path) + 'static) -> Self {
        self.open_folder = Box::new(opener);
        self
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn has_transcoder(&self) -> bool {
        self.runner.has_transcoder()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Fraction of the current item, when known.
    pub fn progress(&self) -> Option<f32> {
        self.progress
    }

    pub fn log_lines(&self) -> &[String] {
        &self.log
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Thumbnail URL the window has not fetched yet.
    pub fn take_thumbnail_request(&mut self) -> Option<String> {
        self.thumbnail_request.take()
    }

    /// Persists the form's options if they changed since the last call.
    pub fn options_changed(&mut self) {
        if self.form.write_prefs(&mut self.prefs) {
            self.store.save(&self.prefs);
        }
    }

    pub fn start(&mut self) -> Result<(), StartRejected> {
        if self.active.is_some() {
            return Err(StartRejected::Busy);
        }

        let job = self.form.to_descriptor();
        if let Err(e) = check_form(&job) {
            self.status = format!("⚠️ {e}");
            self.push_log(format!("Not started: {e}"));
            return Err(e.into());
        }

        self.options_changed();
        self.log.clear();
        self.notice = None;
        self.progress = None;
        self.thumbnail_request = None;

        if !is_url(job.source()) {
            log::warn!("{} does not look like a URL", job.source());
            self.push_log(format!("Warning: {} does not look like a URL", job.source()));
        }
        self.push_log(format!("URL: {}", job.source()));
        self.push_log(format!("Saving to: {}", job.destination_dir().display()));
        self.push_log(format!("Format: {}", describe_kind(job.output_kind())));
        self.push_log(format!(
            "Playlist mode: {}",
            if job.include_playlist() { "On" } else { "Off" }
        ));
        if let Some(free) = bytes_free(job.destination_dir()) {
            self.push_log(format!("Free space: {}", format_bytes(free)));
            if let Some(warning) = space_warning(free, LOW_SPACE_BYTES) {
                log::warn!("{} is low on space", job.destination_dir().display());
                self.push_log(warning);
            }
        }
        self.status = "🔄 Starting...".to_string();

        let destination = job.destination_dir().to_path_buf();
        let handle = self.runner.start(job);
        self.active = Some(ActiveJob {
            handle,
            destination,
            open_folder: self.form.open_folder,
        });
        Ok(())
    }

    /// Requests cancellation of the running job, if any.
    pub fn stop(&mut self) {
        if let Some(active) = &self.active {
            if !active.handle.is_cancel_requested() {
                active.handle.cancel();
                self.status = "⏹️ Stopping...".to_string();
                self.push_log("Stop requested; waiting for the download to halt.".to_string());
            }
        }
    }

    /// Applies every queued event. Returns how many were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        let mut finished = false;

        if let Some(active) = self.active.as_mut() {
            let mut events = Vec::new();
            while let Some(event) = active.handle.try_next() {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    finished = true;
                    break;
                }
            }
            handled = events.len();
            for event in events {
                self.apply(event);
            }
        }

        if finished {
            if let Some(active) = self.active.take() {
                let completed = self
                    .notice
                    .as_ref()
                    .is_some_and(|n| n.tone == NoticeTone::Success);
                if completed && active.open_folder {
                    (self.open_folder)(&active.destination);
                }
            }
        }
        handled
    }

    fn apply(&mut self, event: ProgressEvent) {
        match &event {
            ProgressEvent::InfoResolved {
                thumbnail_url,
                approx_size,
                ..
            } => {
                self.thumbnail_request = thumbnail_url.clone();
                let free = self
                    .active
                    .as_ref()
                    .and_then(|a| bytes_free(&a.destination));
                if let (Some(free), Some(size)) = (free, approx_size) {
                    if let Some(warning) = space_warning(free, *size) {
                        self.push_log(warning);
                    }
                }
            }
            ProgressEvent::Downloading { percent, .. } => {
                if percent.is_some() {
                    self.progress = *percent;
                }
            }
            ProgressEvent::Completed { .. } => self.progress = Some(1.0),
            _ => {}
        }

        let rendered = render(&event);
        if let Some(status) = rendered.status {
            self.status = status;
        }
        if let Some(line) = rendered.log {
            self.push_log(line);
        }
        if rendered.notice.is_some() {
            self.notice = rendered.notice;
        }
    }

    fn push_log(&mut self, line: String) {
        self.log.push(strip_ansi_codes(&line));
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.handle.cancel();
        }
    }
}

/// Warning line when `free` bytes are fewer than `needed`.
fn space_warning(free: u64, needed: u64) -> Option<String> {
    (free < needed).then(|| {
        format!(
            "⚠️ Low disk space: {} free, about {} needed",
            format_bytes(free),
            format_bytes(needed)
        )
    })
}

/// The checks the window makes before bothering the runner.
fn check_form(job: &JobDescriptor) -> Result<(), ConfigurationError> {
    if job.source().is_empty() {
        return Err(ConfigurationError::EmptySource);
    }
    let dest = job.destination_dir();
    if !dest.is_dir() {
        return Err(ConfigurationError::DestinationMissing(dest.to_path_buf()));
    }
    Ok(())
}

fn describe_kind(kind: OutputKind) -> String {
    match kind {
        OutputKind::AudioCodec { codec, .. } if codec.is_lossless() => codec.as_str().to_uppercase(),
        OutputKind::AudioCodec {
            codec,
            bitrate_kbps,
        } => format!("{} @ {} kbps", codec.as_str().to_uppercase(), bitrate_kbps),
        OutputKind::Video { ceiling: Some(h) } => format!("video up to {h}p"),
        OutputKind::Video { ceiling: None } => "video (best)".to_string(),
        OutputKind::RawBestAudio => "best audio, unconverted".to_string(),
    }
}

/// Opens `folder` in the platform file manager without blocking.
pub fn open_in_file_manager(folder: PathBuf) {
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        let result = std::process::Command::new("explorer").arg(&folder).spawn();
        #[cfg(target_os = "macos")]
        let result = std::process::Command::new("open").arg(&folder).spawn();
        #[cfg(all(unix, not(target_os = "macos")))]
        let result = std::process::Command::new("xdg-open").arg(&folder).spawn();

        if let Err(e) = result {
            log::warn!("could not open {}: {}", folder.display(), e);
        }
    });
}
