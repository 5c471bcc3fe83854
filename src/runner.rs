//! Runs one download off the UI thread and reports what happens to it.
//!
//! Every job produces, in order: at most one [`ProgressEvent::InfoResolved`],
//! any number of [`ProgressEvent::Downloading`] / [`ProgressEvent::Stage`],
//! and exactly one terminal event. Nothing is sent after the terminal event.
//!
//! Cancellation is cooperative. [`RunnerHandle::cancel`] only sets a flag;
//! the source sees it the next time it reports progress. There is no timeout.

use crate::error::{Cancelled, ConfigurationError, JobError, SourceError};
use crate::fsutil::{sanitize_filename, unique_path};
use crate::model::{JobDescriptor, PostStep};
use crate::source::{FetchOutcome, FetchRequest, MediaSource, ProgressHook, SourceUpdate};
use crate::tools::TRANSCODER;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Output name template handed to the extractor, relative to the destination.
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Extensions a saved thumbnail may end up with next to its media file.
const THUMBNAIL_EXTENSIONS: [&str; 3] = ["jpg", "png", "webp"];

/// What the UI hears about a running job
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The source knows what it is fetching (sent at most once)
    InfoResolved {
        /// Playlist title for playlists, item title otherwise
        title: String,
        /// Number of playlist entries, if any
        item_count: Option<u32>,
        /// Preview image of the first item
        thumbnail_url: Option<String>,
        /// Size of the first item's chosen format, in bytes
        approx_size: Option<u64>,
    },
    /// Transfer progress of the current item
    Downloading {
        title: Option<String>,
        /// Fraction in `0.0..=1.0`.
        percent: Option<f32>,
        /// Human-readable rate as the extractor prints it
        speed: Option<String>,
        eta: Option<String>,
    },
    /// A post-processing step (conversion, merge, tagging) began
    Stage {
        name: String,
    },
    /// Terminal: every file the job produced, under its final name
    Completed {
        outputs: Vec<PathBuf>,
    },
    /// Terminal: the job stopped, was cancelled or never started
    Failed(JobError),
}

impl ProgressEvent {
    /// Completed and Failed end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Completed { .. } | ProgressEvent::Failed(_))
    }
}

/// One started job, as seen from the UI thread.
#[derive(Debug)]
pub struct RunnerHandle {
    /// Shared with the worker's event sink
    cancel: Arc<AtomicBool>,
    /// Receiving end of the worker -> UI channel
    events: UnboundedReceiver<ProgressEvent>,
    /// Background task, absent when validation failed
    task: Option<JoinHandle<()>>,
    /// Set once the terminal event was taken
    finished: bool,
}

impl RunnerHandle {
    /// Asks the job to stop at its next progress callback. Never blocks.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel` has been called.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// False when validation failed and nothing was scheduled.
    pub fn has_background_work(&self) -> bool {
        self.task.is_some()
    }

    /// True once the terminal event has been taken from the handle.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next queued event without waiting.
    pub fn try_next(&mut self) -> Option<ProgressEvent> {
        let event = self.events.try_recv().ok()?;
        self.observe(&event);
        Some(event)
    }

    /// Next event, waiting for it. `None` after the terminal event.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        let event = self.events.recv().await?;
        self.observe(&event);
        Some(event)
    }

    fn observe(&mut self, event: &ProgressEvent) {
        if event.is_terminal() {
            self.finished = true;
        }
    }
}

/// Validates jobs and runs them one by one on the blocking pool.
pub struct JobRunner {
    /// Backend that does the actual fetching
    source: Arc<dyn MediaSource>,
    /// Path to ffmpeg, if it was found
    transcoder: Option<PathBuf>,
    /// Runtime the jobs are spawned on
    runtime: Handle,
}

impl JobRunner {
    /// Creates a runner that hands jobs to `source` on `runtime`.
    pub fn new(source: Arc<dyn MediaSource>, transcoder: Option<PathBuf>, runtime: Handle) -> Self {
        Self {
            source,
            transcoder,
            runtime,
        }
    }

    /// Whether post-processing steps can run at all.
    pub fn has_transcoder(&self) -> bool {
        self.transcoder.is_some()
    }

    /// Checks that `job` can run and builds the extractor request for it.
    pub fn validate(&self, job: &JobDescriptor) -> Result<FetchRequest, ConfigurationError> {
        if job.source().is_empty() {
            return Err(ConfigurationError::EmptySource);
        }

        let dest = job.destination_dir();
        if !dest.exists() {
            return Err(ConfigurationError::DestinationMissing(dest.to_path_buf()));
        }
        if !dest.is_dir() {
            return Err(ConfigurationError::DestinationNotDirectory(dest.to_path_buf()));
        }

        self.source.preflight()?;

        let plan = job.plan();
        let needs_transcoder = plan.steps.iter().any(|s| s.requires_transcoder());
        if needs_transcoder && self.transcoder.is_none() {
            return Err(ConfigurationError::ToolMissing {
                tool: TRANSCODER.to_string(),
            });
        }

        Ok(FetchRequest {
            source: job.source().to_string(),
            destination_dir: dest.to_path_buf(),
            output_template: OUTPUT_TEMPLATE.to_string(),
            selector: plan.selector,
            no_playlist: !job.include_playlist(),
            post_steps: plan.steps,
            transcoder: self.transcoder.clone(),
        })
    }

    /// Validates `job` and schedules it. A job that fails validation gets a
    /// handle holding only its `Failed` event and no background task.
    pub fn start(&self, job: JobDescriptor) -> RunnerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));

        let request = match self.validate(&job) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("not starting {}: {}", job.source(), e);
                let _ = tx.send(ProgressEvent::Failed(e.into()));
                return RunnerHandle {
                    cancel,
                    events: rx,
                    task: None,
                    finished: false,
                };
            }
        };

        log::info!(
            "starting {} via {} (format {:?}, {} post steps) into {}",
            request.source,
            self.source.name(),
            request.selector,
            request.post_steps.len(),
            request.destination_dir.display()
        );

        let sink = EventSink {
            tx,
            cancel: Arc::clone(&cancel),
            info_sent: false,
            progress_seen: false,
        };
        let source = Arc::clone(&self.source);
        let task = self
            .runtime
            .spawn_blocking(move || run_job(&*source, &request, sink));

        RunnerHandle {
            cancel,
            events: rx,
            task: Some(task),
            finished: false,
        }
    }

    /// Same as [`RunnerHandle::cancel`].
    pub fn cancel(handle: &RunnerHandle) {
        handle.cancel();
    }
}

/// Body of the background task.
fn run_job(source: &dyn MediaSource, request: &FetchRequest, mut sink: EventSink) {
    let result = catch_unwind(AssertUnwindSafe(|| source.fetch(request, &mut sink)))
        .unwrap_or_else(|panic| Err(SourceError::Failed(panic_message(&*panic))));

    let terminal = match result {
        Ok(FetchOutcome { outputs }) => {
            let with_thumbnails = request.post_steps.contains(&PostStep::SaveThumbnail);
            let outputs = finalize_outputs(&outputs, with_thumbnails);
            log::info!("{} finished ({} files)", request.source, outputs.len());
            ProgressEvent::Completed { outputs }
        }
        Err(e) => {
            // A source may fail in its own words after being told to stop.
            let err = if sink.is_cancel_requested() {
                JobError::Cancelled
            } else {
                JobError::from(e)
            };
            match &err {
                JobError::Cancelled => log::info!("{} cancelled", request.source),
                other => log::error!("{} failed: {}", request.source, other),
            }
            ProgressEvent::Failed(err)
        }
    };
    sink.finish(terminal);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("media source crashed: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("media source crashed: {s}")
    } else {
        "media source crashed".to_string()
    }
}

/// Finalizes every reported file. Saved thumbnails are not reported by the
/// extractor; they are found next to their media file and follow its name.
fn finalize_outputs(outputs: &[PathBuf], with_thumbnails: bool) -> Vec<PathBuf> {
    let mut finished: Vec<PathBuf> = Vec::new();
    for path in outputs {
        let thumbnails = if with_thumbnails {
            thumbnail_siblings(path, outputs)
        } else {
            Vec::new()
        };

        let media = finalize_output(path);
        let stem = media
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        finished.push(media);

        for thumb in thumbnails {
            let target = rename_to_stem(&thumb, &stem);
            if !finished.contains(&target) {
                finished.push(target);
            }
        }
    }
    finished
}

/// Image files sharing `media`'s stem that the extractor did not report.
fn thumbnail_siblings(media: &Path, reported: &[PathBuf]) -> Vec<PathBuf> {
    THUMBNAIL_EXTENSIONS
        .iter()
        .map(|ext| media.with_extension(ext))
        .filter(|p| p != media && !reported.contains(p) && p.is_file())
        .collect()
}

/// Renames a finished file to its sanitized, collision-free name. The
/// original path is kept if the file is gone or the rename fails.
fn finalize_output(path: &Path) -> PathBuf {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return path.to_path_buf();
    };
    let clean = sanitize_filename(&stem);
    if clean == stem || !path.is_file() {
        return path.to_path_buf();
    }
    rename_to_stem(path, &clean)
}

/// Moves `path` to `stem` plus its own extension, avoiding collisions.
fn rename_to_stem(path: &Path, stem: &str) -> PathBuf {
    let current = path.file_stem().map(|s| s.to_string_lossy());
    if stem.is_empty() || current.as_deref() == Some(stem) {
        return path.to_path_buf();
    }

    let name = match path.extension() {
        Some(ext) => format!("{}.{}", stem, ext.to_string_lossy()),
        None => stem.to_string(),
    };
    let target = unique_path(&path.with_file_name(name));
    match std::fs::rename(path, &target) {
        Ok(()) => {
            log::debug!("renamed {} -> {}", path.display(), target.display());
            target
        }
        Err(e) => {
            log::warn!("could not rename {}: {}", path.display(), e);
            path.to_path_buf()
        }
    }
}

/// Worker side of the event channel. Enforces event order and raises
/// [`Cancelled`] once the flag is set.
struct EventSink {
    tx: UnboundedSender<ProgressEvent>,
    cancel: Arc<AtomicBool>,
    /// InfoResolved already went out
    info_sent: bool,
    /// A Downloading or Stage event already went out
    progress_seen: bool,
}

impl EventSink {
    fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ProgressEvent) -> Result<(), Cancelled> {
        // Nobody is listening any more; stop the work.
        self.tx.send(event).map_err(|_| Cancelled)
    }

    fn finish(self, terminal: ProgressEvent) {
        let _ = self.tx.send(terminal);
    }
}

impl ProgressHook for EventSink {
    fn report(&mut self, update: SourceUpdate) -> Result<(), Cancelled> {
        if self.is_cancel_requested() {
            return Err(Cancelled);
        }

        match update {
            SourceUpdate::Info {
                title,
                playlist_title,
                item_count,
                thumbnail_url,
                approx_size,
            } => {
                if self.info_sent || self.progress_seen {
                    log::debug!("next item: {title}");
                    return Ok(());
                }
                self.info_sent = true;
                self.emit(ProgressEvent::InfoResolved {
                    title: playlist_title.unwrap_or(title),
                    item_count,
                    thumbnail_url,
                    approx_size,
                })
            }
            SourceUpdate::Progress {
                title,
                percent,
                speed,
                eta,
            } => {
                self.progress_seen = true;
                self.emit(ProgressEvent::Downloading {
                    title,
                    percent,
                    speed,
                    eta,
                })
            }
            SourceUpdate::PostProcess { name } => {
                self.progress_seen = true;
                self.emit(ProgressEvent::Stage { name })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> (EventSink, UnboundedReceiver<ProgressEvent>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let sink = EventSink {
            tx,
            cancel: Arc::clone(&cancel),
            info_sent: false,
            progress_seen: false,
        };
        (sink, rx, cancel)
    }

    fn info(title: &str) -> SourceUpdate {
        SourceUpdate::Info {
            title: title.into(),
            playlist_title: None,
            item_count: None,
            thumbnail_url: None,
            approx_size: None,
        }
    }

    fn progress(p: f32) -> SourceUpdate {
        SourceUpdate::Progress {
            title: None,
            percent: Some(p),
            speed: None,
            eta: None,
        }
    }

    #[test]
    fn only_first_info_is_forwarded() {
        let (mut sink, mut rx, _) = sink();
        sink.report(info("one")).unwrap();
        sink.report(progress(0.5)).unwrap();
        sink.report(info("two")).unwrap();
        drop(sink);

        let mut infos = 0;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, ProgressEvent::InfoResolved { .. }) {
                infos += 1;
            }
        }
        assert_eq!(infos, 1);
    }

    #[test]
    fn info_after_progress_is_dropped() {
        let (mut sink, mut rx, _) = sink();
        sink.report(progress(0.1)).unwrap();
        sink.report(info("late")).unwrap();
        assert!(matches!(rx.try_recv(), Ok(ProgressEvent::Downloading { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn playlist_title_wins() {
        let (mut sink, mut rx, _) = sink();
        sink.report(SourceUpdate::Info {
            title: "Track 1".into(),
            playlist_title: Some("Mix".into()),
            item_count: Some(3),
            thumbnail_url: None,
            approx_size: Some(1024),
        })
        .unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            ProgressEvent::InfoResolved {
                title: "Mix".into(),
                item_count: Some(3),
                thumbnail_url: None,
                approx_size: Some(1024),
            }
        );
    }

    #[test]
    fn cancelled_flag_stops_reports() {
        let (mut sink, mut rx, cancel) = sink();
        cancel.store(true, Ordering::SeqCst);
        assert_eq!(sink.report(progress(0.2)), Err(Cancelled));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_counts_as_cancel() {
        let (mut sink, rx, _) = sink();
        drop(rx);
        assert_eq!(sink.report(progress(0.2)), Err(Cancelled));
    }

    #[test]
    fn finalize_renames_to_sanitized_name() {
        let dir = tempfile::tempdir().unwrap();
        let messy = dir.path().join("a   b .mp3");
        std::fs::write(&messy, b"x").unwrap();
        std::fs::write(dir.path().join("a b.mp3"), b"taken").unwrap();

        let out = finalize_output(&messy);
        assert_eq!(out, dir.path().join("a b (1).mp3"));
        assert!(out.is_file());
        assert!(!messy.exists());
    }

    #[test]
    fn finalize_leaves_clean_or_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let clean = dir.path().join("song.mp3");
        std::fs::write(&clean, b"x").unwrap();
        assert_eq!(finalize_output(&clean), clean);

        let gone = dir.path().join("gone   file.mp3");
        assert_eq!(finalize_output(&gone), gone);
    }

    #[test]
    fn thumbnail_follows_its_media_file() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("a   b .mp3");
        std::fs::write(&media, b"x").unwrap();
        std::fs::write(dir.path().join("a   b .jpg"), b"img").unwrap();
        std::fs::write(dir.path().join("a b.mp3"), b"taken").unwrap();

        let outputs = finalize_outputs(&[media.clone()], true);
        assert_eq!(
            outputs,
            vec![dir.path().join("a b (1).mp3"), dir.path().join("a b (1).jpg")]
        );
        assert!(outputs.iter().all(|p| p.is_file()));
    }

    #[test]
    fn unrelated_images_stay_put_without_thumbnail_step() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("clip.mp4");
        let cover = dir.path().join("clip.jpg");
        std::fs::write(&media, b"x").unwrap();
        std::fs::write(&cover, b"img").unwrap();

        assert_eq!(finalize_outputs(&[media.clone()], false), vec![media]);
        assert!(cover.is_file());
    }

    #[test]
    fn panic_messages_are_readable() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "media source crashed: boom");
    }
}
