use crate::error::{ConfigurationError, SourceError};
use crate::model::PostStep;
use crate::progress::{self, ParsedLine};
use crate::source::{FetchOutcome, FetchRequest, MediaSource, ProgressHook};
use crate::tools::EXTRACTOR;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;

/// Windows: don't flash a console window for the child process.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// [`MediaSource`] backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }

    /// Command line for one request, without the program itself.
    pub fn build_args(request: &FetchRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--newline".into(),
            "--progress".into(),
            "--no-simulate".into(),
            "--progress-template".into(),
            progress::download_template(),
            "--progress-template".into(),
            progress::postprocess_template(),
            "--print".into(),
            progress::info_template(),
            "--print".into(),
            progress::final_path_template(),
            "-f".into(),
            request.selector.clone(),
            "-o".into(),
            request
                .destination_dir
                .join(&request.output_template)
                .to_string_lossy()
                .into_owned(),
        ];

        args.push(if request.no_playlist {
            "--no-playlist".into()
        } else {
            "--yes-playlist".into()
        });

        for step in &request.post_steps {
            args.extend(step_args(step));
        }

        if let Some(ffmpeg) = &request.transcoder {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }

        // Keep a source starting with '-' from being read as an option.
        args.push("--".into());
        args.push(request.source.clone());
        args
    }
}

/// Extractor flags for one post-processing step.
fn step_args(step: &PostStep) -> Vec<String> {
    match step {
        PostStep::ExtractAudio {
            codec,
            bitrate_kbps,
        } => {
            let mut args = vec![
                "-x".to_string(),
                "--audio-format".to_string(),
                codec.as_str().to_string(),
            ];
            if !codec.is_lossless() {
                args.push("--audio-quality".to_string());
                args.push(format!("{bitrate_kbps}K"));
            }
            args
        }
        PostStep::MergeStreams { container } => {
            vec!["--merge-output-format".to_string(), container.to_string()]
        }
        PostStep::EmbedMetadata => vec!["--embed-metadata".to_string()],
        PostStep::SaveThumbnail => vec![
            "--write-thumbnail".to_string(),
            "--convert-thumbnails".to_string(),
            "jpg".to_string(),
        ],
    }
}

impl MediaSource for YtDlp {
    fn name(&self) -> &str {
        EXTRACTOR
    }

    fn preflight(&self) -> Result<(), ConfigurationError> {
        match &self.program {
            None => Err(ConfigurationError::ToolMissing {
                tool: EXTRACTOR.to_string(),
            }),
            Some(p) if !p.is_file() => Err(ConfigurationError::SourceUnavailable(format!(
                "{} no longer exists",
                p.display()
            ))),
            Some(_) => Ok(()),
        }
    }

    fn fetch(
        &self,
        request: &FetchRequest,
        hook: &mut dyn ProgressHook,
    ) -> Result<FetchOutcome, SourceError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| SourceError::Failed(format!("{EXTRACTOR} is not installed")))?;

        let args = Self::build_args(request);
        log::debug!("{} {}", program.display(), args.join(" "));

        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = command
            .spawn()
            .map_err(|e| SourceError::Failed(format!("failed to start {EXTRACTOR}: {e}")))?;

        // yt-dlp writes progress to stderr when --print is used, so both
        // streams feed one line queue.
        let (line_tx, line_rx) = mpsc::channel::<String>();
        if let Some(out) = child.stdout.take() {
            forward_lines(out, line_tx.clone());
        }
        if let Some(err) = child.stderr.take() {
            forward_lines(err, line_tx.clone());
        }
        drop(line_tx);

        let mut outputs = Vec::new();
        let mut last_error: Option<String> = None;

        for line in line_rx {
            log::debug!("{EXTRACTOR}> {line}");
            match progress::parse_line(&line) {
                ParsedLine::Update(update) => {
                    if let Err(cancelled) = hook.report(update) {
                        stop(&mut child);
                        return Err(cancelled.into());
                    }
                }
                ParsedLine::Output(path) => {
                    if !outputs.contains(&path) {
                        outputs.push(path);
                    }
                }
                ParsedLine::Error(msg) => last_error = Some(msg),
                ParsedLine::Other => {}
            }
        }

        let status = child.wait()?;
        if status.success() {
            Ok(FetchOutcome { outputs })
        } else {
            Err(SourceError::Failed(last_error.unwrap_or_else(|| {
                format!("{EXTRACTOR} exited with {status}")
            })))
        }
    }
}

/// Reads `stream` line by line on its own thread until it closes.
fn forward_lines<R: Read + Send + 'static>(stream: R, tx: Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

fn stop(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("could not stop {EXTRACTOR}: {e}");
    }
    let _ = child.wait();
}
