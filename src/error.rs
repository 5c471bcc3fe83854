use std::path::PathBuf;
use thiserror::Error;

/// A precondition of a job that was not met. Reported before any background
/// work is scheduled and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no media URL was given")]
    EmptySource,

    #[error("destination folder does not exist: {}", .0.display())]
    DestinationMissing(PathBuf),

    #[error("destination is not a folder: {}", .0.display())]
    DestinationNotDirectory(PathBuf),

    #[error("required external tool is missing: {tool}")]
    ToolMissing { tool: String },

    #[error("media source is unavailable: {0}")]
    SourceUnavailable(String),
}

/// Terminal failure of one job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("{0}")]
    Operation(String),

    #[error("cancelled by user")]
    Cancelled,
}

impl JobError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, JobError::Configuration(_))
    }
}

/// Raised out of a progress hook when the user asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled by user")]
pub struct Cancelled;

/// Error surfaced by a media source while a job is running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("cancelled by user")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

impl From<Cancelled> for SourceError {
    fn from(_: Cancelled) -> Self {
        SourceError::Cancelled
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Failed(e.to_string())
    }
}

impl From<SourceError> for JobError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Cancelled => JobError::Cancelled,
            SourceError::Failed(msg) => JobError::Operation(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_keeps_its_own_kind() {
        let err: JobError = SourceError::from(Cancelled).into();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "cancelled by user");
    }

    #[test]
    fn source_failure_becomes_operation_error() {
        let err: JobError = SourceError::Failed("HTTP Error 403".into()).into();
        assert_eq!(err, JobError::Operation("HTTP Error 403".into()));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn configuration_message_names_the_tool() {
        let err = JobError::from(ConfigurationError::ToolMissing {
            tool: "ffmpeg".into(),
        });
        assert!(err.is_configuration());
        assert!(err.to_string().contains("ffmpeg"));
    }
}
