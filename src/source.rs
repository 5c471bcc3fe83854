//! The seam between the job runner and the media extractor.
//!
//! The extractor is opaque: the runner hands it a [`FetchRequest`] and a
//! [`ProgressHook`], and it calls the hook from whatever thread it runs on.
//! A hook may refuse to continue by returning [`Cancelled`]; the source must
//! stop at that point and return [`SourceError::Cancelled`].

use crate::error::{Cancelled, ConfigurationError, SourceError};
use crate::model::PostStep;
use std::path::PathBuf;

/// Everything the extractor needs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub source: String,
    pub destination_dir: PathBuf,
    /// Output name template relative to `destination_dir`.
    pub output_template: String,
    pub selector: String,
    pub no_playlist: bool,
    pub post_steps: Vec<PostStep>,
    pub transcoder: Option<PathBuf>,
}

/// A raw callback from the extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceUpdate {
    /// Metadata of the next item, sent before it downloads
    Info {
        title: String,
        /// Set when the item belongs to a playlist
        playlist_title: Option<String>,
        item_count: Option<u32>,
        thumbnail_url: Option<String>,
        /// Exact or approximate size of the chosen format, in bytes
        approx_size: Option<u64>,
    },
    /// Download progress of the current item
    Progress {
        title: Option<String>,
        percent: Option<f32>,
        speed: Option<String>,
        eta: Option<String>,
    },
    /// A post-processor started
    PostProcess {
        name: String,
    },
}

/// Result of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Final files as reported by the extractor once it is done with them.
    pub outputs: Vec<PathBuf>,
}

pub trait ProgressHook {
    fn report(&mut self, update: SourceUpdate) -> Result<(), Cancelled>;
}

pub trait MediaSource: Send + Sync {
    fn name(&self) -> &str;

    /// Checked before a job is scheduled.
    fn preflight(&self) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Runs the whole retrieval, blocking the calling thread.
    fn fetch(
        &self,
        request: &FetchRequest,
        hook: &mut dyn ProgressHook,
    ) -> Result<FetchOutcome, SourceError>;
}
