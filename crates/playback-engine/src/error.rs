// FILE: crates/playback-engine/src/error.rs

use chaptercast_core::{AppError, BookmarkId, ChapterId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The platform refused to start audio without a direct user gesture
    #[error("Playback blocked: {0}")]
    PlaybackBlocked(String),

    /// An open resource refused to play
    #[error("Resource failed: {0}")]
    ResourceFailed(String),

    #[error("Invalid {parameter}: {value} ({reason})")]
    InvalidParameter {
        parameter: &'static str,
        value: String,
        reason: String,
    },

    #[error("Bookmark not found: {0}")]
    NotFound(BookmarkId),

    #[error("Unknown chapter: {0}")]
    UnknownChapter(ChapterId),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Nothing to bookmark: {0}")]
    NothingToBookmark(String),

    #[error("Bookmark storage error: {0}")]
    Storage(#[from] AppError),

    #[error("Playback session has shut down")]
    SessionClosed,

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn invalid_parameter(
        parameter: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true if the caller can recover by retrying from a user action
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::PlaybackBlocked(_)
            | Self::InvalidParameter { .. }
            | Self::NotFound(_)
            | Self::UnknownChapter(_)
            | Self::NothingToBookmark(_) => true,
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
