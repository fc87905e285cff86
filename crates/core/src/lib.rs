//! Chaptercast core domain
//!
//! Shared types for the audiobook playback engine, its persistence layer and
//! its front ends.

pub mod error;
pub mod repository;
pub mod types;

pub use error::{AppError, ErrorSeverity, RecoveryAction, Result};
pub use repository::BookmarkRepository;
pub use types::{
    format_seconds, Audiobook, AudiobookId, Bookmark, BookmarkId, Chapter, ChapterId,
    FailureKind, PlaybackFailure, PlaybackPhase, PlaybackRate, PlaybackState, SourceRef,
    Timestamp, Validator, VOLUME_RANGE,
};
