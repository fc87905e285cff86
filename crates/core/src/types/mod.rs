//! Domain types for Chaptercast
//!
//! - `audiobook`: Audiobook, Chapter and their identifiers
//! - `playback`: Published playback state, phases and rates
//! - `bookmark`: User bookmarks
//! - `common`: Shared traits and utilities

mod audiobook;
mod bookmark;
mod common;
mod playback;

pub use audiobook::{Audiobook, AudiobookId, Chapter, ChapterId, SourceRef};
pub use bookmark::{Bookmark, BookmarkId};
pub use common::{format_seconds, Timestamp, Validator};
pub use playback::{
    FailureKind, PlaybackFailure, PlaybackPhase, PlaybackRate, PlaybackState, VOLUME_RANGE,
};
