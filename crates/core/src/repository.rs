//! Persistence seam for bookmarks
//!
//! The playback engine never talks to storage directly; it goes through a
//! `BookmarkRepository`. Implementations exist for SQLite and for memory.

use crate::{AudiobookId, Bookmark, BookmarkId, ChapterId, Result};
use std::future::Future;

/// Storage backend for bookmarks
pub trait BookmarkRepository: Send + Sync {
    /// Persists a new bookmark and returns it as stored
    fn create_bookmark(
        &self,
        audiobook_id: &AudiobookId,
        chapter_id: &ChapterId,
        offset_seconds: f64,
    ) -> impl Future<Output = Result<Bookmark>> + Send;

    /// Lists the bookmarks of an audiobook, newest first
    fn list_bookmarks(
        &self,
        audiobook_id: &AudiobookId,
    ) -> impl Future<Output = Result<Vec<Bookmark>>> + Send;

    /// Deletes a bookmark
    ///
    /// Returns `AppError::RecordNotFound` when no such bookmark exists.
    fn delete_bookmark(&self, id: BookmarkId) -> impl Future<Output = Result<()>> + Send;
}
