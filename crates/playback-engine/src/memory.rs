// FILE: crates/playback-engine/src/memory.rs
//! In-memory bookmark persistence

use chaptercast_core::{
    AppError, AudiobookId, Bookmark, BookmarkId, BookmarkRepository, ChapterId, Result,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Bookmark repository over a shared vector
///
/// Clones share the same storage. Used by the CLI when no database is
/// configured and by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookmarkRepository {
    bookmarks: Arc<Mutex<Vec<Bookmark>>>,
}

impl InMemoryBookmarkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bookmarks across all audiobooks
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the vector half-written.
    fn lock(&self) -> MutexGuard<'_, Vec<Bookmark>> {
        self.bookmarks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BookmarkRepository for InMemoryBookmarkRepository {
    async fn create_bookmark(
        &self,
        audiobook_id: &AudiobookId,
        chapter_id: &ChapterId,
        offset_seconds: f64,
    ) -> Result<Bookmark> {
        if !offset_seconds.is_finite() || offset_seconds < 0.0 {
            return Err(AppError::InvalidArgument {
                argument: "offset_seconds".to_string(),
                reason: format!("{} is not a valid offset", offset_seconds),
            });
        }
        let bookmark = Bookmark::new(audiobook_id.clone(), chapter_id.clone(), offset_seconds);
        self.lock().push(bookmark.clone());
        Ok(bookmark)
    }

    async fn list_bookmarks(&self, audiobook_id: &AudiobookId) -> Result<Vec<Bookmark>> {
        let mut found: Vec<Bookmark> = self
            .lock()
            .iter()
            .rev()
            .filter(|bookmark| &bookmark.audiobook_id == audiobook_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn delete_bookmark(&self, id: BookmarkId) -> Result<()> {
        let mut bookmarks = self.lock();
        let before = bookmarks.len();
        bookmarks.retain(|bookmark| bookmark.id != id);
        if bookmarks.len() == before {
            return Err(AppError::not_found("Bookmark", id));
        }
        Ok(())
    }
}
