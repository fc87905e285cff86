//! SQLite implementation of the bookmark persistence seam

use crate::queries::bookmarks;
use crate::DbPool;
use chaptercast_core::{
    AppError, AudiobookId, Bookmark, BookmarkId, BookmarkRepository, ChapterId, Result,
};

/// Bookmark repository backed by a SQLite pool
///
/// Cloning is cheap; clones share the pool.
#[derive(Debug, Clone)]
pub struct SqliteBookmarkRepository {
    pool: DbPool,
}

impl SqliteBookmarkRepository {
    /// Wraps a pool whose migrations have already run
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl BookmarkRepository for SqliteBookmarkRepository {
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
        // Return exactly what a later read will see.
        let stored_offset = (offset_seconds * 1000.0).round() / 1000.0;
        let bookmark = Bookmark::new(audiobook_id.clone(), chapter_id.clone(), stored_offset);

        bookmarks::insert_bookmark(&self.pool, &bookmark).await?;
        log::debug!("Stored bookmark {} for {}", bookmark.id, audiobook_id);
        Ok(bookmark)
    }

    async fn list_bookmarks(&self, audiobook_id: &AudiobookId) -> Result<Vec<Bookmark>> {
        bookmarks::list_bookmarks(&self.pool, audiobook_id).await
    }

    async fn delete_bookmark(&self, id: BookmarkId) -> Result<()> {
        bookmarks::delete_bookmark(&self.pool, id).await
    }
}
