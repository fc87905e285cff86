//! Bookmark database operations

use crate::DbPool;
use chaptercast_core::{AppError, AudiobookId, Bookmark, BookmarkId, ChapterId, Timestamp};

const SELECT_COLUMNS: &str = "SELECT id, audiobook_id, chapter_id, offset_ms, created_at FROM bookmarks";

/// Offsets are stored as whole milliseconds
fn to_millis(offset_seconds: f64) -> Result<i64, AppError> {
    if !offset_seconds.is_finite() || offset_seconds < 0.0 {
        return Err(AppError::InvalidArgument {
            argument: "offset_seconds".to_string(),
            reason: format!("{} is not a valid offset", offset_seconds),
        });
    }
    Ok((offset_seconds * 1000.0).round() as i64)
}

/// Inserts a bookmark
///
/// The offset is stored at millisecond precision.
pub async fn insert_bookmark(pool: &DbPool, bookmark: &Bookmark) -> Result<(), AppError> {
    let offset_ms = to_millis(bookmark.offset_seconds)?;

    sqlx::query(
        r#"
        INSERT INTO bookmarks (id, audiobook_id, chapter_id, offset_ms, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(bookmark.id.as_string())
    .bind(bookmark.audiobook_id.as_str())
    .bind(bookmark.chapter_id.as_str())
    .bind(offset_ms)
    .bind(bookmark.created_at.as_millis())
    .execute(pool)
    .await
    .map_err(|e| AppError::database("Failed to create bookmark", e))?;

    Ok(())
}

/// Gets a bookmark by ID
pub async fn get_bookmark(pool: &DbPool, id: BookmarkId) -> Result<Bookmark, AppError> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id.as_string())
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::database("Failed to fetch bookmark", e))?
        .ok_or_else(|| AppError::not_found("Bookmark", id))?;

    row_to_bookmark(row)
}

/// Lists the bookmarks of an audiobook, newest first
///
/// Bookmarks created in the same millisecond come back latest insert first.
pub async fn list_bookmarks(
    pool: &DbPool,
    audiobook_id: &AudiobookId,
) -> Result<Vec<Bookmark>, AppError> {
    let rows = sqlx::query(&format!(
        "{} WHERE audiobook_id = ? ORDER BY created_at DESC, rowid DESC",
        SELECT_COLUMNS
    ))
    .bind(audiobook_id.as_str())
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::database("Failed to list bookmarks", e))?;

    rows.into_iter().map(row_to_bookmark).collect()
}

/// Deletes a bookmark
///
/// Returns `RecordNotFound` if no bookmark had this id.
pub async fn delete_bookmark(pool: &DbPool, id: BookmarkId) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM bookmarks WHERE id = ?")
        .bind(id.as_string())
        .execute(pool)
        .await
        .map_err(|e| AppError::database("Failed to delete bookmark", e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Bookmark", id));
    }

    Ok(())
}

/// Number of bookmarks stored for an audiobook
pub async fn count_bookmarks(pool: &DbPool, audiobook_id: &AudiobookId) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT COUNT(*) FROM bookmarks WHERE audiobook_id = ?")
        .bind(audiobook_id.as_str())
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::database("Failed to count bookmarks", e))
}

pub(crate) fn row_to_bookmark(row: sqlx::sqlite::SqliteRow) -> Result<Bookmark, AppError> {
    use sqlx::Row;

    let id_str: String = row
        .try_get("id")
        .map_err(|e| AppError::database("Missing bookmark ID", e))?;
    let id = BookmarkId::from_string(&id_str)
        .map_err(|e| AppError::database("Invalid bookmark ID", e))?;

    let audiobook_id: String = row
        .try_get("audiobook_id")
        .map_err(|e| AppError::database("Missing audiobook ID", e))?;
    let chapter_id: String = row
        .try_get("chapter_id")
        .map_err(|e| AppError::database("Missing chapter ID", e))?;
    let offset_ms: i64 = row
        .try_get("offset_ms")
        .map_err(|e| AppError::database("Missing offset", e))?;
    let created_at_ms: i64 = row
        .try_get("created_at")
        .map_err(|e| AppError::database("Missing created_at", e))?;

    Ok(Bookmark {
        id,
        audiobook_id: AudiobookId::from(audiobook_id),
        chapter_id: ChapterId::from(chapter_id),
        offset_seconds: offset_ms as f64 / 1000.0,
        created_at: Timestamp::from_millis(created_at_ms),
    })
}
