//! Chaptercast Database Layer
//!
//! SQLite persistence for bookmarks, built on sqlx. Open a pool with
//! [`connect`], run [`run_migrations`], then hand a
//! [`SqliteBookmarkRepository`] to the playback engine.

pub mod connection;
pub mod migrations;
pub mod queries;
pub mod repository;

pub use connection::{close, connect, connect_in_memory, DatabaseConfig, DbPool};
pub use migrations::{current_version, run_migrations, verify_integrity, LATEST_VERSION};
pub use repository::SqliteBookmarkRepository;

/// Connects to the database file and brings its schema up to date
pub async fn open(config: DatabaseConfig) -> Result<DbPool, chaptercast_core::AppError> {
    let pool = connect(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
