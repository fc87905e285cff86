// FILE: crates/cli/src/commands.rs

use anyhow::{bail, Context, Result};
use chaptercast_config::{Config, ConfigManager, PlayerConfig};
use chaptercast_core::{format_seconds, AudiobookId, BookmarkId, BookmarkRepository};
use chaptercast_database::{open, DatabaseConfig, DbPool, SqliteBookmarkRepository};
use clap::ArgMatches;
use console::style;
use playback_engine::{ChapterCatalog, SessionSettings};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database file to use: the `--database` flag, else the configured path
pub fn database_path(
    manager: &ConfigManager,
    config: &Config,
    flag: Option<&String>,
) -> PathBuf {
    match flag {
        Some(path) => PathBuf::from(path),
        None => manager.resolve(&config.storage.database_path),
    }
}

/// Engine settings for a new session
pub fn session_settings(player: &PlayerConfig) -> SessionSettings {
    SessionSettings {
        volume: player.default_volume,
        muted: player.start_muted,
        rate: player.default_rate,
        allowed_rates: player.allowed_rates.clone(),
        sample_interval: Duration::from_millis(player.progress_interval_ms),
    }
}

pub async fn connect_db(db_path: &Path) -> Result<DbPool> {
    let config = DatabaseConfig::new(db_path.to_string_lossy());
    open(config)
        .await
        .with_context(|| format!("Failed to open bookmark database at {}", db_path.display()))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a String> {
    matches
        .get_one::<String>(name)
        .ok_or_else(|| anyhow::anyhow!("Argument <{}> is required", name))
}

pub fn load_catalog(path: &str) -> Result<ChapterCatalog> {
    ChapterCatalog::from_path(path).with_context(|| format!("Failed to load manifest {}", path))
}

/// Duration column text; unknown lengths are spelled out
pub fn format_length(seconds: Option<f64>) -> String {
    match seconds {
        Some(seconds) => format_seconds(seconds),
        None => "unknown".to_string(),
    }
}

/// Print the chapters of a manifest
pub fn show_catalog(matches: &ArgMatches) -> Result<()> {
    let catalog = load_catalog(required(matches, "manifest")?)?;

    if matches.get_flag("json") {
        println!(
            "{}",
            serde_json::to_string_pretty(catalog.chapters()).context("Failed to encode catalog")?
        );
        return Ok(());
    }

    println!("\n{}", style(catalog.title()).bold().cyan());
    if let Some(narrator) = catalog.narrator() {
        println!("Narrated by {}", narrator);
    }
    println!("{}", "=".repeat(60));

    for chapter in catalog.chapters() {
        println!(
            "{:>6}  {:<36} {:>10}  {}",
            catalog.chapter_progress(&chapter.id),
            chapter.title,
            format_length(chapter.duration),
            style(&chapter.id).dim()
        );
    }

    println!("{}", "=".repeat(60));
    println!(
        "{} chapter(s), total {}",
        catalog.len(),
        format_length(catalog.total_duration())
    );

    Ok(())
}

/// List stored bookmarks of one audiobook
pub async fn list_bookmarks(db_path: &Path, matches: &ArgMatches) -> Result<()> {
    let audiobook_id = AudiobookId::from(required(matches, "audiobook")?.as_str());

    let pool = connect_db(db_path).await?;
    let repository = SqliteBookmarkRepository::new(pool);
    let bookmarks = repository
        .list_bookmarks(&audiobook_id)
        .await
        .context("Failed to list bookmarks")?;

    if matches.get_flag("json") {
        println!(
            "{}",
            serde_json::to_string_pretty(&bookmarks).context("Failed to encode bookmarks")?
        );
        return Ok(());
    }

    if bookmarks.is_empty() {
        println!("No bookmarks for {}.", audiobook_id);
        return Ok(());
    }

    println!(
        "\n{} Bookmarks for {}",
        style(bookmarks.len()).bold().cyan(),
        audiobook_id
    );
    println!("{}", "=".repeat(60));
    for bookmark in &bookmarks {
        println!("{}  {}", bookmark.id, bookmark.display_string());
    }

    Ok(())
}

/// Delete one stored bookmark
pub async fn remove_bookmark(db_path: &Path, matches: &ArgMatches) -> Result<()> {
    let id_str = required(matches, "id")?;
    let id = BookmarkId::from_string(id_str).context("Invalid bookmark ID format")?;

    let pool = connect_db(db_path).await?;
    let repository = SqliteBookmarkRepository::new(pool);

    match repository.delete_bookmark(id).await {
        Ok(()) => {
            println!("{} Bookmark removed", style("✓").green().bold());
            Ok(())
        }
        Err(e) if e.is_not_found() => bail!("No bookmark with id {}", id),
        Err(e) => Err(e).context("Failed to delete bookmark"),
    }
}

pub fn config_command(manager: &ConfigManager, config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("init", _)) => {
            if manager.initialize().context("Failed to write config")? {
                println!(
                    "{} Created {}",
                    style("✓").green().bold(),
                    manager.config_path().display()
                );
            } else {
                println!("Config already exists at {}", manager.config_path().display());
            }
            Ok(())
        }
        Some(("show", _)) => {
            print!(
                "{}",
                toml::to_string_pretty(config).context("Failed to encode config")?
            );
            Ok(())
        }
        Some(("path", _)) => {
            println!("{}", manager.config_path().display());
            Ok(())
        }
        _ => bail!("Unknown config action"),
    }
}
