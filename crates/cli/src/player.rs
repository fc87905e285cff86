// FILE: crates/cli/src/player.rs
//! Interactive playback over the simulated backend
//!
//! Commands are read line by line from stdin, so the player can be driven by
//! hand or by a script piped into it.

use crate::commands::{connect_db, format_length, load_catalog, session_settings};
use anyhow::{Context, Result};
use chaptercast_config::Config;
use chaptercast_core::{BookmarkId, ChapterId, PlaybackState};
use chaptercast_database::{close, SqliteBookmarkRepository};
use clap::ArgMatches;
use console::style;
use playback_engine::{
    BookmarkStore, ChapterCatalog, EngineResult, PlaybackSession, RemoveOutcome, SessionDriver,
    SessionHandle, SimulatedBackend, StateStream,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Length given to chapters whose manifest entry has none
const UNKNOWN_CHAPTER_LENGTH: f64 = 600.0;

const OPEN_LATENCY: Duration = Duration::from_millis(50);

const HELP: &str = "commands: play | pause | seek N | next | prev | goto ID | vol N | mute | unmute \
                    | rate R | mark | marks | unmark ID | resume ID | status | help | quit";

/// One line of player input
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Seek(f64),
    Next,
    Previous,
    Goto(ChapterId),
    Volume(u8),
    Mute,
    Unmute,
    Rate(f32),
    Mark,
    Marks,
    Unmark(BookmarkId),
    Resume(BookmarkId),
    Status,
    Help,
    Quit,
}

/// Parses one input line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<PlayerCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let argument = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments for '{}'", verb));
    }

    fn value<'a>(verb: &str, argument: Option<&'a str>) -> Result<&'a str, String> {
        argument.ok_or_else(|| format!("'{}' needs an argument", verb))
    }

    fn bookmark_id(verb: &str, argument: Option<&str>) -> Result<BookmarkId, String> {
        let raw = value(verb, argument)?;
        BookmarkId::from_string(raw).map_err(|_| format!("'{}' is not a bookmark id", raw))
    }

    let command = match verb.to_ascii_lowercase().as_str() {
        "play" | "p" => PlayerCommand::Play,
        "pause" => PlayerCommand::Pause,
        "seek" | "s" => {
            let raw = value(verb, argument)?;
            let seconds = raw
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not a number of seconds", raw))?;
            PlayerCommand::Seek(seconds)
        }
        "next" | "n" => PlayerCommand::Next,
        "prev" | "previous" => PlayerCommand::Previous,
        "goto" => PlayerCommand::Goto(ChapterId::from(value(verb, argument)?)),
        "vol" | "volume" => {
            let raw = value(verb, argument)?;
            let volume = raw
                .parse::<u8>()
                .map_err(|_| format!("'{}' is not a volume", raw))?;
            PlayerCommand::Volume(volume)
        }
        "mute" => PlayerCommand::Mute,
        "unmute" => PlayerCommand::Unmute,
        "rate" => {
            let raw = value(verb, argument)?;
            let rate = raw
                .parse::<f32>()
                .map_err(|_| format!("'{}' is not a rate", raw))?;
            PlayerCommand::Rate(rate)
        }
        "mark" | "m" => PlayerCommand::Mark,
        "marks" => PlayerCommand::Marks,
        "unmark" => PlayerCommand::Unmark(bookmark_id(verb, argument)?),
        "resume" => PlayerCommand::Resume(bookmark_id(verb, argument)?),
        "status" => PlayerCommand::Status,
        "help" | "?" => PlayerCommand::Help,
        "quit" | "q" | "exit" => PlayerCommand::Quit,
        other => return Err(format!("unknown command '{}'", other)),
    };

    let takes_argument = matches!(
        command,
        PlayerCommand::Seek(_)
            | PlayerCommand::Goto(_)
            | PlayerCommand::Volume(_)
            | PlayerCommand::Rate(_)
            | PlayerCommand::Unmark(_)
            | PlayerCommand::Resume(_)
    );
    if !takes_argument && argument.is_some() {
        return Err(format!("'{}' takes no argument", verb));
    }

    Ok(Some(command))
}

/// One status line, e.g. `[2/5] The Storm  playing  0:01:05 / 0:10:00`
pub fn describe(state: &PlaybackState, catalog: &ChapterCatalog) -> String {
    let Some(chapter_id) = &state.chapter_id else {
        return state.phase.to_string();
    };
    let title = catalog
        .get(chapter_id)
        .map(|chapter| chapter.title.as_str())
        .unwrap_or_else(|| chapter_id.as_str());

    let mut line = format!(
        "[{}] {}  {}  {} / {}",
        catalog.chapter_progress(chapter_id),
        title,
        state.phase,
        format_length(Some(state.position_seconds)),
        format_length(state.duration_seconds)
    );
    if state.muted {
        line.push_str("  (muted)");
    }
    line
}

fn simulated_backend(catalog: &ChapterCatalog) -> SimulatedBackend {
    catalog
        .chapters()
        .iter()
        .filter_map(|chapter| chapter.duration.map(|d| (chapter.source.clone(), d)))
        .fold(SimulatedBackend::new(), |backend, (source, seconds)| {
            backend.with_duration(source, seconds)
        })
        .with_default_duration(UNKNOWN_CHAPTER_LENGTH)
        .with_open_latency(OPEN_LATENCY)
}

/// Prints a line whenever the phase or chapter changes
async fn print_transitions(mut states: StateStream, catalog: Arc<ChapterCatalog>) {
    let mut last: Option<(&'static str, Option<ChapterId>)> = None;
    while let Some(state) = states.recv().await {
        let key = (state.phase.name(), state.chapter_id.clone());
        if last.as_ref() == Some(&key) {
            continue;
        }
        last = Some(key);

        if state.failure().is_some() {
            println!("{} {}", style("✗").red().bold(), describe(&state, &catalog));
        } else {
            println!("{} {}", style("»").cyan(), describe(&state, &catalog));
        }
    }
}

/// Runs the `play` subcommand
pub async fn run(config: &Config, db_path: &Path, matches: &ArgMatches) -> Result<()> {
    let manifest = matches
        .get_one::<String>("manifest")
        .ok_or_else(|| anyhow::anyhow!("Manifest path is required"))?;
    let catalog = Arc::new(load_catalog(manifest)?);

    let start = match matches.get_one::<String>("chapter") {
        Some(id) => ChapterId::from(id.as_str()),
        None => catalog
            .first()
            .map(|chapter| chapter.id.clone())
            .context("Manifest has no chapters")?,
    };

    let pool = connect_db(db_path).await?;
    let store = BookmarkStore::new(
        catalog.audiobook_id().clone(),
        SqliteBookmarkRepository::new(pool.clone()),
    );
    let (session, events) = PlaybackSession::new(
        Arc::clone(&catalog),
        simulated_backend(&catalog),
        session_settings(&config.player),
    )
    .context("Invalid player settings")?;
    let handle = SessionDriver::spawn(session, events, store);

    let states = handle.subscribe().await?;
    let printer = tokio::spawn(print_transitions(states, Arc::clone(&catalog)));

    println!("{} ({} chapters)", style(catalog.title()).bold(), catalog.len());
    println!("{}", style(HELP).dim());

    let loaded = match matches.get_one::<f64>("at") {
        Some(offset) => handle.load_at(start, *offset).await,
        None => handle.load(start).await,
    };
    if let Err(e) = loaded {
        println!("{} {}", style("!").yellow().bold(), e);
    }

    let result = read_commands(&handle, &catalog).await;

    handle.shutdown().await?;
    // The stream ends once the session is gone
    let _ = printer.await;
    close(pool).await;

    result
}

async fn read_commands(handle: &SessionHandle, catalog: &ChapterCatalog) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(PlayerCommand::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(e) = execute(handle, catalog, command).await {
                    println!("{} {}", style("!").yellow().bold(), e);
                }
            }
            Err(message) => println!("{} {}", style("?").yellow(), message),
        }
    }

    Ok(())
}

async fn execute(
    handle: &SessionHandle,
    catalog: &ChapterCatalog,
    command: PlayerCommand,
) -> EngineResult<()> {
    match command {
        PlayerCommand::Play => handle.play().await?,
        PlayerCommand::Pause => handle.pause().await?,
        PlayerCommand::Seek(seconds) => match handle.seek(seconds).await? {
            Some(position) => println!("at {}", format_length(Some(position))),
            None => println!("nothing loaded"),
        },
        PlayerCommand::Next => {
            if !handle.skip_to_next().await? {
                println!("already at the last chapter");
            }
        }
        PlayerCommand::Previous => {
            if !handle.skip_to_previous().await? {
                println!("already at the first chapter");
            }
        }
        PlayerCommand::Goto(chapter_id) => handle.load(chapter_id).await?,
        PlayerCommand::Volume(volume) => handle.set_volume(volume).await?,
        PlayerCommand::Mute => handle.set_muted(true).await?,
        PlayerCommand::Unmute => handle.set_muted(false).await?,
        PlayerCommand::Rate(rate) => handle.set_rate(rate).await?,
        PlayerCommand::Mark => {
            let bookmark = handle.bookmark_current_position().await?;
            println!(
                "{} {}  {}",
                style("✓").green().bold(),
                bookmark.display_string(),
                style(bookmark.id).dim()
            );
        }
        PlayerCommand::Marks => {
            let bookmarks = handle.bookmarks().await?;
            if bookmarks.is_empty() {
                println!("no bookmarks");
            }
            for bookmark in bookmarks {
                println!("{}  {}", bookmark.id, bookmark.display_string());
            }
        }
        PlayerCommand::Unmark(id) => match handle.remove_bookmark(id).await? {
            RemoveOutcome::Removed => println!("removed"),
            RemoveOutcome::NotFound => println!("no such bookmark"),
        },
        PlayerCommand::Resume(id) => handle.resume_bookmark(id).await?,
        PlayerCommand::Status => {
            let state = handle.state().await?;
            println!(
                "{}  vol {}  {}",
                describe(&state, catalog),
                state.volume,
                state.rate
            );
        }
        PlayerCommand::Help => println!("{}", HELP),
        PlayerCommand::Quit => {}
    }
    Ok(())
}
