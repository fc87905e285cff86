// FILE: crates/cli/src/main.rs

use anyhow::{Context, Result};
use chaptercast_config::{Config, ConfigManager};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

mod commands;
mod player;

fn build_cli() -> Command {
    Command::new("chaptercast")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Chapter-aware audiobook playback with bookmarks")
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .value_name("DIR")
                .help("Directory holding config.toml")
                .global(true),
        )
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("PATH")
                .help("Bookmark database file (overrides storage.database_path)")
                .global(true),
        )
        .subcommand(
            Command::new("catalog")
                .about("List the chapters of an audiobook manifest")
                .arg(Arg::new("manifest").required(true).value_name("MANIFEST").help("Path to the JSON manifest"))
                .arg(Arg::new("json").long("json").help("Print the catalog as JSON").action(ArgAction::SetTrue)),
        )
        .subcommand(
            Command::new("play")
                .about("Play an audiobook on the simulated backend, reading commands from stdin")
                .arg(Arg::new("manifest").required(true).value_name("MANIFEST").help("Path to the JSON manifest"))
                .arg(Arg::new("chapter").short('c').long("chapter").value_name("ID").help("Chapter to start with"))
                .arg(
                    Arg::new("at")
                        .long("at")
                        .value_name("SECONDS")
                        .help("Start offset inside the chapter")
                        .value_parser(clap::value_parser!(f64)),
                ),
        )
        .subcommand(
            Command::new("bookmarks")
                .about("List stored bookmarks of an audiobook")
                .arg(Arg::new("audiobook").required(true).value_name("AUDIOBOOK_ID").help("Audiobook id from the manifest"))
                .arg(Arg::new("json").long("json").help("Print bookmarks as JSON").action(ArgAction::SetTrue)),
        )
        .subcommand(
            Command::new("unmark")
                .about("Delete a stored bookmark")
                .arg(Arg::new("id").required(true).value_name("BOOKMARK_ID").help("Bookmark id (UUID)")),
        )
        .subcommand(
            Command::new("config")
                .about("Inspect or create the configuration file")
                .subcommand_required(true)
                .subcommand(Command::new("init").about("Write the default config if none exists"))
                .subcommand(Command::new("show").about("Print the effective configuration"))
                .subcommand(Command::new("path").about("Print the config file location")),
        )
}

fn config_manager(matches: &ArgMatches) -> Result<ConfigManager> {
    match matches.get_one::<String>("config-dir") {
        Some(dir) => Ok(ConfigManager::with_directory(PathBuf::from(dir))),
        None => ConfigManager::new().context("Failed to resolve config directory"),
    }
}

/// Installs the logger; `RUST_LOG` wins over `app.log_level`
fn init_logging(config: &Config) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.app.log_level.as_filter()),
    )
    .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let manager = config_manager(&matches)?;

    let loaded = manager.load();
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    };
    init_logging(&config);
    if let Err(e) = loaded {
        log::warn!("Failed to load config: {}, using defaults", e);
    }

    let db_path = commands::database_path(&manager, &config, matches.get_one::<String>("database"));

    match matches.subcommand() {
        Some(("catalog", sub_matches)) => commands::show_catalog(sub_matches),
        Some(("play", sub_matches)) => player::run(&config, &db_path, sub_matches).await,
        Some(("bookmarks", sub_matches)) => commands::list_bookmarks(&db_path, sub_matches).await,
        Some(("unmark", sub_matches)) => commands::remove_bookmark(&db_path, sub_matches).await,
        Some(("config", sub_matches)) => commands::config_command(&manager, &config, sub_matches),
        _ => {
            build_cli().print_help()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let matches = build_cli()
            .try_get_matches_from([
                "chaptercast",
                "bookmarks",
                "book-1",
                "--database",
                "/tmp/marks.db",
            ])
            .unwrap();

        assert_eq!(
            matches.get_one::<String>("database").map(String::as_str),
            Some("/tmp/marks.db")
        );
    }

    #[test]
    fn test_play_offset_must_be_a_number() {
        let result =
            build_cli().try_get_matches_from(["chaptercast", "play", "book.json", "--at", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_requires_action() {
        assert!(build_cli()
            .try_get_matches_from(["chaptercast", "config"])
            .is_err());
    }
}
