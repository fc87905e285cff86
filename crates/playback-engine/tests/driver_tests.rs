// crates/playback-engine/tests/driver_tests.rs
//! End-to-end tests of the session task over the simulated backend
//!
//! All tests run on a paused tokio clock, so sleeping advances virtual time
//! deterministically.

mod common;

use chaptercast_core::{AudiobookId, BookmarkRepository, ChapterId, PlaybackPhase, PlaybackState};
use common::{two_chapter_catalog, DelayedRepository};
use playback_engine::{
    BookmarkStore, EngineError, InMemoryBookmarkRepository, PlaybackSession, RemoveOutcome,
    SessionDriver, SessionHandle, SessionSettings, SimulatedBackend, StateStream,
};
use std::time::Duration;

fn backend() -> SimulatedBackend {
    SimulatedBackend::new()
        .with_duration("ch1.mp3", 100.0)
        .with_duration("ch2.mp3", 200.0)
        .with_open_latency(Duration::from_millis(50))
}

fn spawn_session<R>(backend: SimulatedBackend, repo: R) -> SessionHandle
where
    R: BookmarkRepository + Clone + 'static,
{
    let catalog = two_chapter_catalog();
    let store = BookmarkStore::new(catalog.audiobook_id().clone(), repo);
    let (session, events) =
        PlaybackSession::new(catalog, backend, SessionSettings::default()).unwrap();
    SessionDriver::spawn(session, events, store)
}

async fn wait_for<F>(stream: &mut StateStream, mut predicate: F) -> PlaybackState
where
    F: FnMut(&PlaybackState) -> bool,
{
    let search = async {
        while let Some(state) = stream.recv().await {
            if predicate(&state) {
                return state;
            }
        }
        panic!("state stream closed");
    };
    tokio::time::timeout(Duration::from_secs(3600), search)
        .await
        .expect("state never reached")
}

async fn load_ready(handle: &SessionHandle, chapter: &str) -> StateStream {
    let mut states = handle.subscribe().await.unwrap();
    handle.load(ChapterId::from(chapter)).await.unwrap();
    wait_for(&mut states, |s| s.phase == PlaybackPhase::Ready).await;
    states
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_delivers_current_state_first() {
    let handle = spawn_session(backend(), InMemoryBookmarkRepository::new());
    let mut states = handle.subscribe().await.unwrap();

    let first = states.recv().await.unwrap();
    assert_eq!(first.phase, PlaybackPhase::Idle);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_auto_advance_scenario() {
    let handle = spawn_session(backend(), InMemoryBookmarkRepository::new());
    let mut states = load_ready(&handle, "Ch1").await;

    handle.play().await.unwrap();
    let advanced = wait_for(&mut states, |s| {
        s.chapter_id == Some(ChapterId::from("Ch2")) && s.phase == PlaybackPhase::Playing
    })
    .await;

    assert!(advanced.is_playing);
    assert_eq!(advanced.position_seconds, 0.0);
    assert_eq!(advanced.duration_seconds, Some(200.0));
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sampler_publishes_progress() {
    let handle = spawn_session(backend(), InMemoryBookmarkRepository::new());
    let _states = load_ready(&handle, "Ch1").await;

    handle.play().await.unwrap();
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let state = handle.state().await.unwrap();
    assert_eq!(state.phase, PlaybackPhase::Playing);
    assert!(
        (3.0..=3.5).contains(&state.position_seconds),
        "position {} not sampled",
        state.position_seconds
    );

    handle.pause().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    let paused = handle.state().await.unwrap();
    assert_eq!(paused.phase, PlaybackPhase::Paused);
    assert!((paused.position_seconds - 3.5).abs() < 1e-6);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reaches_end_of_book() {
    let handle = spawn_session(backend(), InMemoryBookmarkRepository::new());
    let mut states = load_ready(&handle, "Ch2").await;

    handle.play().await.unwrap();
    let ended = wait_for(&mut states, |s| s.phase == PlaybackPhase::Ended).await;

    assert_eq!(ended.position_seconds, 200.0);
    assert!(!ended.is_playing);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_seek_is_clamped_through_handle() {
    let handle = spawn_session(backend(), InMemoryBookmarkRepository::new());
    let _states = load_ready(&handle, "Ch1").await;

    assert_eq!(handle.seek(-5.0).await.unwrap(), Some(0.0));
    assert_eq!(handle.seek(150.0).await.unwrap(), Some(100.0));
    assert_eq!(handle.state().await.unwrap().position_seconds, 100.0);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rejected_volume_keeps_previous_value() {
    let handle = spawn_session(backend(), InMemoryBookmarkRepository::new());
    handle.set_volume(55).await.unwrap();

    let result = handle.set_volume(150).await;
    assert!(matches!(result, Err(EngineError::InvalidParameter { .. })));
    assert_eq!(handle.state().await.unwrap().volume, 55);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_blocked_play_can_be_retried() {
    let backend = backend();
    let gate = backend.gate();
    let handle = spawn_session(backend, InMemoryBookmarkRepository::new());
    let _states = load_ready(&handle, "Ch1").await;

    gate.block();
    assert!(matches!(
        handle.play().await,
        Err(EngineError::PlaybackBlocked(_))
    ));
    assert_eq!(handle.state().await.unwrap().phase, PlaybackPhase::Ready);

    gate.allow();
    handle.play().await.unwrap();
    assert!(handle.state().await.unwrap().is_playing);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failing_source_reports_error_state() {
    let backend = backend().with_failing_source("ch2.mp3");
    let handle = spawn_session(backend, InMemoryBookmarkRepository::new());
    let mut states = handle.subscribe().await.unwrap();

    handle.load(ChapterId::from("Ch2")).await.unwrap();
    let failed = wait_for(&mut states, |s| s.failure().is_some()).await;
    assert!(failed.failure().unwrap().reason.contains("ch2.mp3"));

    handle.load(ChapterId::from("Ch1")).await.unwrap();
    wait_for(&mut states, |s| s.phase == PlaybackPhase::Ready).await;
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rapid_loads_keep_one_resource() {
    let backend = backend();
    let probe = backend.clone();
    let handle = spawn_session(backend, InMemoryBookmarkRepository::new());
    let mut states = handle.subscribe().await.unwrap();

    handle.load(ChapterId::from("Ch1")).await.unwrap();
    handle.load(ChapterId::from("Ch2")).await.unwrap();
    handle.load(ChapterId::from("Ch1")).await.unwrap();

    let ready = wait_for(&mut states, |s| s.phase == PlaybackPhase::Ready).await;
    assert_eq!(ready.chapter_id, Some(ChapterId::from("Ch1")));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(probe.opens(), 3);
    assert_eq!(probe.open_handles(), 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_bookmark_round_trip() {
    let repo = InMemoryBookmarkRepository::new();
    let handle = spawn_session(backend(), repo.clone());
    let _states = load_ready(&handle, "Ch1").await;

    handle.seek(42.0).await.unwrap();
    let bookmark = handle.bookmark_current_position().await.unwrap();
    handle.seek(80.0).await.unwrap();

    assert_eq!(bookmark.chapter_id, ChapterId::from("Ch1"));
    assert_eq!(bookmark.offset_seconds, 42.0);
    assert_eq!(handle.bookmarks().await.unwrap(), vec![bookmark.clone()]);
    assert_eq!(repo.len(), 1);

    assert_eq!(
        handle.remove_bookmark(bookmark.id).await.unwrap(),
        RemoveOutcome::Removed
    );
    assert_eq!(
        handle.remove_bookmark(bookmark.id).await.unwrap(),
        RemoveOutcome::NotFound
    );
    assert!(handle.bookmarks().await.unwrap().is_empty());
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_bookmark_while_playing_uses_live_position() {
    let handle = spawn_session(backend(), InMemoryBookmarkRepository::new());
    let _states = load_ready(&handle, "Ch1").await;

    handle.play().await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let bookmark = handle.bookmark_current_position().await.unwrap();

    assert!((bookmark.offset_seconds - 2.5).abs() < 1e-6);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_bookmark_without_resource_fails() {
    let handle = spawn_session(backend(), InMemoryBookmarkRepository::new());
    assert!(matches!(
        handle.bookmark_current_position().await,
        Err(EngineError::NothingToBookmark(_))
    ));
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resume_stored_bookmark() {
    let repo = InMemoryBookmarkRepository::new();
    let stored = repo
        .create_bookmark(&AudiobookId::from("book-1"), &ChapterId::from("Ch2"), 64.0)
        .await
        .unwrap();

    let handle = spawn_session(backend(), repo);
    assert_eq!(handle.refresh_bookmarks().await.unwrap(), 1);

    let mut states = handle.subscribe().await.unwrap();
    handle.resume_bookmark(stored.id).await.unwrap();
    let ready = wait_for(&mut states, |s| s.phase == PlaybackPhase::Ready).await;

    assert_eq!(ready.chapter_id, Some(ChapterId::from("Ch2")));
    assert_eq!(ready.position_seconds, 64.0);

    let missing = handle
        .resume_bookmark(chaptercast_core::BookmarkId::new())
        .await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_resource() {
    let backend = backend();
    let probe = backend.clone();
    let handle = spawn_session(backend, InMemoryBookmarkRepository::new());
    let _states = load_ready(&handle, "Ch1").await;
    handle.play().await.unwrap();
    assert_eq!(probe.open_handles(), 1);

    handle.shutdown().await.unwrap();
    assert_eq!(probe.open_handles(), 0);
    assert!(matches!(handle.play().await, Err(EngineError::SessionClosed)));
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_clones_share_one_session() {
    let handle = spawn_session(backend(), InMemoryBookmarkRepository::new());
    let other = handle.clone();

    handle.set_muted(true).await.unwrap();
    assert!(other.state().await.unwrap().muted);

    other.shutdown().await.unwrap();
    assert!(matches!(handle.state().await, Err(EngineError::SessionClosed)));
}

#[tokio::test(start_paused = true)]
async fn test_bookmark_survives_slow_startup_listing() {
    let repo = InMemoryBookmarkRepository::new();
    let slow = DelayedRepository::new(repo.clone()).with_list_delay(Duration::from_millis(500));
    let handle = spawn_session(backend(), slow);
    let _states = load_ready(&handle, "Ch1").await;

    handle.seek(10.0).await.unwrap();
    let bookmark = handle.bookmark_current_position().await.unwrap();

    // Startup listing was read before the bookmark existed
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.bookmarks().await.unwrap(), vec![bookmark.clone()]);
    assert_eq!(repo.len(), 1);

    handle.load(ChapterId::from("Ch2")).await.unwrap();
    let mut states = handle.subscribe().await.unwrap();
    handle.resume_bookmark(bookmark.id).await.unwrap();
    let ready = wait_for(&mut states, |s| {
        s.phase == PlaybackPhase::Ready && s.chapter_id == Some(ChapterId::from("Ch1"))
    })
    .await;
    assert_eq!(ready.position_seconds, 10.0);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_removed_bookmark_stays_removed_after_slow_listing() {
    let repo = InMemoryBookmarkRepository::new();
    let stored = repo
        .create_bookmark(&AudiobookId::from("book-1"), &ChapterId::from("Ch2"), 64.0)
        .await
        .unwrap();
    let slow = DelayedRepository::new(repo.clone()).with_list_delay(Duration::from_millis(500));
    let handle = spawn_session(backend(), slow);
    assert_eq!(handle.refresh_bookmarks().await.unwrap(), 1);

    let refresher = handle.clone();
    let refresh = tokio::spawn(async move { refresher.refresh_bookmarks().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        handle.remove_bookmark(stored.id).await.unwrap(),
        RemoveOutcome::Removed
    );
    // The listing still contains the bookmark
    assert_eq!(refresh.await.unwrap().unwrap(), 1);

    assert!(handle.bookmarks().await.unwrap().is_empty());
    assert!(matches!(
        handle.resume_bookmark(stored.id).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(repo.is_empty());
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_listing_during_unacknowledged_create_keeps_one_copy() {
    let repo = InMemoryBookmarkRepository::new();
    let slow = DelayedRepository::new(repo.clone()).with_create_delay(Duration::from_millis(500));
    let handle = spawn_session(backend(), slow);
    let _states = load_ready(&handle, "Ch1").await;
    handle.seek(30.0).await.unwrap();

    let creator = handle.clone();
    let create = tokio::spawn(async move { creator.bookmark_current_position().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Stored but not yet acknowledged
    assert_eq!(repo.len(), 1);
    assert_eq!(handle.refresh_bookmarks().await.unwrap(), 1);

    let bookmark = create.await.unwrap().unwrap();
    assert_eq!(handle.bookmarks().await.unwrap(), vec![bookmark]);
    handle.shutdown().await.unwrap();
}
