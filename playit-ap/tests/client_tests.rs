//! Session client integration tests
//!
//! Command queueing before the handle resolves, listener delivery and
//! teardown behavior of [`SessionClient`].

mod helpers;

use helpers::*;
use playit_ap::source::StaticTrackSource;
use playit_ap::{HandleStatus, SessionClient};
use playit_common::{PlaybackSnapshot, PlayerState, Track};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

fn listening_client(session: &TestSession) -> (SessionClient, mpsc::UnboundedReceiver<PlaybackSnapshot>) {
    let client = SessionClient::new(session.service.clone());
    let (tx, rx) = mpsc::unbounded_channel();
    client.set_listener(move |snapshot| {
        let _ = tx.send(snapshot);
    });
    (client, rx)
}

#[tokio::test]
async fn test_commands_before_connect_apply_in_order() {
    let session = start_session();
    let (client, mut deliveries) = listening_client(&session);

    client.add_items(remote_tracks(3, 60_000));
    client.play(1);
    client.toggle_shuffle();
    assert_eq!(client.status(), HandleStatus::Idle);

    client.connect();
    let snapshot = wait_for_delivery(&mut deliveries, |s| {
        s.state == PlayerState::Playing && s.shuffle_enabled
    })
    .await;
    assert_eq!(snapshot.current_index, Some(1));
    assert_eq!(snapshot.queue_len, 3);
    assert_eq!(client.status(), HandleStatus::Connected);

    client.destroy();
    session.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_listener_gets_initial_snapshot() {
    let session = start_session();
    let (client, mut deliveries) = listening_client(&session);

    client.wait_connected().await.unwrap();
    let initial = wait_for_delivery(&mut deliveries, |_| true).await;
    assert_eq!(initial, PlaybackSnapshot::default());

    client.destroy();
    session.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_repeated_connect_shares_resolution() {
    let session = start_session();
    let client = SessionClient::new(session.service.clone());

    let mut first = client.connect();
    let _second = client.connect();
    timeout(WAIT, first.wait_for(HandleStatus::is_connected))
        .await
        .expect("timed out connecting")
        .unwrap();

    // One host, one noisy-output registration
    assert_eq!(session.signals.receiver_count(), 1);

    client.destroy();
    session.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_listener_replacement() {
    let session = start_session();
    let client = SessionClient::new(session.service.clone());
    let first_calls = Arc::new(AtomicUsize::new(0));
    let counter = first_calls.clone();
    client.set_listener(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    client.wait_connected().await.unwrap();
    sleep(Duration::from_millis(50)).await;
    let before = first_calls.load(Ordering::SeqCst);
    assert!(before >= 1);

    let (tx, mut deliveries) = mpsc::unbounded_channel();
    client.set_listener(move |snapshot| {
        let _ = tx.send(snapshot);
    });
    client.toggle_shuffle();
    wait_for_delivery(&mut deliveries, |s| s.shuffle_enabled).await;
    assert_eq!(first_calls.load(Ordering::SeqCst), before);

    client.destroy();
    session.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_current_position_advances_while_playing() {
    let session = start_session();
    let (client, mut deliveries) = listening_client(&session);
    assert_eq!(client.current_position(), 0);

    client.play_tracks(remote_tracks(1, 60_000), 0);
    client.connect();
    wait_for_delivery(&mut deliveries, |s| s.state == PlayerState::Playing).await;

    sleep(Duration::from_millis(200)).await;
    assert!(client.current_position() > 0);

    // Position updates keep arriving while playing
    let update = wait_for_delivery(&mut deliveries, |s| s.position_ms > 0).await;
    assert_eq!(update.state, PlayerState::Playing);

    client.destroy();
    session.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_play_tracks_skips_tracks_without_locator() {
    let session = start_session();
    let (client, mut deliveries) = listening_client(&session);

    let tracks = vec![
        remote_track("a", 60_000),
        Track::new("no-source", "Nothing", "Band"),
        remote_track("c", 60_000),
    ];
    client.play_tracks(tracks, 2);
    client.connect();

    let playing = wait_for_delivery(&mut deliveries, |s| s.state == PlayerState::Playing).await;
    assert_eq!(playing.queue_len, 2);
    assert_eq!(playing.current_track.unwrap().id, "c");

    client.destroy();
    session.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_play_tracks_with_duplicate_ids_starts_requested_track() {
    let session = start_session();
    let (client, mut deliveries) = listening_client(&session);

    let a = remote_track("a", 60_000);
    let b = remote_track("b", 60_000);
    client.play_tracks(vec![a.clone(), a, b], 2);
    client.connect();

    let playing = wait_for_delivery(&mut deliveries, |s| s.state == PlayerState::Playing).await;
    assert_eq!(playing.queue_len, 2);
    assert_eq!(playing.current_index, Some(1));
    assert_eq!(playing.current_track.unwrap().id, "b");

    client.destroy();
    session.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_play_track_from_source() {
    let session = start_session();
    let (client, mut deliveries) = listening_client(&session);
    let source = StaticTrackSource::new(remote_tracks(4, 60_000));
    client.connect();

    assert!(!client.play_track_from(&source, "missing").await.unwrap());
    assert!(client.play_track_from(&source, "t3").await.unwrap());

    let playing = wait_for_delivery(&mut deliveries, |s| s.state == PlayerState::Playing).await;
    assert_eq!(playing.current_index, Some(3));
    assert_eq!(playing.queue_len, 4);

    client.destroy();
    session.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_destroy_silences_client() {
    let session = start_session();
    let calls = Arc::new(AtomicUsize::new(0));
    let client = SessionClient::new(session.service.clone());
    let counter = calls.clone();
    client.set_listener(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    client.wait_connected().await.unwrap();

    client.destroy();
    client.destroy();
    assert_eq!(client.status(), HandleStatus::Released);
    assert!(client.is_destroyed());
    let after_destroy = calls.load(Ordering::SeqCst);

    // Ignored without error
    client.play_tracks(remote_tracks(2, 60_000), 0);
    client.resume();
    client.seek_to(1_000);

    let handle = session.service.handle().await.unwrap();
    sleep(Duration::from_millis(100)).await;
    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.queue_len, 0);
    assert_eq!(snapshot.state, PlayerState::Stopped);
    assert_eq!(calls.load(Ordering::SeqCst), after_destroy);
    assert_eq!(client.current_position(), 0);

    session.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connect_after_service_shutdown_fails() {
    let session = start_session();
    session.service.shutdown().await.unwrap();

    let client = SessionClient::new(session.service.clone());
    assert!(client.wait_connected().await.is_err());
    assert!(matches!(client.status(), HandleStatus::Failed(_)));
}

#[tokio::test]
async fn test_two_clients_share_one_session() {
    let session = start_session();
    let (first, mut first_deliveries) = listening_client(&session);
    let (second, mut second_deliveries) = listening_client(&session);
    first.connect();
    second.connect();

    first.play_tracks(remote_tracks(2, 60_000), 0);
    wait_for_delivery(&mut first_deliveries, |s| s.state == PlayerState::Playing).await;
    let seen = wait_for_delivery(&mut second_deliveries, |s| s.state == PlayerState::Playing).await;
    assert_eq!(seen.current_track.unwrap().id, "t0");

    second.pause();
    wait_for_delivery(&mut first_deliveries, |s| s.state == PlayerState::Paused).await;

    first.destroy();
    second.destroy();
    session.service.shutdown().await.unwrap();
}
