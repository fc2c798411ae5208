mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{stream_fixture, StubDirectory};
use interaction_service::error::AppError;
use interaction_service::models::{Stream, StreamStatus};
use interaction_service::repository::{HotStore, StreamStore};
use interaction_service::services::{Reaper, StreamUpdate};
use std::collections::HashMap;

fn directory() -> StubDirectory {
    StubDirectory::new().with_key("abcdef12", 42, "alice")
}

#[tokio::test]
async fn ingest_to_live_to_ended() {
    let fx = stream_fixture(directory());

    // /auth: validates the key and stores the session, no stream row yet.
    let validation = fx
        .service
        .authenticate("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();
    assert!(validation.valid);
    assert_eq!(validation.user_id, 42);
    let session = fx.hot.session_get("abcdef12").await.unwrap().unwrap();
    assert_eq!(session.username, "alice");
    assert!(session.stream_id.is_none());
    assert!(fx
        .store
        .list_streams_by_status(StreamStatus::Live)
        .await
        .unwrap()
        .is_empty());

    // /started: creates the live stream and writes the id back.
    let stream = fx
        .service
        .stream_started("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();
    assert_eq!(stream.status, StreamStatus::Live);
    assert!(stream.started_at.is_some());
    assert!(stream.ended_at.is_none());
    let session = fx.hot.session_get("abcdef12").await.unwrap().unwrap();
    assert_eq!(session.stream_id.as_deref(), Some(stream.id.as_str()));

    let active = fx.service.get_active_streams().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, stream.id);

    // /ended with an authoritative duration.
    let ended = fx.service.stream_ended("abcdef12", Some(30)).await.unwrap();
    assert_eq!(ended.status, StreamStatus::Ended);
    assert_eq!(ended.duration_seconds, 30);
    assert!(ended.ended_at.is_some());
    assert!(fx.hot.session_get("abcdef12").await.unwrap().is_none());

    let fetched = fx.service.get_stream(&stream.id).await.unwrap();
    assert_eq!(fetched.status, StreamStatus::Ended);
    assert_eq!(fetched.duration_seconds, 30);

    assert_eq!(fx.events.event_types(), ["stream_started", "stream_ended"]);
}

#[tokio::test]
async fn repeated_started_is_idempotent_within_a_session() {
    let fx = stream_fixture(directory());
    fx.service
        .authenticate("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();

    let first = fx
        .service
        .stream_started("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();
    let second = fx
        .service
        .stream_started("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    // Only one row and one started event despite the re-delivery.
    assert_eq!(
        fx.store
            .list_streams_by_status(StreamStatus::Live)
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(fx.events.event_types(), ["stream_started"]);
}

#[tokio::test]
async fn invalid_key_leaves_no_trace() {
    let fx = stream_fixture(directory());

    let err = fx
        .service
        .authenticate("x", "10.0.0.1", "live")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated(_)));
    assert!(fx.hot.session_get("x").await.unwrap().is_none());

    // Without a session, a started callback cannot create a stream.
    let err = fx
        .service
        .stream_started("x", "10.0.0.1", "live")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::FailedPrecondition(_)));
    assert!(fx.events.event_types().is_empty());
}

#[tokio::test]
async fn one_live_stream_per_user() {
    let fx = stream_fixture(directory().with_key("secondkey", 42, "alice"));

    fx.service
        .authenticate("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();
    fx.service
        .stream_started("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();

    // Same user shows up with a second key while still live.
    fx.service
        .authenticate("secondkey", "10.0.0.2", "live")
        .await
        .unwrap();
    let err = fx
        .service
        .stream_started("secondkey", "10.0.0.2", "live")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));
}

#[tokio::test]
async fn computed_duration_matches_timestamps() {
    let fx = stream_fixture(directory());
    fx.service
        .authenticate("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();
    fx.service
        .stream_started("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();

    // No duration from the caller: it is derived from the timestamps.
    let ended = fx.service.stream_ended("abcdef12", None).await.unwrap();
    let span = (ended.ended_at.unwrap() - ended.started_at.unwrap()).num_seconds();
    assert!((ended.duration_seconds - span).abs() <= 1);
}

#[tokio::test]
async fn ending_twice_is_a_precondition_failure() {
    let fx = stream_fixture(directory());
    fx.service
        .authenticate("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();
    fx.service
        .stream_started("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();
    fx.service.stream_ended("abcdef12", Some(10)).await.unwrap();

    let err = fx
        .service
        .stream_ended("abcdef12", Some(10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::FailedPrecondition(_) | AppError::NotFound(_)
    ));
}

#[tokio::test]
async fn status_only_moves_forward() {
    let fx = stream_fixture(directory());
    fx.service
        .authenticate("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();
    let stream = fx
        .service
        .stream_started("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();

    // Viewer counts move freely while live.
    let updated = fx
        .service
        .update_stream(
            &stream.id,
            StreamUpdate {
                viewer_count: Some(12),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.viewer_count, 12);

    let ended = fx
        .service
        .update_stream(
            &stream.id,
            StreamUpdate {
                status: Some(StreamStatus::Ended),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ended.status, StreamStatus::Ended);
    assert!(ended.ended_at.is_some());

    // Terminal states never go back to live.
    let err = fx
        .service
        .update_stream(
            &stream.id,
            StreamUpdate {
                status: Some(StreamStatus::Live),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::FailedPrecondition(_)));
}

#[tokio::test]
async fn recording_completed_annotates_without_status_change() {
    let fx = stream_fixture(directory());
    fx.service
        .authenticate("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();
    let stream = fx
        .service
        .stream_started("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();

    let updated = fx
        .service
        .recording_completed("abcdef12", "/recordings/a.flv", 1024, 30)
        .await
        .unwrap();
    assert_eq!(updated.status, StreamStatus::Live);
    assert_eq!(updated.recording_url.as_deref(), Some("/recordings/a.flv"));
    assert_eq!(updated.metadata.get("recording_size").unwrap(), "1024");
    assert_eq!(updated.metadata.get("recording_duration").unwrap(), "30");
    assert_eq!(
        fx.events.event_types(),
        ["stream_started", "recording_completed"]
    );

    // The annotation survives the read path.
    let fetched = fx.service.get_stream(&stream.id).await.unwrap();
    assert_eq!(fetched.recording_url.as_deref(), Some("/recordings/a.flv"));
}

#[tokio::test]
async fn reaper_expires_stuck_streams() {
    let fx = stream_fixture(directory());

    let now = Utc::now();
    let stuck = Stream {
        id: "stream_stuck".into(),
        user_id: 7,
        stream_key: "stuckkey".into(),
        title: "t".into(),
        status: StreamStatus::Live,
        started_at: Some(now - ChronoDuration::hours(13)),
        ended_at: None,
        duration_seconds: 0,
        viewer_count: 0,
        recording_url: None,
        metadata: HashMap::new(),
        created_at: now - ChronoDuration::hours(13),
        updated_at: now - ChronoDuration::hours(2),
    };
    let healthy = Stream {
        id: "stream_fresh".into(),
        user_id: 8,
        stream_key: "freshkey".into(),
        started_at: Some(now - ChronoDuration::minutes(30)),
        updated_at: now,
        created_at: now - ChronoDuration::minutes(30),
        ..stuck.clone()
    };
    fx.store.put_stream(&stuck).await.unwrap();
    fx.store.put_stream(&healthy).await.unwrap();

    let reaper = Reaper::new(fx.store.clone(), fx.hot.clone(), fx.events.clone());
    let expired = reaper.run_once().await.unwrap();
    assert_eq!(expired, 1);

    let stuck_after = fx.store.get_stream("stream_stuck").await.unwrap().unwrap();
    assert_eq!(stuck_after.status, StreamStatus::Ended);
    let span = (stuck_after.ended_at.unwrap() - stuck_after.started_at.unwrap()).num_seconds();
    assert!((stuck_after.duration_seconds - span).abs() <= 1);

    let fresh_after = fx.store.get_stream("stream_fresh").await.unwrap().unwrap();
    assert_eq!(fresh_after.status, StreamStatus::Live);

    let types = fx.events.event_types();
    assert_eq!(types, ["stream_cleanup"]);
    let event = &fx.events.events()[0];
    assert_eq!(event["reason"], "expired");
    assert_eq!(event["stream_id"], "stream_stuck");
}

#[tokio::test]
async fn stale_writer_loses_the_update_race() {
    let fx = stream_fixture(directory());
    fx.service
        .authenticate("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();
    let stream = fx
        .service
        .stream_started("abcdef12", "10.0.0.1", "live")
        .await
        .unwrap();

    // Writer A reads, writer B commits first.
    let mut stale = stream.clone();
    let snapshot = stale.updated_at;
    fx.service
        .update_stream(
            &stream.id,
            StreamUpdate {
                viewer_count: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    stale.viewer_count = 1;
    stale.updated_at = Utc::now();
    let err = fx.store.update_stream(&stale, snapshot).await.unwrap_err();
    assert!(matches!(err, AppError::FailedPrecondition(_)));

    let current = fx.service.get_stream(&stream.id).await.unwrap();
    assert_eq!(current.viewer_count, 3);
}
