//! End-to-end limit scenarios through the lane router and a memory sink.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use monitor_core::config::LimitsConfig;
use monitor_core::{Action, Area, Event, LimitType, UserId};
use monitor_limits::{LaneRouter, LimitChecker, MemorySink, NotificationFilters, NotificationSink};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

fn event(uid: &str, area: Area, action: Action, offset_secs: i64) -> Event {
    let ts = t0() + Duration::seconds(offset_secs);
    Event::new_at(UserId::new(uid).unwrap(), area, action, ts, ts).unwrap()
}

fn setup() -> (LaneRouter, Arc<MemorySink>) {
    let config = LimitsConfig::default();
    let sink = Arc::new(MemorySink::new());
    let checker = Arc::new(LimitChecker::from_config(&config, sink.clone()));
    (LaneRouter::from_config(checker, &config), sink)
}

async fn notifications_for(sink: &MemorySink, uid: &str) -> Vec<monitor_core::Notification> {
    sink.find(&NotificationFilters {
        user_id: Some(UserId::new(uid).unwrap()),
        limit_type: None,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn interleaved_users_raise_exactly_their_own_notifications() {
    let (router, sink) = setup();

    let stream = vec![
        event("83", Area::User, Action::Delete, 0),
        event("99", Area::User, Action::Update, 0),
        event("83", Area::User, Action::Delete, 1),
        event("42", Area::TopSecret, Action::Read, 1),
        event("83", Area::User, Action::Delete, 2),
        event("99", Area::User, Action::Update, 30),
    ];
    for e in stream {
        router.dispatch(e).await.unwrap();
    }
    router.shutdown().await;

    let deletions = notifications_for(&sink, "83").await;
    assert_eq!(deletions.len(), 1);
    assert_eq!(deletions[0].limit_type(), LimitType::ThreeUserDeletions);
    assert!(deletions[0].message().contains("deleted 3 resources consecutively"));

    let secret = notifications_for(&sink, "42").await;
    assert_eq!(secret.len(), 1);
    assert_eq!(secret[0].limit_type(), LimitType::TopSecretRead);

    let updates = notifications_for(&sink, "99").await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].limit_type(), LimitType::TwoUserUpdatesInOneMinute);
    assert_eq!(updates[0].message(), "User 99 updated 2 users within 1 minute");

    assert_eq!(sink.len(), 3);
}

#[tokio::test]
async fn updates_just_outside_the_window_raise_nothing() {
    let (router, sink) = setup();

    router.dispatch(event("99", Area::User, Action::Update, 0)).await.unwrap();
    router.dispatch(event("99", Area::User, Action::Update, 61)).await.unwrap();
    router.shutdown().await;

    assert!(sink.is_empty());
}

#[tokio::test]
async fn other_users_do_not_break_a_deletion_run() {
    let (router, sink) = setup();

    router.dispatch(event("a", Area::User, Action::Delete, 0)).await.unwrap();
    router.dispatch(event("b", Area::User, Action::Read, 1)).await.unwrap();
    router.dispatch(event("a", Area::User, Action::Delete, 2)).await.unwrap();
    router.dispatch(event("b", Area::User, Action::Delete, 3)).await.unwrap();
    router.dispatch(event("a", Area::User, Action::Delete, 4)).await.unwrap();
    router.shutdown().await;

    assert_eq!(notifications_for(&sink, "a").await.len(), 1);
    assert!(notifications_for(&sink, "b").await.is_empty());
}

#[tokio::test]
async fn repeated_top_secret_reads_are_not_deduplicated() {
    let (router, sink) = setup();

    for t in 0..3 {
        router
            .dispatch(event("42", Area::TopSecret, Action::Read, t))
            .await
            .unwrap();
    }
    router.shutdown().await;

    let found = sink
        .find(&NotificationFilters {
            user_id: None,
            limit_type: Some(LimitType::TopSecretRead),
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
    assert!(found
        .windows(2)
        .all(|w| w[0].created_at() >= w[1].created_at()));
}

#[tokio::test]
async fn history_cap_keeps_updates_inside_the_window() {
    let config = LimitsConfig {
        history_cap: Some(3),
        ..LimitsConfig::default()
    };
    let sink = Arc::new(MemorySink::new());
    let checker = Arc::new(LimitChecker::from_config(&config, sink.clone()));
    let router = LaneRouter::from_config(checker, &config);

    router.dispatch(event("99", Area::User, Action::Update, 0)).await.unwrap();
    for t in 1..=3 {
        router.dispatch(event("99", Area::Payment, Action::Read, t)).await.unwrap();
    }
    router.dispatch(event("99", Area::User, Action::Update, 10)).await.unwrap();
    router.shutdown().await;

    let updates = notifications_for(&sink, "99").await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].limit_type(), LimitType::TwoUserUpdatesInOneMinute);
}
