// Command processing against a mocked back end: invalidation counts,
// notices, transition guards, and the connect/disconnect lifecycle.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clinisync_core::{
    ALERTS_RESOURCE, AlertFilter, AlertId, AlertSeverity, AlertStatus, AlertSync, AuthCredentials,
    Command, CommandResult, ConnectionState, CoreError, ErrorKind, NOTIFICATIONS_RESOURCE,
    Notice, SyncConfig, SyncMode,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn alert_json(id: &str, status: &str, severity: &str, version: u64) -> Value {
    json!({
        "id": id,
        "title": format!("Alert {id}"),
        "message": "Oxygen supply pressure low",
        "severity": severity,
        "status": status,
        "category": "clinical",
        "source": "ward-monitor",
        "timestamp": "2026-03-01T08:00:00Z",
        "version": version
    })
}

fn seed_alerts() -> Value {
    json!([
        alert_json("a1", "active", "high", 1),
        alert_json("a2", "acknowledged", "medium", 1),
        alert_json("a3", "resolved", "critical", 1),
    ])
}

fn notification_json(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "title": "Lab results ready",
        "message": "CBC panel for bed 12",
        "priority": "high",
        "status": status,
        "type": "lab",
        "createdAt": "2026-03-01T08:00:00Z"
    })
}

fn quiet_config(server: &MockServer) -> SyncConfig {
    let mut config = SyncConfig::new(server.uri().parse().unwrap(), AuthCredentials::Anonymous);
    config.settings.realtime_enabled = false;
    config.settings.auto_refresh = false;
    config.timeout = Duration::from_secs(5);
    config
}

async fn mount_lists(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/monitoring/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(seed_alerts()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([notification_json("n1", "sent")])),
        )
        .mount(server)
        .await;
}

async fn connected(server: &MockServer) -> AlertSync {
    mount_lists(server).await;
    let sync = AlertSync::new(quiet_config(server));
    tokio_test::assert_ok!(sync.connect().await);
    sync
}

async fn alert_list_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/monitoring/alerts")
        .count()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_loads_alerts_and_notifications() {
    let server = MockServer::start().await;
    let sync = connected(&server).await;

    let ids: Vec<_> = sync
        .alerts_snapshot()
        .iter()
        .map(|a| a.id.to_string())
        .collect();
    assert_eq!(ids, ["a1", "a2", "a3"]);
    assert_eq!(sync.unread_count(), 1);
    assert_eq!(*sync.connection_state().borrow(), ConnectionState::Connected);
    assert_eq!(*sync.sync_mode().borrow(), SyncMode::Idle);

    sync.disconnect().await;
}

#[tokio::test]
async fn successful_command_invalidates_exactly_once() {
    let server = MockServer::start().await;
    let sync = connected(&server).await;
    let mut notices = sync.notices();

    Mock::given(method("POST"))
        .and(path("/api/monitoring/alerts/a1/acknowledge"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(alert_json("a1", "acknowledged", "high", 2)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = sync
        .execute(Command::AcknowledgeAlert {
            id: AlertId::from("a1"),
            note: Some("paged respiratory".into()),
        })
        .await
        .unwrap();
    let CommandResult::Alert(alert) = result else {
        panic!("expected an alert result");
    };
    assert_eq!(alert.status, AlertStatus::Acknowledged);

    assert_eq!(sync.invalidations(ALERTS_RESOURCE), 1);
    assert_eq!(sync.invalidations(NOTIFICATIONS_RESOURCE), 0);

    // The re-sync returns the older revision; the confirmed one stays.
    assert_eq!(
        sync.alert(&AlertId::from("a1")).unwrap().status,
        AlertStatus::Acknowledged
    );
    assert_eq!(sync.alerts_snapshot().len(), 3);

    let notice = notices.recv().await.unwrap();
    assert!(matches!(
        notice,
        Notice::Success { action: "acknowledge alert", .. }
    ));

    sync.disconnect().await;
}

#[tokio::test]
async fn failed_command_does_not_invalidate() {
    let server = MockServer::start().await;
    let sync = connected(&server).await;
    let mut notices = sync.notices();

    Mock::given(method("POST"))
        .and(path("/api/monitoring/alerts/a1/resolve"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"message": "maintenance"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = sync
        .execute(Command::ResolveAlert {
            id: AlertId::from("a1"),
            resolution: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(sync.invalidations(ALERTS_RESOURCE), 0);

    match notices.recv().await.unwrap() {
        Notice::Error {
            action,
            kind,
            retryable,
            ..
        } => {
            assert_eq!(action, "resolve alert");
            assert_eq!(kind, ErrorKind::Server);
            assert!(retryable);
        }
        other => panic!("expected an error notice, got {other:?}"),
    }
    assert_eq!(
        sync.alert(&AlertId::from("a1")).unwrap().status,
        AlertStatus::Active
    );

    sync.disconnect().await;
}

#[tokio::test]
async fn invalid_transition_is_rejected_before_any_request() {
    let server = MockServer::start().await;
    let sync = connected(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/monitoring/alerts/a3/acknowledge"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = sync
        .execute(Command::AcknowledgeAlert {
            id: AlertId::from("a3"),
            note: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::InvalidTransition {
            from: AlertStatus::Resolved,
            to: AlertStatus::Acknowledged,
            ..
        }
    ));
    assert_eq!(sync.invalidations(ALERTS_RESOURCE), 0);

    sync.disconnect().await;
}

#[tokio::test]
async fn deleted_alert_is_not_resurrected_by_resync() {
    let server = MockServer::start().await;
    let sync = connected(&server).await;

    Mock::given(method("DELETE"))
        .and(path("/api/monitoring/alerts/a2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result = sync
        .execute(Command::DeleteAlert {
            id: AlertId::from("a2"),
        })
        .await
        .unwrap();
    assert!(matches!(result, CommandResult::Ok));

    // The list mock still returns a2 at the deleted revision.
    let ids: Vec<_> = sync
        .alerts_snapshot()
        .iter()
        .map(|a| a.id.to_string())
        .collect();
    assert_eq!(ids, ["a1", "a3"]);
    assert_eq!(sync.invalidations(ALERTS_RESOURCE), 1);

    sync.disconnect().await;
}

#[tokio::test]
async fn notification_commands_invalidate_notifications() {
    let server = MockServer::start().await;
    let sync = connected(&server).await;

    Mock::given(method("PUT"))
        .and(path("/api/notifications/n1/read"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/notifications/read-all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updated": 3})))
        .expect(1)
        .mount(&server)
        .await;

    sync.execute(Command::MarkNotificationRead { id: "n1".into() })
        .await
        .unwrap();
    let result = sync.execute(Command::MarkAllNotificationsRead).await.unwrap();
    assert!(matches!(result, CommandResult::Updated(3)));

    assert_eq!(sync.invalidations(NOTIFICATIONS_RESOURCE), 2);
    assert_eq!(sync.invalidations(ALERTS_RESOURCE), 0);

    sync.disconnect().await;
}

#[tokio::test]
async fn filter_change_fetches_new_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/monitoring/alerts"))
        .and(query_param("severity", "critical"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([alert_json("a3", "resolved", "critical", 1)])),
        )
        .expect(1)
        .mount(&server)
        .await;
    let sync = connected(&server).await;

    let filter = AlertFilter {
        severities: [AlertSeverity::Critical].into(),
        ..AlertFilter::default()
    };
    sync.set_filters(filter.clone()).await.unwrap();

    let ids: Vec<_> = sync
        .alerts_snapshot()
        .iter()
        .map(|a| a.id.to_string())
        .collect();
    assert_eq!(ids, ["a3"]);
    assert_eq!(sync.filtered_alerts().len(), 1);

    // Same filter again is not a change and issues no request.
    sync.set_filters(filter).await.unwrap();

    sync.disconnect().await;
}

#[tokio::test]
async fn disconnect_then_connect_restarts_processing() {
    let server = MockServer::start().await;
    let sync = connected(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/monitoring/alerts/a1/duplicate"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(alert_json("a9", "active", "high", 1)),
        )
        .expect(1)
        .mount(&server)
        .await;

    sync.disconnect().await;
    let err = sync
        .execute(Command::DuplicateAlert {
            id: AlertId::from("a1"),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));

    sync.connect().await.unwrap();
    let result = sync
        .execute(Command::DuplicateAlert {
            id: AlertId::from("a1"),
        })
        .await
        .unwrap();
    assert!(matches!(result, CommandResult::Alert(ref a) if a.id.as_str() == "a9"));

    sync.disconnect().await;
}

#[tokio::test]
async fn polling_refetches_on_interval_and_stops_when_idle() {
    let server = MockServer::start().await;
    mount_lists(&server).await;

    let mut config = quiet_config(&server);
    config.settings.auto_refresh = true;
    config.settings.refresh_interval = Duration::from_secs(1);
    let sync = AlertSync::new(config);
    sync.connect().await.unwrap();

    let mut mode = sync.sync_mode();
    tokio::time::timeout(Duration::from_secs(2), mode.wait_for(|m| *m == SyncMode::Polling))
        .await
        .unwrap()
        .unwrap();

    let before = alert_list_requests(&server).await;
    tokio::time::timeout(Duration::from_millis(2500), async {
        while alert_list_requests(&server).await <= before {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("no poll within the refresh interval");

    // Polling refetches do not count as invalidations.
    assert_eq!(sync.invalidations(ALERTS_RESOURCE), 0);

    sync.set_auto_refresh(false);
    tokio::time::timeout(Duration::from_secs(2), mode.wait_for(|m| *m == SyncMode::Idle))
        .await
        .unwrap()
        .unwrap();

    sync.disconnect().await;
}

#[tokio::test]
async fn oneshot_runs_without_background_sync() {
    let server = MockServer::start().await;
    mount_lists(&server).await;
    let mut config = quiet_config(&server);
    config.settings.realtime_enabled = true;
    config.settings.auto_refresh = true;

    let count = AlertSync::oneshot(config, |sync| async move {
        assert!(!sync.settings().realtime_enabled);
        assert!(!sync.settings().auto_refresh);
        Ok(sync.alerts_snapshot().len())
    })
    .await
    .unwrap();
    assert_eq!(count, 3);
}
