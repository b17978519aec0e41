//! Event application on the dashboard, driven without a network.
use futures::StreamExt;
use serde_json::json;
use svcwatch::config::Tunables;
use svcwatch::sse::SseFrame;
use svcwatch::state::ALERT_LOG_CAP;
use svcwatch::types::{ServiceState, WatchlistItem};
use svcwatch::{ConnectionState, Dashboard, Reconciler, StreamSignal, Subscription};
use tokio::sync::mpsc;

fn frame(event: &str, data: serde_json::Value) -> SseFrame {
    SseFrame {
        event: event.into(),
        data: data.to_string(),
        id: None,
    }
}

fn raw(event: &str, data: &str) -> SseFrame {
    SseFrame {
        event: event.into(),
        data: data.into(),
        id: None,
    }
}

fn watched(names: &[&str]) -> Vec<WatchlistItem> {
    let items: Vec<_> = names
        .iter()
        .map(|n| {
            json!({
                "serviceName": n,
                "service": {"name": n, "state": "running", "memoryMB": 100.0}
            })
        })
        .collect();
    serde_json::from_value(json!(items)).unwrap()
}

#[test]
fn status_for_unwatched_service_creates_nothing() {
    let mut dash = Dashboard::new(Tunables::default());
    dash.replace_watchlist(watched(&["svc-a"]));
    dash.apply_frame(&frame(
        "service_status",
        json!({"serviceName": "svc-b", "state": "stopped"}),
    ));
    assert!(dash.watchlist().get("svc-b").is_none());
    assert_eq!(dash.watchlist().len(), 1);
    assert!(dash.series("svc-b").is_none());
}

#[test]
fn malformed_host_resources_keeps_previous_snapshot() {
    let mut dash = Dashboard::new(Tunables::default());
    dash.apply_frame(&frame(
        "host_resources",
        json!({"cpuPercent": 10.0, "memoryMB": 1.0, "totalMB": 2048.0, "usedPercent": 5.0}),
    ));
    let before = dash.host().cloned();
    dash.apply_frame(&raw("host_resources", "{{{"));
    dash.apply_frame(&frame("host_resources", json!({"cpuPercent": []})));
    assert_eq!(dash.host().cloned(), before);

    dash.apply_frame(&frame(
        "host_resources",
        json!({"cpuPercent": 20.0, "totalMB": 4096.0, "usedPercent": 6.0}),
    ));
    assert_eq!(dash.host().unwrap().cpu_percent, 20.0);
    assert_eq!(dash.total_system_mb(), 4096.0);
}

#[test]
fn only_pinned_services_are_buffered() {
    let mut dash = Dashboard::new(Tunables::default());
    dash.replace_watchlist(watched(&["a", "b"]));
    dash.pin("a");
    for _ in 0..3 {
        dash.apply_frame(&frame(
            "service_status",
            json!({"serviceName": "a", "cpuPercent": 5.0, "memoryMB": 1638.4}),
        ));
        dash.apply_frame(&frame(
            "service_status",
            json!({"serviceName": "b", "cpuPercent": 5.0, "memoryMB": 1.0}),
        ));
    }
    // one seed point plus three streamed
    assert_eq!(dash.series("a").unwrap().len(), 4);
    assert!(dash.series("b").is_none());
    assert_eq!(dash.series_store().len(), 1);
    assert!(!dash.series_store().contains("b"));
    // fallback total is used until the host reports one
    let (_, cpu, mem) = dash.series("a").unwrap().latest().unwrap();
    assert_eq!(cpu, 5.0);
    assert!((mem - 10.0).abs() < 1e-9);
}

#[test]
fn pinned_service_outside_watchlist_still_charts() {
    let mut dash = Dashboard::new(Tunables::default());
    dash.pin("ghost");
    dash.apply_frame(&frame(
        "service_status",
        json!({"serviceName": "ghost", "cpuPercent": 1.0}),
    ));
    assert_eq!(dash.series("ghost").unwrap().len(), 2);
    assert!(dash.watchlist().is_empty());
}

#[test]
fn pin_seeds_only_an_empty_series() {
    let mut dash = Dashboard::new(Tunables::default());
    dash.replace_watchlist(watched(&["a"]));
    assert!(dash.pin("a"));
    assert_eq!(dash.series("a").unwrap().len(), 1);
    assert!(!dash.toggle_pin("a"));
    assert!(dash.toggle_pin("a"));
    assert_eq!(dash.series("a").unwrap().len(), 1);
    assert!(!dash.pin("a"));
}

#[test]
fn removed_entry_keeps_its_series() {
    let mut dash = Dashboard::new(Tunables::default());
    dash.replace_watchlist(watched(&["a"]));
    dash.pin("a");
    dash.replace_watchlist(vec![]);
    dash.apply_frame(&frame(
        "service_status",
        json!({"serviceName": "a", "state": "stopped"}),
    ));
    assert_eq!(dash.series("a").unwrap().len(), 2);
    assert_eq!(dash.watchlist().num_stopped(), 0);
}

#[test]
fn alerts_are_kept_newest_first_and_bounded() {
    let mut dash = Dashboard::new(Tunables::default());
    for i in 0..(ALERT_LOG_CAP + 5) {
        dash.apply_frame(&frame(
            "service_restart_failed",
            json!({"service_name": format!("svc-{i}"), "fail_count": 1}),
        ));
    }
    dash.apply_frame(&frame("watcher_started", json!({})));
    let alerts: Vec<_> = dash.alerts().collect();
    assert_eq!(alerts.len(), ALERT_LOG_CAP);
    assert_eq!(
        alerts[0].payload.service_name,
        format!("svc-{}", ALERT_LOG_CAP + 4)
    );
}

#[tokio::test]
async fn reconciler_applies_signals_from_a_subscription() {
    let (tx, rx) = mpsc::channel(8);
    let http = svcwatch::api::build_http_client(None).unwrap();
    let url = url::Url::parse("http://127.0.0.1:9/v1/events").unwrap();
    let mut rec = Reconciler::new(http, url, std::time::Duration::from_secs(1));
    let mut dash = Dashboard::new(Tunables::default());
    dash.replace_watchlist(watched(&["a"]));

    rec.attach(Subscription::from_channel(rx));
    assert_eq!(rec.state(), ConnectionState::Connecting);
    assert_eq!(rec.url().path(), "/v1/events");

    tx.send(StreamSignal::Opened).await.unwrap();
    tx.send(StreamSignal::Frame(frame(
        "service_status",
        json!({"serviceName": "a", "state": "stopped", "uptimeSeconds": 9}),
    )))
    .await
    .unwrap();
    tx.send(StreamSignal::Error("reset by peer".into())).await.unwrap();
    tx.send(StreamSignal::Opened).await.unwrap();
    tx.send(StreamSignal::Error("reset again".into())).await.unwrap();
    drop(tx);

    let mut reopened = Vec::new();
    while let Some(signal) = rec.next_signal().await {
        reopened.push(rec.handle(signal, &mut dash));
    }
    // only the second open asks for a resync
    assert_eq!(reopened, vec![false, false, false, true, false]);
    assert_eq!(rec.state(), ConnectionState::Connecting);
    rec.handle_end();
    assert_eq!(rec.state(), ConnectionState::Disconnected);

    let item = dash.watchlist().get("a").unwrap();
    assert_eq!(item.state(), Some(&ServiceState::Stopped));
    assert_eq!(item.service.as_ref().unwrap().uptime_seconds, 9);
}

#[test]
fn channel_subscription_needs_no_runtime() {
    let (tx, rx) = mpsc::channel(2);
    let mut sub = Subscription::from_channel(rx);
    tx.try_send(StreamSignal::Opened).unwrap();
    assert_eq!(
        futures::executor::block_on(sub.next()),
        Some(StreamSignal::Opened)
    );
    drop(sub);
    assert!(tx.try_send(StreamSignal::Opened).is_err());
}

#[tokio::test]
async fn subscription_is_a_stream_and_close_releases_it() {
    let (tx, rx) = mpsc::channel(4);
    let mut sub = Subscription::from_channel(rx);
    tx.send(StreamSignal::Opened).await.unwrap();
    assert_eq!(sub.next().await, Some(StreamSignal::Opened));
    sub.close();
    assert!(tx.send(StreamSignal::Opened).await.is_err());
}
