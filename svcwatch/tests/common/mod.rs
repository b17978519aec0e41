//! In-process fake of the service-watch server: REST endpoints backed by
//! shared state plus an SSE feed tests can publish into.
#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures::Stream;
use serde_json::{json, Value};
use tokio::sync::broadcast;

pub struct FakeState {
    pub items: Mutex<Vec<Value>>,
    pub last_metrics_query: Mutex<Option<String>>,
    pub metrics_as_list: AtomicBool,
    pub fail_watchlist: AtomicBool,
    pub watchlist_fetches: AtomicUsize,
    // when set, each event stream ends right after it opens
    pub end_streams: AtomicBool,
    pub events: broadcast::Sender<(String, String)>,
    pub stream_connections: AtomicUsize,
}

pub struct FakeServer {
    pub addr: SocketAddr,
    pub state: Arc<FakeState>,
}

pub fn watch_item(name: &str, state: &str, cpu: f64, mem: f64) -> Value {
    json!({
        "serviceName": name,
        "autoRestart": false,
        "restartCount": 0,
        "service": {
            "name": name,
            "state": state,
            "cpuPercent": cpu,
            "memoryMB": mem,
            "uptimeSeconds": 60,
            "pid": 1234
        }
    })
}

impl FakeServer {
    pub async fn spawn(items: Vec<Value>) -> Self {
        let (events, _) = broadcast::channel(64);
        let state = Arc::new(FakeState {
            items: Mutex::new(items),
            last_metrics_query: Mutex::new(None),
            metrics_as_list: AtomicBool::new(false),
            fail_watchlist: AtomicBool::new(false),
            watchlist_fetches: AtomicUsize::new(0),
            end_streams: AtomicBool::new(false),
            events,
            stream_connections: AtomicUsize::new(0),
        });
        let app = Router::new()
            .route("/v1/watchlist", get(list).post(add))
            .route("/v1/watchlist/:name", put(update).delete(remove))
            .route("/v1/services/:name/:action", post(control))
            .route("/v1/metrics", get(metrics))
            .route("/v1/events", get(events_stream))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/v1/", self.addr)
    }

    pub fn publish(&self, event: &str, data: Value) {
        let _ = self.state.events.send((event.to_string(), data.to_string()));
    }

    pub fn publish_raw(&self, event: &str, data: &str) {
        let _ = self.state.events.send((event.to_string(), data.to_string()));
    }

    pub fn connections(&self) -> usize {
        self.state.stream_connections.load(Ordering::SeqCst)
    }

    pub fn watchlist_fetches(&self) -> usize {
        self.state.watchlist_fetches.load(Ordering::SeqCst)
    }

    pub fn item_names(&self) -> Vec<String> {
        self.state
            .items
            .lock()
            .unwrap()
            .iter()
            .filter_map(|i| i["serviceName"].as_str().map(str::to_string))
            .collect()
    }
}

/// Poll `cond` until it holds or the deadline passes.
pub async fn eventually<F: FnMut() -> bool>(mut cond: F) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

async fn list(State(st): State<Arc<FakeState>>) -> Response {
    st.watchlist_fetches.fetch_add(1, Ordering::SeqCst);
    if st.fail_watchlist.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "storage offline").into_response();
    }
    let items = st.items.lock().unwrap().clone();
    Json(json!({ "items": items })).into_response()
}

async fn add(State(st): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    let Some(name) = body["serviceName"].as_str().filter(|n| !n.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "serviceName is required").into_response();
    };
    st.items
        .lock()
        .unwrap()
        .push(watch_item(name, "running", 0.0, 0.0));
    (StatusCode::CREATED, Json(json!({ "added": true }))).into_response()
}

async fn update(
    State(st): State<Arc<FakeState>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut items = st.items.lock().unwrap();
    match items.iter_mut().find(|i| i["serviceName"] == name.as_str()) {
        Some(item) => {
            item["autoRestart"] = body["autoRestart"].clone();
            Json(json!({ "updated": true })).into_response()
        }
        None => (StatusCode::BAD_REQUEST, "not watched").into_response(),
    }
}

async fn remove(State(st): State<Arc<FakeState>>, Path(name): Path<String>) -> Response {
    let mut items = st.items.lock().unwrap();
    let before = items.len();
    items.retain(|i| i["serviceName"] != name.as_str());
    if items.len() == before {
        return (StatusCode::NOT_FOUND, "failed to remove from watchlist").into_response();
    }
    Json(json!({ "removed": true })).into_response()
}

async fn control(
    State(st): State<Arc<FakeState>>,
    Path((name, action)): Path<(String, String)>,
) -> Response {
    let known = st
        .items
        .lock()
        .unwrap()
        .iter()
        .any(|i| i["serviceName"] == name.as_str());
    if !known || !matches!(action.as_str(), "start" | "stop" | "restart") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "service not found").into_response();
    }
    Json(json!({ "ok": true })).into_response()
}

async fn metrics(State(st): State<Arc<FakeState>>, RawQuery(q): RawQuery) -> Response {
    *st.last_metrics_query.lock().unwrap() = q;
    let items = json!([
        {"time": "2026-10-18T09:00:00Z", "level": "INFO", "event": "service_failed",
         "data": {"serviceName": "nginx"}},
        {"time": "2026-10-18T09:05:00Z", "level": "INFO", "event": "service_failed",
         "data": {"serviceName": "redis"}}
    ]);
    if st.metrics_as_list.load(Ordering::SeqCst) {
        Json(items).into_response()
    } else {
        Json(json!({ "count": 2, "items": items })).into_response()
    }
}

async fn events_stream(
    State(st): State<Arc<FakeState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    st.stream_connections.fetch_add(1, Ordering::SeqCst);
    let rx = st.events.subscribe();
    let ended = st.end_streams.load(Ordering::SeqCst);
    let stream = futures::stream::unfold((rx, ended), |(mut rx, ended)| async move {
        if ended {
            return None;
        }
        loop {
            match rx.recv().await {
                Ok((name, data)) => {
                    let ev = Event::default().event(name).data(data);
                    return Some((Ok::<Event, Infallible>(ev), (rx, ended)));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream)
}
