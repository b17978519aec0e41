//! Types that mirror the server's JSON schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceState {
    Running,
    Stopped,
    // starting|stopping|unknown and anything newer servers report
    Other(String),
    #[default]
    Unknown,
}

impl From<String> for ServiceState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "running" => ServiceState::Running,
            "stopped" => ServiceState::Stopped,
            "" | "unknown" => ServiceState::Unknown,
            _ => ServiceState::Other(s),
        }
    }
}

impl From<ServiceState> for String {
    fn from(s: ServiceState) -> Self {
        s.as_str().to_string()
    }
}

impl ServiceState {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
            ServiceState::Other(s) => s,
            ServiceState::Unknown => "unknown",
        }
    }
}

/// Live status of one service as reported by the server. Every field is
/// optional on the wire (`omitempty`), so everything defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceStatus {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub state: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_type: Option<String>,
    pub can_stop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub cpu_percent: f64,
    #[serde(rename = "memoryMB")]
    pub memory_mb: f64,
    pub uptime_seconds: u64,
}

impl ServiceStatus {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// One watched service. `service` is absent when the server could not look
/// the service up.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistItem {
    pub service_name: String,
    #[serde(default)]
    pub auto_restart: bool,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub fail_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_restart: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceStatus>,
}

impl WatchlistItem {
    pub fn state(&self) -> Option<&ServiceState> {
        self.service.as_ref().map(|s| &s.state)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchlistResponse {
    #[serde(default)]
    pub items: Option<Vec<WatchlistItem>>,
}

/// Aggregate host CPU/memory, replaced wholesale on every `host_resources` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostResources {
    pub cpu_percent: f64,
    #[serde(rename = "memoryMB", default)]
    pub memory_mb: Option<f64>,
    #[serde(rename = "totalMB", default)]
    pub total_mb: Option<f64>,
    pub used_percent: f64,
}

impl HostResources {
    // Usable denominator for percent-of-total conversion, if the host reported one
    pub fn known_total_mb(&self) -> Option<f64> {
        self.total_mb.filter(|t| t.is_finite() && *t > 0.0)
    }
}

/// Partial status delta carried by a `service_status` event. Only fields
/// present in the payload are `Some`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "RawStatusUpdate")]
pub struct StatusUpdate {
    pub service_name: String,
    pub state: Option<ServiceState>,
    pub cpu_percent: Option<f64>,
    pub memory_mb: Option<f64>,
    pub uptime_seconds: Option<u64>,
    pub pid: Option<u32>,
}

// Producers disagree on the uptime field name; both spellings are accepted
// and `uptimeSeconds` wins when a payload carries both.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatusUpdate {
    service_name: String,
    #[serde(default)]
    state: Option<ServiceState>,
    #[serde(default)]
    cpu_percent: Option<f64>,
    #[serde(rename = "memoryMB", default)]
    memory_mb: Option<f64>,
    #[serde(default)]
    uptime_seconds: Option<u64>,
    #[serde(rename = "uptimeSec", default)]
    uptime_sec: Option<u64>,
    #[serde(default)]
    pid: Option<u32>,
}

impl From<RawStatusUpdate> for StatusUpdate {
    fn from(raw: RawStatusUpdate) -> Self {
        Self {
            service_name: raw.service_name,
            state: raw.state,
            cpu_percent: raw.cpu_percent,
            memory_mb: raw.memory_mb,
            uptime_seconds: raw.uptime_seconds.or(raw.uptime_sec),
            pid: raw.pid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Failed,
    Restarting,
    RestartFailed,
    RestartSucceeded,
}

impl AlertKind {
    pub fn from_event(name: &str) -> Option<Self> {
        match name {
            "service_failed" => Some(AlertKind::Failed),
            "service_restarting" => Some(AlertKind::Restarting),
            "service_restart_failed" => Some(AlertKind::RestartFailed),
            "service_restart_success" => Some(AlertKind::RestartSucceeded),
            _ => None,
        }
    }

    pub fn event_name(self) -> &'static str {
        match self {
            AlertKind::Failed => "service_failed",
            AlertKind::Restarting => "service_restarting",
            AlertKind::RestartFailed => "service_restart_failed",
            AlertKind::RestartSucceeded => "service_restart_success",
        }
    }
}

/// Watcher notification about an automatic restart attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAlert {
    pub kind: AlertKind,
    pub payload: AlertPayload,
}

// The watcher emits these with snake_case keys, unlike status events.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AlertPayload {
    pub service_name: String,
    #[serde(default)]
    pub fail_count: Option<u32>,
    #[serde(default)]
    pub restart_count: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One record from the server's event log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsEntry {
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl MetricsEntry {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let t = self.time.as_deref()?;
        DateTime::parse_from_rfc3339(t)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn service_name(&self) -> Option<&str> {
        self.data.get("serviceName").and_then(|v| v.as_str())
    }
}

// The metrics endpoint has answered with both shapes over time.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MetricsResponse {
    Page {
        #[serde(default)]
        count: u64,
        #[serde(default)]
        items: Option<Vec<MetricsEntry>>,
    },
    List(Vec<MetricsEntry>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsPage {
    pub count: u64,
    pub items: Vec<MetricsEntry>,
}

impl From<MetricsResponse> for MetricsPage {
    fn from(r: MetricsResponse) -> Self {
        match r {
            MetricsResponse::Page { count, items } => MetricsPage {
                count,
                items: items.unwrap_or_default(),
            },
            MetricsResponse::List(items) => MetricsPage {
                count: items.len() as u64,
                items,
            },
        }
    }
}

/// Filters for the metrics endpoint. Empty values are left out of the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl MetricsQuery {
    pub fn event(mut self, event: &str) -> Self {
        self.event = non_empty(event);
        self
    }

    pub fn service(mut self, service: &str) -> Self {
        self.service = non_empty(service);
        self
    }

    pub fn since(mut self, since: &str) -> Self {
        self.since = non_empty(since);
        self
    }

    pub fn level(mut self, level: &str) -> Self {
        self.level = non_empty(level);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    // Drops fields that were set to empty values directly
    pub fn normalized(&self) -> Self {
        let keep = |v: &Option<String>| v.as_deref().and_then(non_empty);
        Self {
            event: keep(&self.event),
            service: keep(&self.service),
            limit: self.limit.filter(|l| *l > 0),
            since: keep(&self.since),
            level: keep(&self.level),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }
}
