//! Typed push-stream events, decoded strictly from named SSE frames.

use thiserror::Error;

use crate::sse::SseFrame;
use crate::types::{AlertKind, AlertPayload, HostResources, ServiceAlert, StatusUpdate};

pub const HOST_RESOURCES: &str = "host_resources";
pub const SERVICE_STATUS: &str = "service_status";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    HostResources(HostResources),
    ServiceStatus(StatusUpdate),
    Alert(ServiceAlert),
    /// Named event this client does not act on.
    Ignored(String),
}

#[derive(Debug, Error)]
#[error("malformed {event} payload: {source}")]
pub struct DecodeError {
    pub event: String,
    #[source]
    pub source: serde_json::Error,
}

impl StreamEvent {
    pub fn decode(event: &str, data: &str) -> Result<Self, DecodeError> {
        let wrap = |source| DecodeError {
            event: event.to_string(),
            source,
        };
        let ev = match event {
            HOST_RESOURCES => {
                StreamEvent::HostResources(serde_json::from_str(data).map_err(wrap)?)
            }
            SERVICE_STATUS => {
                StreamEvent::ServiceStatus(serde_json::from_str(data).map_err(wrap)?)
            }
            other => match AlertKind::from_event(other) {
                Some(kind) => {
                    let payload: AlertPayload = serde_json::from_str(data).map_err(wrap)?;
                    StreamEvent::Alert(ServiceAlert { kind, payload })
                }
                None => StreamEvent::Ignored(other.to_string()),
            },
        };
        Ok(ev)
    }

    pub fn from_frame(frame: &SseFrame) -> Result<Self, DecodeError> {
        Self::decode(&frame.event, &frame.data)
    }

    pub fn name(&self) -> &str {
        match self {
            StreamEvent::HostResources(_) => HOST_RESOURCES,
            StreamEvent::ServiceStatus(_) => SERVICE_STATUS,
            StreamEvent::Alert(a) => a.kind.event_name(),
            StreamEvent::Ignored(name) => name,
        }
    }
}
