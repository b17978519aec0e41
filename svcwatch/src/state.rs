//! Dashboard context: everything the UI renders, owned in one place and
//! mutated only from the app's event loop.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::config::Tunables;
use crate::events::StreamEvent;
use crate::history::{Series, SeriesStore};
use crate::pins::PinSet;
use crate::sse::SseFrame;
use crate::types::{HostResources, ServiceAlert, StatusUpdate, WatchlistItem};
use crate::watchlist::Watchlist;

pub const ALERT_LOG_CAP: usize = 50;

#[derive(Debug)]
pub struct Dashboard {
    tunables: Tunables,
    watchlist: Watchlist,
    pins: PinSet,
    series: SeriesStore,
    host: Option<HostResources>,
    // newest first
    alerts: VecDeque<ServiceAlert>,
    failed_recent: Option<u64>,
}

impl Dashboard {
    pub fn new(tunables: Tunables) -> Self {
        Self {
            series: SeriesStore::new(tunables.max_points),
            tunables,
            watchlist: Watchlist::new(),
            pins: PinSet::new(),
            host: None,
            alerts: VecDeque::with_capacity(ALERT_LOG_CAP),
            failed_recent: None,
        }
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    pub fn pins(&self) -> &PinSet {
        &self.pins
    }

    pub fn series(&self, name: &str) -> Option<&Series> {
        self.series.get(name)
    }

    pub fn series_store(&self) -> &SeriesStore {
        &self.series
    }

    pub fn host(&self) -> Option<&HostResources> {
        self.host.as_ref()
    }

    pub fn alerts(&self) -> impl Iterator<Item = &ServiceAlert> {
        self.alerts.iter()
    }

    pub fn failed_recent(&self) -> Option<u64> {
        self.failed_recent
    }

    pub fn set_failed_recent(&mut self, count: u64) {
        self.failed_recent = Some(count);
    }

    /// Denominator for memory percentages: live host total, else the
    /// configured fallback.
    pub fn total_system_mb(&self) -> f64 {
        self.host
            .as_ref()
            .and_then(HostResources::known_total_mb)
            .unwrap_or(self.tunables.fallback_total_mb)
    }

    pub fn replace_watchlist(&mut self, items: Vec<WatchlistItem>) {
        self.watchlist.replace_all(items);
    }

    pub fn apply_watchlist_snapshot(&mut self, generation: u64, items: Vec<WatchlistItem>) -> bool {
        self.watchlist.replace_if_newer(generation, items)
    }

    pub fn is_pinned(&self, name: &str) -> bool {
        self.pins.is_pinned(name)
    }

    /// Pin a service. A series that has never held data gets one point from
    /// the current watchlist snapshot so the chart is not blank.
    pub fn pin(&mut self, name: &str) -> bool {
        let added = self.pins.pin(name, &mut self.series);
        if added && self.series.get(name).is_some_and(Series::is_empty) {
            let total = self.total_system_mb();
            let snapshot = self.watchlist.get(name).and_then(|i| i.service.as_ref());
            self.series.seed(name, snapshot, total);
        }
        added
    }

    pub fn unpin(&mut self, name: &str) -> bool {
        self.pins.unpin(name)
    }

    pub fn toggle_pin(&mut self, name: &str) -> bool {
        if self.pins.is_pinned(name) {
            self.unpin(name);
            false
        } else {
            self.pin(name);
            true
        }
    }

    /// Decode one frame and apply it. Bad payloads are logged and dropped.
    pub fn apply_frame(&mut self, frame: &SseFrame) {
        match StreamEvent::from_frame(frame) {
            Ok(ev) => self.apply(ev),
            Err(e) => warn!("dropping stream event: {e}"),
        }
    }

    pub fn apply(&mut self, ev: StreamEvent) {
        match ev {
            StreamEvent::HostResources(h) => {
                debug!(cpu = h.cpu_percent, used = h.used_percent, "host resources");
                self.host = Some(h);
            }
            StreamEvent::ServiceStatus(u) => self.apply_status(&u),
            StreamEvent::Alert(a) => {
                info!(
                    service = %a.payload.service_name,
                    kind = a.kind.event_name(),
                    "service alert"
                );
                self.alerts.push_front(a);
                self.alerts.truncate(ALERT_LOG_CAP);
            }
            StreamEvent::Ignored(name) => debug!(event = %name, "ignoring stream event"),
        }
    }

    fn apply_status(&mut self, u: &StatusUpdate) {
        if !self.watchlist.apply_streamed_status(u) {
            debug!(service = %u.service_name, "status for unwatched service");
        }
        if self.pins.is_pinned(&u.service_name) {
            let total = self.total_system_mb();
            self.series
                .append(&u.service_name, None, u.cpu_percent, u.memory_mb, total);
        }
    }
}
