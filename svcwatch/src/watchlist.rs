//! Client-side projection of the server's watchlist.

use tracing::debug;

use crate::types::{ServiceState, StatusUpdate, WatchlistItem};

#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    items: Vec<WatchlistItem>,
    // Generation of the newest snapshot applied through `replace_if_newer`
    applied_generation: u64,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[WatchlistItem] {
        &self.items
    }

    pub fn get(&self, name: &str) -> Option<&WatchlistItem> {
        self.items.iter().find(|i| i.service_name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace everything with a freshly fetched list.
    pub fn replace_all(&mut self, items: Vec<WatchlistItem>) {
        self.items = items;
    }

    /// Apply a snapshot only if it was requested after the last applied one.
    /// Responses to superseded requests are dropped.
    pub fn replace_if_newer(&mut self, generation: u64, items: Vec<WatchlistItem>) -> bool {
        if generation <= self.applied_generation {
            debug!(
                generation,
                applied = self.applied_generation,
                "discarding stale watchlist snapshot"
            );
            return false;
        }
        self.applied_generation = generation;
        self.replace_all(items);
        true
    }

    pub fn applied_generation(&self) -> u64 {
        self.applied_generation
    }

    /// Overwrite the live fields present in `update` on the matching entry.
    /// Updates for services that are not watched, or whose entry carries no
    /// status (the server could not look the service up), are ignored;
    /// returns whether an entry was touched.
    pub fn apply_streamed_status(&mut self, update: &StatusUpdate) -> bool {
        let Some(svc) = self
            .items
            .iter_mut()
            .find(|i| i.service_name == update.service_name)
            .and_then(|i| i.service.as_mut())
        else {
            return false;
        };
        if let Some(state) = &update.state {
            svc.state = state.clone();
        }
        if let Some(cpu) = update.cpu_percent {
            svc.cpu_percent = cpu;
        }
        if let Some(mem) = update.memory_mb {
            svc.memory_mb = mem;
        }
        if let Some(up) = update.uptime_seconds {
            svc.uptime_seconds = up;
        }
        if let Some(pid) = update.pid {
            svc.pid = Some(pid);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn num_running(&self) -> usize {
        self.count_in(&ServiceState::Running)
    }

    pub fn num_stopped(&self) -> usize {
        self.count_in(&ServiceState::Stopped)
    }

    fn count_in(&self, state: &ServiceState) -> usize {
        self.items
            .iter()
            .filter(|i| i.state() == Some(state))
            .count()
    }
}
