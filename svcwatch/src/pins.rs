//! Services selected for live charting.

use crate::history::SeriesStore;

/// Insertion-ordered set of pinned service names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinSet {
    pinned: Vec<String>,
}

impl PinSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pinned(&self, name: &str) -> bool {
        self.pinned.iter().any(|n| n == name)
    }

    /// Pin `name` and make sure it has a series. Returns true if it was not
    /// pinned before.
    pub fn pin(&mut self, name: &str, store: &mut SeriesStore) -> bool {
        store.ensure(name);
        if self.is_pinned(name) {
            return false;
        }
        self.pinned.push(name.to_string());
        true
    }

    /// Unpin `name`. Its buffered history stays in the store, so pinning it
    /// again shows the old samples.
    pub fn unpin(&mut self, name: &str) -> bool {
        match self.pinned.iter().position(|n| n == name) {
            Some(i) => {
                self.pinned.remove(i);
                true
            }
            None => false,
        }
    }

    /// Returns the new pinned state.
    pub fn toggle(&mut self, name: &str, store: &mut SeriesStore) -> bool {
        if self.is_pinned(name) {
            self.unpin(name);
            false
        } else {
            self.pin(name, store);
            true
        }
    }

    pub fn names(&self) -> &[String] {
        &self.pinned
    }

    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }
}
