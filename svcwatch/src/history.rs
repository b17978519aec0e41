//! Bounded per-service history buffers for charts.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;

use crate::types::ServiceStatus;

pub const DEFAULT_MAX_POINTS: usize = 600;

// Pushes one value and trims the front so at most `cap` remain
pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    dq.push_back(v);
    let over = dq.len().saturating_sub(cap);
    if over > 0 {
        dq.drain(..over);
    }
}

/// Memory as percent of the host total; 0 when the total is unknown or zero.
/// Not clamped: a transient spike above 100 is reported as-is.
pub fn mem_percent(memory_mb: f64, total_system_mb: f64) -> f64 {
    if total_system_mb > 0.0 {
        memory_mb / total_system_mb * 100.0
    } else {
        0.0
    }
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Parallel timestamp/cpu/mem columns for one service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    t: VecDeque<f64>,
    cpu: VecDeque<f64>,
    mem: VecDeque<f64>,
    /// Legacy flag from when `mem` held raw MB; always false once sampled.
    pub mem_is_mb: bool,
}

impl Series {
    pub fn t(&self) -> &VecDeque<f64> {
        &self.t
    }

    pub fn cpu(&self) -> &VecDeque<f64> {
        &self.cpu
    }

    pub fn mem(&self) -> &VecDeque<f64> {
        &self.mem
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Most recent (t, cpu, mem) sample.
    pub fn latest(&self) -> Option<(f64, f64, f64)> {
        Some((*self.t.back()?, *self.cpu.back()?, *self.mem.back()?))
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.t
            .iter()
            .zip(self.cpu.iter())
            .zip(self.mem.iter())
            .map(|((t, c), m)| (*t, *c, *m))
    }

    // All three columns grow and shrink together, never independently
    fn push(&mut self, t: f64, cpu: f64, mem: f64, cap: usize) {
        self.mem_is_mb = false;
        push_capped(&mut self.t, t, cap);
        push_capped(&mut self.cpu, cpu, cap);
        push_capped(&mut self.mem, mem, cap);
    }
}

/// All chart series, keyed by service name, sharing one capacity.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    series: HashMap<String, Series>,
    max_points: usize,
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}

impl SeriesStore {
    pub fn new(max_points: usize) -> Self {
        Self {
            series: HashMap::new(),
            max_points: max_points.max(1),
        }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn ensure(&mut self, name: &str) -> &mut Series {
        self.series.entry(name.to_string()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&Series> {
        self.series.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Append one sample. `timestamp_ms` falls back to now when missing or
    /// not finite; missing cpu/memory count as 0.
    pub fn append(
        &mut self,
        name: &str,
        timestamp_ms: Option<f64>,
        cpu_percent: Option<f64>,
        memory_mb: Option<f64>,
        total_system_mb: f64,
    ) {
        let t = match timestamp_ms {
            Some(ms) if ms.is_finite() => ms / 1000.0,
            _ => now_secs(),
        };
        let cpu = cpu_percent.unwrap_or(0.0);
        let mem = mem_percent(memory_mb.unwrap_or(0.0), total_system_mb);
        let cap = self.max_points;
        self.ensure(name).push(t, cpu, mem, cap);
    }

    /// Give a freshly pinned series one point from the last known snapshot.
    pub fn seed(&mut self, name: &str, snapshot: Option<&ServiceStatus>, total_system_mb: f64) {
        self.append(
            name,
            None,
            snapshot.map(|s| s.cpu_percent),
            snapshot.map(|s| s.memory_mb),
            total_system_mb,
        );
    }
}
