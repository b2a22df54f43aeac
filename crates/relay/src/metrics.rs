use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc, Mutex, OnceLock,
    },
};

/// In-process relay counters. Installed once at startup; the free
/// functions below are no-ops until then so library code never has to
/// thread a metrics handle around.
#[derive(Debug, Default)]
pub(crate) struct RelayMetrics {
    events_total: Mutex<HashMap<String, u64>>,
    deliveries_total: AtomicU64,
    dropped_frames_total: AtomicU64,
    sessions_ended_total: AtomicU64,
    open_connections: AtomicI64,
}

static GLOBAL_METRICS: OnceLock<Arc<RelayMetrics>> = OnceLock::new();

pub(crate) fn set_global_metrics(metrics: Arc<RelayMetrics>) {
    let _ = GLOBAL_METRICS.set(metrics);
}

fn global_metrics() -> Option<&'static Arc<RelayMetrics>> {
    GLOBAL_METRICS.get()
}

pub(crate) fn record_event(kind: &str) {
    if let Some(metrics) = global_metrics() {
        metrics.record_event(kind);
    }
}

pub(crate) fn record_deliveries(count: usize) {
    if let Some(metrics) = global_metrics() {
        metrics.record_deliveries(count);
    }
}

pub(crate) fn record_dropped_frame() {
    if let Some(metrics) = global_metrics() {
        metrics.record_dropped_frame();
    }
}

pub(crate) fn record_session_end() {
    if let Some(metrics) = global_metrics() {
        metrics.record_session_end();
    }
}

pub(crate) fn connection_opened() {
    if let Some(metrics) = global_metrics() {
        metrics.connection_opened();
    }
}

pub(crate) fn connection_closed() {
    if let Some(metrics) = global_metrics() {
        metrics.connection_closed();
    }
}

impl RelayMetrics {
    pub(crate) fn record_event(&self, kind: &str) {
        let mut guard = self.events_total.lock().expect("events lock should not be poisoned");
        *guard.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn record_deliveries(&self, count: usize) {
        self.deliveries_total.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_frame(&self) {
        self.dropped_frames_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_end(&self) {
        self.sessions_ended_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_opened(&self) {
        self.open_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.open_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn events_for_kind(&self, kind: &str) -> u64 {
        let guard = self.events_total.lock().expect("events lock should not be poisoned");
        guard.get(kind).copied().unwrap_or(0)
    }

    pub(crate) fn deliveries_total(&self) -> u64 {
        self.deliveries_total.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped_frames_total(&self) -> u64 {
        self.dropped_frames_total.load(Ordering::Relaxed)
    }

    pub(crate) fn sessions_ended_total(&self) -> u64 {
        self.sessions_ended_total.load(Ordering::Relaxed)
    }

    pub(crate) fn open_connections(&self) -> i64 {
        self.open_connections.load(Ordering::Relaxed)
    }
}
