//! # Estadísticas del Servidor
//! src/metrics/collector.rs
//!
//! Contadores de conexiones y respuestas, latencia de procesamiento
//! (parse + armado de respuesta) y el máximo solapamiento de tareas
//! observado sobre una misma conexión.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Latencias guardadas para calcular percentiles
const MAX_LATENCIES: usize = 10_000;

/// Estadísticas thread-safe, baratas de clonar
#[derive(Clone)]
pub struct ServerStats {
    inner: Arc<Mutex<StatsData>>,
    start_time: Instant,
}

#[derive(Default)]
struct StatsData {
    accepted: u64,
    rejected: u64,
    closed: u64,
    evicted: u64,
    live_users: u64,
    peak_users: u64,
    status_codes: BTreeMap<u16, u64>,
    latencies: Vec<u64>,
    max_task_overlap: usize,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatsData {
                latencies: Vec::with_capacity(1024),
                ..StatsData::default()
            })),
            start_time: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsData> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Conexión aceptada y registrada
    pub fn record_accept(&self) {
        let mut data = self.lock();
        data.accepted += 1;
        data.live_users += 1;
        data.peak_users = data.peak_users.max(data.live_users);
    }

    /// Conexión rechazada con "Server Busy!"
    pub fn record_reject(&self) {
        self.lock().rejected += 1;
    }

    /// Conexión cerrada (por cualquier motivo)
    pub fn record_close(&self) {
        let mut data = self.lock();
        data.closed += 1;
        data.live_users = data.live_users.saturating_sub(1);
    }

    /// Conexión expulsada por inactividad
    pub fn record_eviction(&self) {
        self.lock().evicted += 1;
    }

    /// Respuesta armada con `code`, tras `latency` de procesamiento
    pub fn record_response(&self, code: u16, latency: Duration) {
        let mut data = self.lock();
        *data.status_codes.entry(code).or_insert(0) += 1;

        if data.latencies.len() >= MAX_LATENCIES {
            data.latencies.remove(0);
        }
        data.latencies.push(latency.as_micros() as u64);
    }

    /// Registra cuántas tareas corrían a la vez sobre una conexión
    pub fn record_task_overlap(&self, concurrent: usize) {
        let mut data = self.lock();
        data.max_task_overlap = data.max_task_overlap.max(concurrent);
    }

    pub fn live_users(&self) -> u64 {
        self.lock().live_users
    }

    pub fn max_task_overlap(&self) -> usize {
        self.lock().max_task_overlap
    }

    /// Copia consistente de todas las estadísticas
    pub fn snapshot(&self) -> StatsSnapshot {
        let data = self.lock();
        let (p50, p95, p99, avg) = calculate_percentiles(&data.latencies);

        StatsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            accepted: data.accepted,
            rejected: data.rejected,
            closed: data.closed,
            evicted: data.evicted,
            live_users: data.live_users,
            peak_users: data.peak_users,
            responses: data.status_codes.values().sum(),
            status_codes: data.status_codes.clone(),
            latency_p50_us: p50,
            latency_p95_us: p95,
            latency_p99_us: p99,
            latency_avg_us: avg,
            max_task_overlap: data.max_task_overlap,
        }
    }

    /// Snapshot serializado como JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.snapshot())
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Calcula p50, p95, p99 y promedio
fn calculate_percentiles(latencies: &[u64]) -> (u64, u64, u64, u64) {
    if latencies.is_empty() {
        return (0, 0, 0, 0);
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    let len = sorted.len();
    let p50 = sorted[len * 50 / 100];
    let p95 = sorted[len * 95 / 100];
    let p99 = sorted[len * 99 / 100];

    let sum: u64 = sorted.iter().sum();
    let avg = sum / len as u64;

    (p50, p95, p99, avg)
}

/// Snapshot de estadísticas (para logs y tests)
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub closed: u64,
    pub evicted: u64,
    pub live_users: u64,
    pub peak_users: u64,
    pub responses: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
    pub latency_avg_us: u64,
    pub max_task_overlap: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let stats = ServerStats::new();
        stats.record_accept();
        stats.record_accept();
        stats.record_reject();
        stats.record_close();
        stats.record_eviction();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.closed, 1);
        assert_eq!(snapshot.evicted, 1);
        assert_eq!(snapshot.live_users, 1);
        assert_eq!(snapshot.peak_users, 2);
    }

    #[test]
    fn test_live_users_never_negative() {
        let stats = ServerStats::new();
        stats.record_close();
        assert_eq!(stats.live_users(), 0);
    }

    #[test]
    fn test_status_codes_and_latency() {
        let stats = ServerStats::new();
        for i in 1..=100 {
            stats.record_response(200, Duration::from_micros(i));
        }
        stats.record_response(404, Duration::from_micros(5));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.responses, 101);
        assert_eq!(snapshot.status_codes.get(&200), Some(&100));
        assert_eq!(snapshot.status_codes.get(&404), Some(&1));
        assert!(snapshot.latency_p95_us >= snapshot.latency_p50_us);
        assert!(snapshot.latency_p99_us >= snapshot.latency_p95_us);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let stats = ServerStats::new();
        for i in 0..(MAX_LATENCIES as u64 + 500) {
            stats.record_response(200, Duration::from_micros(i));
        }
        assert_eq!(stats.lock().latencies.len(), MAX_LATENCIES);
        assert_eq!(stats.snapshot().responses, MAX_LATENCIES as u64 + 500);
    }

    #[test]
    fn test_task_overlap_keeps_maximum() {
        let stats = ServerStats::new();
        stats.record_task_overlap(1);
        stats.record_task_overlap(1);
        assert_eq!(stats.max_task_overlap(), 1);
        stats.record_task_overlap(2);
        stats.record_task_overlap(1);
        assert_eq!(stats.max_task_overlap(), 2);
    }

    #[test]
    fn test_json_snapshot() {
        let stats = ServerStats::new();
        stats.record_accept();
        stats.record_response(200, Duration::from_millis(1));

        let json = stats.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["accepted"], 1);
        assert_eq!(value["status_codes"]["200"], 1);
        assert_eq!(value["max_task_overlap"], 0);
    }
}
