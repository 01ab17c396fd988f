//! Request counters and rolling per-path latency history.
//!
//! Counters are lock-free atomics. Latency samples live in a concurrent map
//! keyed by route so requests on different paths do not contend.

mod prometheus_text;

pub use prometheus_text::render_prometheus;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Samples kept per path; the oldest is evicted first.
pub const LATENCY_HISTORY: usize = 100;

/// Latency key shared by every request that matched no route, so arbitrary
/// client paths cannot add map entries.
pub const UNMATCHED_PATH: &str = "<unmatched>";

#[derive(Debug)]
pub struct MetricsCollector {
    started_at: Instant,
    total_requests: AtomicU64,
    active_requests: AtomicU64,
    total_errors: AtomicU64,
    latencies: DashMap<String, VecDeque<Duration>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            active_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            latencies: DashMap::new(),
        }
    }

    /// Counts a request as started; it stays in flight until the guard drops.
    #[must_use]
    pub fn begin_request(&self) -> InFlight<'_> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        InFlight { collector: self }
    }

    /// Records the outcome of a finished request.
    pub fn record_response(&self, path: &str, status: u16, elapsed: Duration) {
        if status >= 400 {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }

        let mut samples = self.latencies.entry(path.to_owned()).or_default();
        if samples.len() == LATENCY_HISTORY {
            samples.pop_front();
        }
        samples.push_back(elapsed);
    }

    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn active_requests(&self) -> u64 {
        self.active_requests.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    #[must_use]
    pub fn sample_count(&self, path: &str) -> usize {
        self.latencies.get(path).map_or(0, |samples| samples.len())
    }

    /// Nearest-rank percentile (`0.0..=100.0`) of the retained samples.
    #[must_use]
    pub fn percentile(&self, path: &str, pct: f64) -> Option<Duration> {
        let samples = self.latencies.get(path)?;
        let mut sorted: Vec<Duration> = samples.iter().copied().collect();
        drop(samples);
        nearest_rank(&mut sorted, pct)
    }

    #[must_use]
    pub fn max_latency(&self, path: &str) -> Option<Duration> {
        self.latencies.get(path)?.iter().copied().max()
    }

    /// Point-in-time view. Hub figures are passed in by the caller.
    #[must_use]
    pub fn snapshot(&self, sse_clients: usize, dropped_events: u64) -> MetricsSnapshot {
        let total_requests = self.total_requests();
        let total_errors = self.total_errors();
        let error_rate = if total_requests == 0 {
            0.0
        } else {
            total_errors as f64 / total_requests as f64 * 100.0
        };

        let mut latency: Vec<PathLatency> = self
            .latencies
            .iter()
            .map(|entry| {
                let mut sorted: Vec<Duration> = entry.value().iter().copied().collect();
                let samples = sorted.len();
                let p50 = nearest_rank(&mut sorted, 50.0);
                let p95 = nearest_rank(&mut sorted, 95.0);
                let p99 = nearest_rank(&mut sorted, 99.0);
                PathLatency {
                    path: entry.key().clone(),
                    samples,
                    p50_ms: as_millis(p50),
                    p95_ms: as_millis(p95),
                    p99_ms: as_millis(p99),
                    max_ms: as_millis(sorted.last().copied()),
                }
            })
            .collect();
        latency.sort_by(|a, b| a.path.cmp(&b.path));

        MetricsSnapshot {
            total_requests,
            active_requests: self.active_requests(),
            total_errors,
            error_rate,
            uptime_seconds: self.uptime().as_secs(),
            sse_clients,
            dropped_events,
            latency,
        }
    }
}

fn nearest_rank(samples: &mut [Duration], pct: f64) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();
    let pct = pct.clamp(0.0, 100.0);
    let rank = (pct / 100.0 * samples.len() as f64).ceil() as usize;
    samples.get(rank.saturating_sub(1)).copied()
}

fn as_millis(value: Option<Duration>) -> f64 {
    value.map_or(0.0, |d| d.as_micros() as f64 / 1000.0)
}

/// Decrements the in-flight gauge when dropped.
#[derive(Debug)]
pub struct InFlight<'a> {
    collector: &'a MetricsCollector,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.collector.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub active_requests: u64,
    pub total_errors: u64,
    /// Percentage of requests answered with status >= 400.
    pub error_rate: f64,
    pub uptime_seconds: u64,
    pub sse_clients: usize,
    pub dropped_events: u64,
    pub latency: Vec<PathLatency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathLatency {
    pub path: String,
    pub samples: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

/// Counts every request and records its latency under the matched route
/// template, or [`UNMATCHED_PATH`] when no route matched.
pub async fn track_metrics(
    State(metrics): State<Arc<MetricsCollector>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_PATH, MatchedPath::as_str)
        .to_owned();

    let started = Instant::now();
    let _in_flight = metrics.begin_request();
    let response = next.run(request).await;
    metrics.record_response(&path, response.status().as_u16(), started.elapsed());
    response
}
