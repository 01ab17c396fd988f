use prometheus::{Encoder, GaugeVec, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use super::MetricsSnapshot;
use crate::error::ScribeError;

fn prom_err(e: prometheus::Error) -> ScribeError {
    ScribeError::Internal(format!("prometheus: {e}"))
}

/// Renders a snapshot in the Prometheus text exposition format.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> Result<String, ScribeError> {
    let registry = Registry::new();

    let requests = IntCounter::new("scribe_http_requests_total", "Total HTTP requests")
        .map_err(prom_err)?;
    requests.inc_by(snapshot.total_requests);
    registry.register(Box::new(requests)).map_err(prom_err)?;

    let active = IntGauge::new("scribe_http_requests_active", "HTTP requests in flight")
        .map_err(prom_err)?;
    active.set(i64::try_from(snapshot.active_requests).unwrap_or(i64::MAX));
    registry.register(Box::new(active)).map_err(prom_err)?;

    let errors = IntCounter::new(
        "scribe_http_errors_total",
        "HTTP responses with status >= 400",
    )
    .map_err(prom_err)?;
    errors.inc_by(snapshot.total_errors);
    registry.register(Box::new(errors)).map_err(prom_err)?;

    let uptime = IntGauge::new("scribe_uptime_seconds", "Seconds since process start")
        .map_err(prom_err)?;
    uptime.set(i64::try_from(snapshot.uptime_seconds).unwrap_or(i64::MAX));
    registry.register(Box::new(uptime)).map_err(prom_err)?;

    let clients = IntGauge::new("scribe_sse_clients", "Connected event stream clients")
        .map_err(prom_err)?;
    clients.set(i64::try_from(snapshot.sse_clients).unwrap_or(i64::MAX));
    registry.register(Box::new(clients)).map_err(prom_err)?;

    let dropped = IntCounter::new(
        "scribe_sse_dropped_events_total",
        "Events dropped because a client buffer was full",
    )
    .map_err(prom_err)?;
    dropped.inc_by(snapshot.dropped_events);
    registry.register(Box::new(dropped)).map_err(prom_err)?;

    let latency = GaugeVec::new(
        Opts::new(
            "scribe_http_request_duration_ms",
            "Recent request latency by path and quantile",
        ),
        &["path", "quantile"],
    )
    .map_err(prom_err)?;
    for path in &snapshot.latency {
        for (quantile, value) in [
            ("0.5", path.p50_ms),
            ("0.95", path.p95_ms),
            ("0.99", path.p99_ms),
            ("1", path.max_ms),
        ] {
            latency
                .with_label_values(&[path.path.as_str(), quantile])
                .set(value);
        }
    }
    registry.register(Box::new(latency)).map_err(prom_err)?;

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(prom_err)?;
    String::from_utf8(buffer).map_err(|e| ScribeError::Internal(format!("prometheus: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;
    use std::time::Duration;

    #[test]
    fn test_render_contains_counters() {
        let metrics = MetricsCollector::new();
        let _guard = metrics.begin_request();
        metrics.record_response("/api/logs", 500, Duration::from_millis(12));

        let text = render_prometheus(&metrics.snapshot(2, 0)).unwrap();
        assert!(text.contains("scribe_http_requests_total 1"));
        assert!(text.contains("scribe_http_requests_active 1"));
        assert!(text.contains("scribe_http_errors_total 1"));
        assert!(text.contains("scribe_sse_clients 2"));
        assert!(text.contains(r#"scribe_http_request_duration_ms{path="/api/logs",quantile="0.5"} 12"#));
    }
}
