use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static GATE_DENIALS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static LOGINS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static WS_CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();
pub static HUB_EVENTS_DROPPED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

macro_rules! must {
    ($what:expr, $name:literal) => {
        match $what {
            Ok(metric) => metric,
            Err(e) => {
                tracing::error!("Failed to create {} metric: {}", $name, e);
                panic!("Failed to initialize metrics: {}", e);
            }
        }
    };
}

pub fn init_metrics() {
    let registry = Registry::new();

    let requests_total = must!(
        IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        ),
        "http_requests_total"
    );

    let request_duration = must!(
        HistogramVec::new(
            prometheus::HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "path", "status"],
        ),
        "http_request_duration_seconds"
    );

    let gate_denials = must!(
        IntCounterVec::new(
            Opts::new("gate_denials_total", "Requests rejected by the request gate"),
            &["reason"],
        ),
        "gate_denials_total"
    );

    let logins = must!(
        IntCounterVec::new(
            Opts::new("logins_total", "Login attempts by outcome"),
            &["outcome"],
        ),
        "logins_total"
    );

    let ws_connections = must!(
        IntGauge::new("ws_connections", "Currently connected websocket clients"),
        "ws_connections"
    );

    let hub_dropped = must!(
        IntCounterVec::new(
            Opts::new(
                "hub_events_dropped_total",
                "Events dropped by outbound queue policy",
            ),
            &["policy"],
        ),
        "hub_events_dropped_total"
    );

    for collector in [
        Box::new(requests_total.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(request_duration.clone()),
        Box::new(gate_denials.clone()),
        Box::new(logins.clone()),
        Box::new(ws_connections.clone()),
        Box::new(hub_dropped.clone()),
    ] {
        if let Err(e) = registry.register(collector) {
            tracing::error!("Failed to register metrics collector: {}", e);
            panic!("Failed to initialize metrics: {}", e);
        }
    }

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(request_duration);
    let _ = GATE_DENIALS_TOTAL.set(gate_denials);
    let _ = LOGINS_TOTAL.set(logins);
    let _ = WS_CONNECTIONS.set(ws_connections);
    let _ = HUB_EVENTS_DROPPED_TOTAL.set(hub_dropped);
}

pub fn record_gate_denial(reason: &str) {
    if let Some(counter) = GATE_DENIALS_TOTAL.get() {
        counter.with_label_values(&[reason]).inc();
    }
}

pub fn record_login(outcome: &str) {
    if let Some(counter) = LOGINS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_hub_drop(policy: &str) {
    if let Some(counter) = HUB_EVENTS_DROPPED_TOTAL.get() {
        counter.with_label_values(&[policy]).inc();
    }
}

pub fn ws_connection_opened() {
    if let Some(gauge) = WS_CONNECTIONS.get() {
        gauge.inc();
    }
}

pub fn ws_connection_closed() {
    if let Some(gauge) = WS_CONNECTIONS.get() {
        gauge.dec();
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}
