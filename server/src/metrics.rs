use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Storage Metrics
    pub static ref STORAGE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "storage_operations_total",
        "Total number of object storage operations",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref STORAGE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "storage_operation_duration_seconds",
        "Object storage operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sessions_total",
        "Total number of game sessions",
        &["status"]
    )
    .unwrap();

    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sessions_active",
        "Number of currently active sessions"
    )
    .unwrap();

    pub static ref GUESSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "guesses_total",
        "Total number of guesses submitted",
        &["correct"]
    )
    .unwrap();

    pub static ref PUZZLES_SERVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "puzzles_served_total",
        "Total number of puzzles served, by content tier",
        &["source"]
    )
    .unwrap();

    pub static ref HINTS_REVEALED_TOTAL: IntCounter = register_int_counter!(
        "hints_revealed_total",
        "Total number of hint reveals"
    )
    .unwrap();

    pub static ref RATINGS_RECORDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ratings_recorded_total",
        "Total number of ratings recorded, by destination",
        &["destination"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track an object storage operation with metrics
pub async fn track_storage_operation<F, T, E>(operation: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORAGE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    STORAGE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);

    result
}
