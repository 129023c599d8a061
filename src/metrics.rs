//! Prometheus metrics HTTP server.
//!
//! Exposes bridge statistics in Prometheus text format via HTTP endpoint.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tracing::info;

use crate::stats::SpotStats;

/// Start the Prometheus metrics HTTP server.
///
/// Runs in the background and serves metrics at `/metrics`.
/// Returns an error if the server fails to bind to the port.
pub async fn start_metrics_server(
    port: u16,
    stats: Arc<SpotStats>,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(stats);

    let listener = TcpListener::bind(addr).await?;
    info!("Prometheus metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Prometheus metrics endpoint.
async fn metrics_handler(State(stats): State<Arc<SpotStats>>) -> impl IntoResponse {
    let output = format_prometheus_metrics(&stats);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}

/// Escape a label value for the Prometheus text format.
fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn push_metric(
    output: &mut String,
    name: &str,
    kind: &str,
    help: &str,
    value: impl std::fmt::Display,
) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} {}", name, kind);
    let _ = writeln!(output, "{} {}", name, value);
}

/// Format statistics as Prometheus text format.
fn format_prometheus_metrics(stats: &SpotStats) -> String {
    let summary = stats.summary();
    let mut output = String::with_capacity(4096);

    push_metric(
        &mut output,
        "hamalert_uptime_seconds",
        "gauge",
        "Time since the bridge started",
        format!("{:.3}", summary.elapsed_secs),
    );
    push_metric(
        &mut output,
        "hamalert_sessions_total",
        "counter",
        "Telnet sessions started",
        summary.sessions_started,
    );
    push_metric(
        &mut output,
        "hamalert_lines_total",
        "counter",
        "Lines received from the server",
        summary.lines_received,
    );
    push_metric(
        &mut output,
        "hamalert_bytes_received_total",
        "counter",
        "Bytes of line data received",
        summary.bytes_received,
    );
    push_metric(
        &mut output,
        "hamalert_keepalives_total",
        "counter",
        "Keepalives sent after idle reads",
        summary.keepalives_sent,
    );
    push_metric(
        &mut output,
        "hamalert_parse_failures_total",
        "counter",
        "JSON-mode lines that were not a JSON object",
        summary.parse_failures,
    );
    push_metric(
        &mut output,
        "hamalert_incomplete_spots_total",
        "counter",
        "Spots dropped for lack of a callsign",
        summary.incomplete_spots,
    );
    push_metric(
        &mut output,
        "hamalert_suppressed_spots_total",
        "counter",
        "Spots suppressed by the de-dup window",
        summary.suppressed_spots,
    );
    push_metric(
        &mut output,
        "hamalert_delivery_failures_total",
        "counter",
        "Webhook deliveries that failed",
        summary.delivery_failures,
    );

    // Notifications by band
    output.push_str("# HELP hamalert_notifications_total Notifications delivered\n");
    output.push_str("# TYPE hamalert_notifications_total counter\n");
    for (band, count) in &summary.notifications_by_band {
        let _ = writeln!(
            output,
            "hamalert_notifications_total{{band=\"{}\"}} {}",
            escape_label(band),
            count
        );
    }
    if summary.notifications_by_band.is_empty() {
        let _ = writeln!(
            output,
            "hamalert_notifications_total {}",
            summary.notifications_sent
        );
    }

    // Webhook latency
    if let Some(ref latency) = summary.delivery_percentiles {
        output.push_str(
            "# HELP hamalert_webhook_latency_ms Webhook round trip in milliseconds\n",
        );
        output.push_str("# TYPE hamalert_webhook_latency_ms summary\n");
        let quantiles = [("0.5", latency.p50), ("0.9", latency.p90), ("0.99", latency.p99)];
        for (quantile, value) in quantiles {
            let _ = writeln!(
                output,
                "hamalert_webhook_latency_ms{{quantile=\"{}\"}} {}",
                quantile, value
            );
        }
        let _ = writeln!(
            output,
            "hamalert_webhook_latency_ms_count {}",
            summary.notifications_sent + summary.delivery_failures
        );
    }

    output
}
