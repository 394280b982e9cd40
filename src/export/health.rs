use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Prometheus metrics for collector health and observability.
///
/// All metrics use the "telespect" namespace.
pub struct HealthMetrics {
    registry: Registry,
    addr: String,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,

    /// Connections currently open.
    pub connections_active: Gauge,
    /// Total connections accepted.
    pub connections_total: Counter,
    /// Total complete request messages reassembled.
    pub messages_received: Counter,
    /// Total replies written back to peers.
    pub messages_replied: Counter,
    /// Total metric records processed.
    pub records_processed: Counter,
    /// Connections torn down for a message shape violation.
    pub frame_errors: Counter,
    /// Spectrum persistence failures (non-fatal, reply still sent).
    pub persist_errors: Counter,
    /// Distinct metric ids with a live window.
    pub tracked_series: Gauge,
    /// Per-record transform duration (confidence + spectrum).
    pub transform_duration: Histogram,
}

impl HealthMetrics {
    /// Creates a new health metrics instance with all metrics registered.
    pub fn new(addr: &str) -> Result<Self> {
        let registry = Registry::new();

        let connections_active = Gauge::with_opts(
            Opts::new("connections_active", "Connections currently open.")
                .namespace("telespect"),
        )?;
        let connections_total = Counter::with_opts(
            Opts::new("connections_total", "Total connections accepted.")
                .namespace("telespect"),
        )?;
        let messages_received = Counter::with_opts(
            Opts::new(
                "messages_received_total",
                "Total complete request messages reassembled.",
            )
            .namespace("telespect"),
        )?;
        let messages_replied = Counter::with_opts(
            Opts::new(
                "messages_replied_total",
                "Total replies written back to peers.",
            )
            .namespace("telespect"),
        )?;
        let records_processed = Counter::with_opts(
            Opts::new(
                "records_processed_total",
                "Total metric records processed.",
            )
            .namespace("telespect"),
        )?;
        let frame_errors = Counter::with_opts(
            Opts::new(
                "frame_errors_total",
                "Connections torn down for a message shape violation.",
            )
            .namespace("telespect"),
        )?;
        let persist_errors = Counter::with_opts(
            Opts::new(
                "persist_errors_total",
                "Spectrum persistence failures (non-fatal).",
            )
            .namespace("telespect"),
        )?;
        let tracked_series = Gauge::with_opts(
            Opts::new("tracked_series", "Distinct metric ids with a live window.")
                .namespace("telespect"),
        )?;
        let transform_duration = Histogram::with_opts(
            HistogramOpts::new(
                "transform_duration_seconds",
                "Per-record transform duration (confidence + spectrum).",
            )
            .namespace("telespect")
            .buckets(vec![
                0.000_01, 0.000_1, 0.001, 0.01, 0.05, 0.1, 0.5, 1.0,
            ]),
        )?;

        registry.register(Box::new(connections_active.clone()))?;
        registry.register(Box::new(connections_total.clone()))?;
        registry.register(Box::new(messages_received.clone()))?;
        registry.register(Box::new(messages_replied.clone()))?;
        registry.register(Box::new(records_processed.clone()))?;
        registry.register(Box::new(frame_errors.clone()))?;
        registry.register(Box::new(persist_errors.clone()))?;
        registry.register(Box::new(tracked_series.clone()))?;
        registry.register(Box::new(transform_duration.clone()))?;

        Ok(Self {
            registry,
            addr: addr.to_string(),
            shutdown: parking_lot::Mutex::new(None),
            connections_active,
            connections_total,
            messages_received,
            messages_replied,
            records_processed,
            frame_errors,
            persist_errors,
            tracked_series,
            transform_duration,
        })
    }

    /// Starts the HTTP server serving /metrics and /healthz.
    pub async fn start(&self) -> Result<()> {
        let addr = if self.addr.is_empty() {
            ":9640"
        } else {
            &self.addr
        };

        // Parse address, handling ":port" shorthand.
        let bind_addr = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        };

        let registry = self.registry.clone();
        let app_state = Arc::new(AppState { registry });

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(app_state);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "health metrics server started");

            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    cancel.cancelled().await;
                })
                .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "health metrics server error");
            }
        });

        Ok(())
    }

    /// Gracefully shuts down the health metrics server.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

/// Shared state for axum handlers.
struct AppState {
    registry: Registry,
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "encoding metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "encoding error".to_string(),
        );
    }

    match String::from_utf8(buffer) {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "converting metrics to string");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error".to_string(),
            )
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_without_collision() {
        let health = HealthMetrics::new("127.0.0.1:0").unwrap();
        health.messages_received.inc();
        health.records_processed.inc_by(3.0);
        health.connections_active.set(2.0);

        let families = health.registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "telespect_messages_received_total"));
    }

    #[tokio::test]
    async fn test_start_and_stop_on_ephemeral_port() {
        let health = HealthMetrics::new("127.0.0.1:0").unwrap();
        health.start().await.unwrap();
        health.stop().await.unwrap();
    }
}
