//! Collector orchestration.
//!
//! The collector binds one TCP listener and spawns a task per accepted
//! connection. Sessions reassemble requests and hand them over an mpsc
//! channel to a single pipeline task that owns the [`MetricStore`] and the
//! optional [`SpectrumWriter`], so no window is ever touched from two
//! tasks. The reply travels back to the session over a oneshot channel.

pub mod session;
pub mod stats;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::CollectorConfig;
use crate::export::HealthMetrics;
use crate::spectral;
use crate::stats::confidence;
use crate::store::MetricStore;
use crate::wire::{MetricRecord, MetricReport};
use crate::writer::SpectrumWriter;

use self::session::PipelineRequest;
use self::stats::MessageStats;

/// Depth of the session-to-pipeline channel.
const PIPELINE_QUEUE_DEPTH: usize = 1024;

/// Long-lived telemetry collector.
pub struct Collector {
    cfg: CollectorConfig,
    health: Arc<HealthMetrics>,
    stats: Arc<MessageStats>,
    cancel: CancellationToken,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
    pipeline_task: Option<JoinHandle<()>>,
}

impl Collector {
    /// Create a collector from configuration. Nothing is bound until
    /// [`start`](Self::start).
    pub fn new(cfg: CollectorConfig, health: Arc<HealthMetrics>) -> Self {
        Self {
            cfg,
            health,
            stats: Arc::new(MessageStats::new()),
            cancel: CancellationToken::new(),
            local_addr: None,
            accept_task: None,
            pipeline_task: None,
        }
    }

    /// Bind the listener and spawn the accept loop, the pipeline task,
    /// and the periodic stats reporter.
    ///
    /// A bind failure is fatal; everything after that is scoped to
    /// individual connections.
    pub async fn start(&mut self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.cfg.listen_addr, self.cfg.listen_port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("binding collector listener on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting listener address")?;
        self.local_addr = Some(local_addr);

        let store = MetricStore::new(self.cfg.window_capacity);
        let writer = if self.cfg.persist_spectra {
            Some(SpectrumWriter::new(self.cfg.output_dir.clone()))
        } else {
            None
        };

        let (pipeline_tx, pipeline_rx) = mpsc::channel(PIPELINE_QUEUE_DEPTH);

        self.pipeline_task = Some(tokio::spawn(run_pipeline(
            pipeline_rx,
            store,
            writer,
            Arc::clone(&self.health),
            Arc::clone(&self.stats),
        )));

        self.accept_task = Some(tokio::spawn(run_accept_loop(
            listener,
            pipeline_tx,
            Arc::clone(&self.health),
            Arc::clone(&self.stats),
            self.cancel.clone(),
        )));

        self.spawn_stats_reporter();

        info!(
            addr = %local_addr,
            window_capacity = self.cfg.window_capacity,
            persist_spectra = self.cfg.persist_spectra,
            "collector started",
        );

        Ok(())
    }

    /// Gracefully stop: cancel the accept loop and sessions, then wait
    /// for the pipeline task to drain in-flight requests.
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "accept task panicked");
            }
        }

        // The pipeline task exits once every session (and with it every
        // channel sender) is gone.
        if let Some(task) = self.pipeline_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "pipeline task panicked");
            }
        }

        info!("collector stopped");
    }

    /// Address the listener is bound to, once started. Useful when the
    /// configured port is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Spawn background message stats reporter.
    fn spawn_stats_reporter(&self) {
        let cancel = self.cancel.clone();
        let stats = Arc::clone(&self.stats);
        let interval = self.cfg.stats_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let snap = stats.snapshot();
                        if snap.is_empty() {
                            continue;
                        }

                        info!(
                            received = snap.received,
                            replied = snap.replied,
                            records = snap.records,
                            frame_errors = snap.frame_errors,
                            "message stats",
                        );
                    }
                }
            }
        });
    }
}

/// Accept connections until cancelled, one session task each.
async fn run_accept_loop(
    listener: TcpListener,
    pipeline_tx: mpsc::Sender<PipelineRequest>,
    health: Arc<HealthMetrics>,
    stats: Arc<MessageStats>,
    cancel: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => return,
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(e) => {
                    // Transient accept errors (EMFILE, resets in the
                    // backlog) do not take the collector down.
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
        };

        health.connections_total.inc();
        health.connections_active.inc();

        tokio::spawn(session::run_session(
            stream,
            peer,
            pipeline_tx.clone(),
            Arc::clone(&health),
            Arc::clone(&stats),
            cancel.clone(),
        ));
    }
}

/// Single owner of all mutable pipeline state. Consumes reassembled
/// requests and produces serialized replies.
async fn run_pipeline(
    mut rx: mpsc::Receiver<PipelineRequest>,
    mut store: MetricStore,
    mut writer: Option<SpectrumWriter>,
    health: Arc<HealthMetrics>,
    stats: Arc<MessageStats>,
) {
    while let Some(request) = rx.recv().await {
        let reports = process_records(
            &request.records,
            &mut store,
            writer.as_mut(),
            &health,
        );

        stats.record_records(request.records.len() as u64);
        health.records_processed.inc_by(request.records.len() as f64);
        health.tracked_series.set(store.series_count() as f64);

        let reply = match serde_json::to_vec(&reports) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "serializing reply");
                continue;
            }
        };

        // The session may have died while we were computing; that is its
        // problem, not the pipeline's.
        let _ = request.reply_tx.send(reply);
    }
}

/// Process one request: append each batch, compute statistics and the
/// spectrum over the updated window, and persist the spectrum if enabled.
/// The reply preserves the request's record order.
fn process_records(
    records: &[MetricRecord],
    store: &mut MetricStore,
    mut writer: Option<&mut SpectrumWriter>,
    health: &HealthMetrics,
) -> Vec<MetricReport> {
    records
        .iter()
        .map(|record| {
            let series = store.append(record.id, &record.data);
            let window = series.snapshot();

            let started = Instant::now();
            let result = confidence(window);
            let spectrum = spectral::magnitude_spectrum(window);
            let elapsed = started.elapsed();

            health.transform_duration.observe(elapsed.as_secs_f64());

            info!(
                id = record.id,
                batch = record.data.len(),
                window = window.len(),
                average = result.average,
                dispersion = result.dispersion,
                standard_deviation = result.standard_deviation,
                elapsed_us = elapsed.as_micros() as u64,
                "record processed",
            );

            if let Some(writer) = writer.as_deref_mut() {
                if let Err(e) = writer.persist(record.id, &spectrum) {
                    health.persist_errors.inc();
                    warn!(id = record.id, error = %e, "spectrum persistence failed");
                }
            }

            MetricReport {
                id: record.id,
                result,
            }
        })
        .collect()
}
