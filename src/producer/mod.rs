//! Periodic synthetic producer.
//!
//! Each cycle the producer generates one batch of pseudo-random readings
//! per configured metric id, sends all batches as a single request, and
//! blocks until the reply carries one report per record. The cadence is a
//! fixed period with generation and round-trip time absorbed into it.
//!
//! The producer is deliberately fail-stop: any transport error or
//! ill-shaped reply aborts the process so a supervisor can restart it
//! against a healthy collector.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ProducerConfig;
use crate::wire::{MessageFramer, MetricRecord, MetricReport};

/// Cycles between periodic progress log lines.
const REPORT_EVERY: u64 = 60;

/// Run the producer until cancelled or a fatal error.
pub async fn run(cfg: ProducerConfig, cancel: CancellationToken) -> Result<()> {
    let addr = format!("{}:{}", cfg.server_addr, cfg.server_port);
    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connecting to collector at {addr}"))?;

    info!(
        %addr,
        metrics = cfg.metric_ids.len(),
        samples_per_cycle = cfg.samples_per_cycle,
        period = ?cfg.period,
        "producer connected",
    );

    let mut rng = StdRng::from_entropy();
    let pid = std::process::id();
    let mut cycles: u64 = 0;

    let mut ticker = tokio::time::interval(cfg.period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("producer shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let records = generate_batch(&cfg, &mut rng);
        let payload = serde_json::to_vec(&records).context("serializing request")?;

        stream
            .write_all(&payload)
            .await
            .context("sending request")?;

        let reports = receive_reply(&mut stream, records.len()).await?;

        cycles += 1;
        debug!(records = reports.len(), cycle = cycles, "reply received");
        if cycles % REPORT_EVERY == 0 {
            info!(cycles, "producer cycle stats");
        }

        if cfg.persist_results {
            for report in &reports {
                if let Err(e) = save_report(&cfg.output_dir, pid, report) {
                    warn!(id = report.id, error = %e, "result persistence failed");
                }
            }
        }
    }
}

/// Generate one request: a batch of readings per configured metric id.
fn generate_batch(cfg: &ProducerConfig, rng: &mut StdRng) -> Vec<MetricRecord> {
    cfg.metric_ids
        .iter()
        .map(|&id| MetricRecord {
            id,
            data: (0..cfg.samples_per_cycle)
                .map(|_| generate_sample(rng, id))
                .collect(),
        })
        .collect()
}

/// One synthetic reading: the rounded square root of a random cubic in
/// the metric id, so each metric gets its own magnitude band.
fn generate_sample(rng: &mut StdRng, id: i64) -> i64 {
    let x = (id + 1) as f64;
    let a: f64 = rng.gen_range(0.0..32_768.0);
    let b: f64 = rng.gen_range(0.0..32_768.0);
    let c: f64 = rng.gen_range(0.0..32_768.0);

    (a * x + b * x * x + c * x * x * x).sqrt().round() as i64
}

/// Read from the collector until the accumulation parses as a reply with
/// `expected` reports. Anything else is fatal.
async fn receive_reply(stream: &mut TcpStream, expected: usize) -> Result<Vec<MetricReport>> {
    let mut framer = MessageFramer::new();
    let mut buf = vec![0u8; 16 * 1024];

    loop {
        let n = stream.read(&mut buf).await.context("reading reply")?;
        if n == 0 {
            bail!("collector closed the connection before a complete reply");
        }

        framer.extend(&buf[..n]);

        match framer.try_reply(expected) {
            Ok(Some(reports)) => return Ok(reports),
            Ok(None) => continue,
            Err(e) => return Err(e).context("ill-shaped reply from collector"),
        }
    }
}

/// Persist one reply record to `{pid}_{id}_result.txt`, fully replacing
/// the previous cycle's contents.
fn save_report(dir: &Path, pid: u32, report: &MetricReport) -> Result<()> {
    let path = dir.join(format!("{pid}_{}_result.txt", report.id));
    let payload =
        serde_json::to_string_pretty(&report.result).context("serializing result")?;

    std::fs::write(&path, payload)
        .with_context(|| format!("writing result file {}", path.display()))?;

    Ok(())
}
