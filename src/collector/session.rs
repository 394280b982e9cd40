use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::export::HealthMetrics;
use crate::wire::{MessageFramer, MetricRecord};

use super::stats::MessageStats;

/// One reassembled request handed to the pipeline task, with a slot for
/// the serialized reply.
pub(crate) struct PipelineRequest {
    pub records: Vec<MetricRecord>,
    pub reply_tx: oneshot::Sender<Vec<u8>>,
}

/// Drive one client connection until the peer closes, an I/O error
/// occurs, a shape violation is detected, or shutdown is requested.
///
/// Errors here are scoped to this connection; the listener and the other
/// sessions keep running.
pub(crate) async fn run_session(
    mut stream: TcpStream,
    peer: SocketAddr,
    pipeline_tx: mpsc::Sender<PipelineRequest>,
    health: Arc<HealthMetrics>,
    stats: Arc<MessageStats>,
    cancel: CancellationToken,
) {
    let mut framer = MessageFramer::new();
    let mut read_buf = vec![0u8; 16 * 1024];

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            res = stream.read(&mut read_buf) => match res {
                Ok(0) => {
                    debug!(%peer, buffered = framer.buffered(), "peer closed connection");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(%peer, error = %e, "read failed, closing connection");
                    break;
                }
            },
        };

        framer.extend(&read_buf[..n]);

        let records = match framer.try_request() {
            Ok(Some(records)) => records,
            Ok(None) => continue,
            Err(e) => {
                stats.record_frame_error();
                health.frame_errors.inc();
                warn!(%peer, error = %e, "closing connection on shape violation");
                break;
            }
        };

        stats.record_received();
        health.messages_received.inc();

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = PipelineRequest { records, reply_tx };

        // A closed pipeline channel means the collector is shutting down.
        if pipeline_tx.send(request).await.is_err() {
            break;
        }
        let reply = match reply_rx.await {
            Ok(reply) => reply,
            Err(_) => break,
        };

        if let Err(e) = stream.write_all(&reply).await {
            warn!(%peer, error = %e, "reply write failed, closing connection");
            break;
        }

        stats.record_replied();
        health.messages_replied.inc();
    }

    health.connections_active.dec();
}
