//! Connection Handler: one handler per accepted socket, running a read
//! task and a write task side by side and tearing both down as soon as
//! either finishes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::Broker;
use crate::envelope::{self, InboundEnvelope, OutboundEnvelope};
use crate::error::ConnectionError;
use crate::frame::DiameterCodec;
use crate::registry::{PeerKey, PeerRegistry};

const READ_CHUNK_SIZE: usize = 8192;

/// Timing knobs a Connection Handler needs, lifted from `Config` so this
/// module has no direct dependency on config file shape.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionTimeouts {
    pub socket_timeout_secs: u64,
    pub diameter_request_timeout_secs: u64,
}

/// Running totals for the benchmarking task, shared across every
/// Connection Handler. A no-op when benchmarking is disabled in config.
#[derive(Default)]
pub struct Metrics {
    pub diameter_requests: AtomicU64,
    pub diameter_responses: AtomicU64,
}

impl Metrics {
    pub fn take_and_reset(&self) -> (u64, u64) {
        (
            self.diameter_requests.swap(0, Ordering::Relaxed),
            self.diameter_responses.swap(0, Ordering::Relaxed),
        )
    }
}

/// Run one accepted connection to completion: register it, race the read
/// and write tasks, then tear down and mark it disconnected.
pub async fn handle_connection<C, B>(
    socket: TcpStream,
    registry: Arc<PeerRegistry>,
    codec: Arc<C>,
    read_broker: Arc<B>,
    write_broker: Arc<B>,
    timeouts: ConnectionTimeouts,
    metrics: Arc<Metrics>,
) where
    C: DiameterCodec + 'static,
    B: Broker + 'static,
{
    let correlation_id = Uuid::new_v4();
    let peer_addr = match socket.peer_addr() {
        Ok(addr) => addr,
        Err(err) => {
            warn!(%correlation_id, %err, "could not read peer address, dropping connection");
            return;
        }
    };
    let key = PeerKey::new(peer_addr.ip().to_string(), peer_addr.port());

    info!(%correlation_id, address = %key.address, port = key.port, "new connection");
    registry.mark_connected(&key).await;
    registry.log_active_peers().await;

    let (mut read_half, mut write_half) = socket.into_split();

    let read_key = key.clone();
    let read_codec = codec.clone();
    let read_broker_task = read_broker.clone();
    let read_metrics = metrics.clone();
    let read_registry = registry.clone();
    let read_task = tokio::spawn(async move {
        read_inbound_data(
            &mut read_half,
            read_registry,
            read_codec,
            read_broker_task,
            read_key,
            timeouts,
            read_metrics,
            correlation_id,
        )
        .await
    });

    let write_key = key.clone();
    let write_metrics = metrics.clone();
    let write_task = tokio::spawn(async move {
        write_outbound_data(&mut write_half, write_broker, write_key, write_metrics, correlation_id).await;
        write_half
    });

    tokio::select! {
        _ = read_task => {
            write_task.abort();
        }
        write_half = write_task => {
            read_task.abort();
            if let Ok(mut write_half) = write_half {
                let _ = write_half.shutdown().await;
            }
        }
    }

    registry.mark_disconnected(&key).await;
    info!(%correlation_id, address = %key.address, port = key.port, "connection closed");
    registry.log_active_peers().await;
}

/// Read task: loop reading from the socket, validating the peer on the
/// first successful frame decode, then publishing every subsequent read as
/// an `InboundEnvelope`. Decode failures before validation are discarded
/// silently so that initial noise or partial frames don't tear the
/// connection down.
async fn read_inbound_data<C, B>(
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    registry: Arc<PeerRegistry>,
    codec: Arc<C>,
    broker: Arc<B>,
    key: PeerKey,
    timeouts: ConnectionTimeouts,
    metrics: Arc<Metrics>,
    correlation_id: Uuid,
) where
    C: DiameterCodec,
    B: Broker,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut validated = false;

    loop {
        let read_result = time::timeout(
            Duration::from_secs(timeouts.socket_timeout_secs),
            reader.read(&mut buf),
        )
        .await;

        let n = match read_result {
            Err(_) => {
                info!(%correlation_id, address = %key.address, port = key.port, "socket read timed out, closing connection");
                return;
            }
            Ok(Err(err)) => {
                info!(%correlation_id, %err, address = %key.address, port = key.port, "socket error, closing connection");
                return;
            }
            Ok(Ok(0)) => {
                info!(%correlation_id, address = %key.address, port = key.port, "peer closed connection");
                return;
            }
            Ok(Ok(n)) => n,
        };

        let frame = &buf[..n];
        debug!(%correlation_id, bytes = n, "received data");

        if !validated {
            match codec.origin_host(frame) {
                Ok(origin_host) => {
                    let peer_type = codec.peer_type(&origin_host);
                    info!(%correlation_id, %origin_host, %peer_type, "validated peer");
                    registry
                        .mark_validated(&key, origin_host, peer_type)
                        .await;
                    validated = true;
                }
                Err(err) => {
                    warn!(%correlation_id, %err, "invalid diameter inbound, discarding data");
                    continue;
                }
            }
        }

        let received_ns = match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => d.as_nanos(),
            Err(_) => 0,
        };
        let envelope = InboundEnvelope::new(frame, received_ns, &key.address, key.port);
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%correlation_id, %err, "failed to serialize inbound envelope");
                continue;
            }
        };

        if let Err(err) = broker
            .send_message(
                envelope::INBOUND_QUEUE,
                payload,
                timeouts.diameter_request_timeout_secs,
            )
            .await
        {
            warn!(%correlation_id, %err, "failed to publish inbound envelope");
        } else {
            metrics.diameter_requests.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Write task: block on the per-connection outbound queue and write every
/// message that arrives until the connection closes.
async fn write_outbound_data<B>(
    writer: &mut (impl tokio::io::AsyncWrite + Unpin),
    broker: Arc<B>,
    key: PeerKey,
    metrics: Arc<Metrics>,
    correlation_id: Uuid,
) where
    B: Broker,
{
    let queue = envelope::outbound_queue(&key.address, key.port);

    loop {
        let (_, message) = match broker.await_message(&queue).await {
            Ok(popped) => popped,
            Err(err) => {
                warn!(%correlation_id, %err, "broker error awaiting outbound message, retrying");
                time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        let envelope: OutboundEnvelope = match serde_json::from_str(&message) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%correlation_id, %err, "outbound message was not a valid envelope, discarding");
                continue;
            }
        };

        let frame = match envelope.decode() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%correlation_id, %err, "outbound envelope hex payload malformed, discarding");
                continue;
            }
        };

        if let Err(err) = writer.write_all(&frame).await {
            let err = ConnectionError::Io(err);
            info!(%correlation_id, %err, address = %key.address, port = key.port, "write failed, closing connection");
            return;
        }
        if let Err(err) = writer.flush().await {
            info!(%correlation_id, %err, address = %key.address, port = key.port, "flush failed, closing connection");
            return;
        }

        metrics.diameter_responses.fetch_add(1, Ordering::Relaxed);
    }
}
