//! Server: bind, accept, and wire every accepted socket to a Connection
//! Handler, alongside the Peer Registry maintenance task and an optional
//! benchmarking task.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time;
use tracing::info;

use crate::broker::RedisBroker;
use crate::config::Config;
use crate::connection::{self, ConnectionTimeouts, Metrics};
use crate::error::ConnectionError;
use crate::frame::BoundedAvpCodec;
use crate::registry::PeerRegistry;

pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bind the listener, spawn the ambient tasks, and accept connections
    /// until the process is torn down.
    pub async fn run(self) -> Result<(), ConnectionError> {
        let bind_addr = format!("{}:{}", self.config.bind_address(), self.config.hss.bind_port);
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(address = %bind_addr, "serving");

        let registry = Arc::new(PeerRegistry::new(self.config.hss.active_diameter_peers_timeout));
        let codec = Arc::new(BoundedAvpCodec);
        let metrics = Arc::new(Metrics::default());

        let peer_broker = RedisBroker::connect(&self.config.redis_url()).await?;
        let registry_for_maintenance = registry.clone();
        tokio::spawn(async move {
            registry_for_maintenance.run_maintenance(&peer_broker).await;
        });

        if self.config.benchmarking.enabled {
            let metrics_for_benchmark = metrics.clone();
            let interval_secs = self.config.benchmarking.reporting_interval;
            tokio::spawn(async move {
                run_benchmark_reporter(metrics_for_benchmark, interval_secs).await;
            });
        }

        let timeouts = ConnectionTimeouts {
            socket_timeout_secs: self.config.hss.client_socket_timeout,
            diameter_request_timeout_secs: self.config.hss.diameter_request_timeout,
        };

        loop {
            let (socket, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(%err, "accept failed, continuing");
                    continue;
                }
            };
            tracing::debug!(%peer_addr, "accepted connection");

            let registry = registry.clone();
            let codec = codec.clone();
            let metrics = metrics.clone();
            let redis_url = self.config.redis_url();

            tokio::spawn(async move {
                let read_broker = match RedisBroker::connect(&redis_url).await {
                    Ok(broker) => Arc::new(broker),
                    Err(err) => {
                        tracing::warn!(%err, "failed to open read broker connection, dropping connection");
                        return;
                    }
                };
                let write_broker = match RedisBroker::connect(&redis_url).await {
                    Ok(broker) => Arc::new(broker),
                    Err(err) => {
                        tracing::warn!(%err, "failed to open write broker connection, dropping connection");
                        return;
                    }
                };

                connection::handle_connection(
                    socket,
                    registry,
                    codec,
                    read_broker,
                    write_broker,
                    timeouts,
                    metrics,
                )
                .await;
            });
        }
    }
}

/// Periodically log and reset the inbound/outbound throughput counters.
async fn run_benchmark_reporter(metrics: Arc<Metrics>, interval_secs: u64) {
    let mut ticker = time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        ticker.tick().await;
        let (requests, responses) = metrics.take_and_reset();
        info!(
            requests,
            responses,
            interval_secs,
            "processed diameter messages in the last reporting interval"
        );
    }
}
