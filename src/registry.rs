//! Peer Registry: process-wide map from `(address, port)` to the
//! observed state of that peer, with reconnection accounting and periodic
//! broker snapshotting.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, info};

use crate::broker::Broker;
use crate::envelope::ACTIVE_PEERS_KEY;
use crate::error::BrokerError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SNAPSHOT_TTL_SECS: u64 = 86_400;
const DEFAULT_PRUNE_TIMEOUT_SECS: i64 = 3600;

/// Strongly-typed rendering of the `(clientAddress, clientPort)` identity
/// the original service keys its peer map by as a concatenated string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PeerKey {
    pub address: String,
    pub port: u16,
}

impl PeerKey {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerEntry {
    #[serde(rename = "connectTimestamp")]
    pub connect_timestamp: String,
    #[serde(rename = "disconnectTimestamp")]
    pub disconnect_timestamp: String,
    #[serde(rename = "reconnectionCount")]
    pub reconnection_count: u32,
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    pub port: String,
    #[serde(rename = "connectionStatus")]
    pub connection_status: ConnectionStatus,
    #[serde(rename = "diameterHostname")]
    pub diameter_hostname: String,
    #[serde(rename = "peerType")]
    pub peer_type: String,
}

impl PeerEntry {
    fn fresh() -> Self {
        Self {
            connect_timestamp: String::new(),
            disconnect_timestamp: String::new(),
            reconnection_count: 0,
            ip_address: String::new(),
            port: String::new(),
            connection_status: ConnectionStatus::Disconnected,
            diameter_hostname: String::new(),
            peer_type: String::new(),
        }
    }

    fn is_eligible_for_pruning(&self, now: chrono::DateTime<Local>, timeout_secs: i64) -> bool {
        if self.connection_status != ConnectionStatus::Disconnected {
            return false;
        }
        let Ok(disconnected_at) =
            chrono::NaiveDateTime::parse_from_str(&self.disconnect_timestamp, TIMESTAMP_FORMAT)
        else {
            return false;
        };
        let disconnected_at = disconnected_at.and_local_timezone(Local).single();
        match disconnected_at {
            Some(disconnected_at) => (now - disconnected_at).num_seconds() > timeout_secs,
            None => false,
        }
    }
}

fn now_stamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Process-wide peer map. All mutation happens through `&self` methods that
/// take the internal lock; callers never see the raw map.
pub struct PeerRegistry {
    peers: Mutex<HashMap<PeerKey, PeerEntry>>,
    prune_timeout_secs: i64,
}

impl PeerRegistry {
    pub fn new(prune_timeout_secs: u64) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            prune_timeout_secs: prune_timeout_secs as i64,
        }
    }

    /// Insert a fresh entry on first accept, or bump `reconnectionCount` on
    /// a re-accept of the same key. Either way, stamp the entry connected.
    pub async fn mark_connected(&self, key: &PeerKey) {
        let mut peers = self.peers.lock().await;
        let entry = peers.entry(key.clone()).or_insert_with(PeerEntry::fresh);
        if !entry.connect_timestamp.is_empty() {
            entry.reconnection_count += 1;
        }
        entry.connect_timestamp = now_stamp();
        entry.ip_address = key.address.clone();
        entry.port = key.port.to_string();
        entry.connection_status = ConnectionStatus::Connected;
    }

    pub async fn mark_disconnected(&self, key: &PeerKey) {
        let mut peers = self.peers.lock().await;
        if let Some(entry) = peers.get_mut(key) {
            entry.connection_status = ConnectionStatus::Disconnected;
            entry.disconnect_timestamp = now_stamp();
        }
    }

    /// Record the peer's validated identity after a successful frame decode.
    pub async fn mark_validated(&self, key: &PeerKey, diameter_hostname: String, peer_type: String) {
        let mut peers = self.peers.lock().await;
        if let Some(entry) = peers.get_mut(key) {
            entry.diameter_hostname = diameter_hostname;
            entry.peer_type = peer_type;
        }
    }

    pub async fn len(&self) -> usize {
        self.peers.lock().await.len()
    }

    /// Remove entries eligible for pruning, returning the keys removed.
    async fn prune(&self) -> Vec<PeerKey> {
        let now = Local::now();
        let mut peers = self.peers.lock().await;
        let stale: Vec<PeerKey> = peers
            .iter()
            .filter(|(_, entry)| entry.is_eligible_for_pruning(now, self.prune_timeout_secs))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            peers.remove(key);
        }
        stale
    }

    /// Snapshot a single peer's current state. Primarily for introspection
    /// and tests; the maintenance task publishes the aggregate snapshot.
    pub async fn peer_entry(&self, key: &PeerKey) -> Option<PeerEntry> {
        self.peers.lock().await.get(key).cloned()
    }

    async fn snapshot_json(&self) -> serde_json::Result<String> {
        let peers = self.peers.lock().await;
        let by_key: HashMap<String, &PeerEntry> = peers
            .iter()
            .map(|(key, entry)| (format!("{}-{}", key.address, key.port), entry))
            .collect();
        serde_json::to_string(&by_key)
    }

    /// Maintenance task: prune stale peers and refresh the broker snapshot
    /// on a one-second tick, forever.
    pub async fn run_maintenance<B: Broker>(&self, broker: &B) {
        let mut ticker = time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;

            if self.len().await == 0 {
                continue;
            }

            let pruned = self.prune().await;
            if !pruned.is_empty() {
                debug!(?pruned, "pruning disconnected peers");
            }

            match self.snapshot_json().await {
                Ok(json) => {
                    if let Err(err) = broker
                        .set_value(ACTIVE_PEERS_KEY, json, SNAPSHOT_TTL_SECS)
                        .await
                    {
                        log_snapshot_error(&err);
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, "failed to serialize peer registry snapshot");
                }
            }
        }
    }

    pub async fn log_active_peers(&self) {
        let count = self.len().await;
        info!(count, "active peers");
    }
}

fn log_snapshot_error(err: &BrokerError) {
    tracing::warn!(%err, "failed to publish peer registry snapshot");
}

pub fn default_prune_timeout() -> u64 {
    DEFAULT_PRUNE_TIMEOUT_SECS as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::FakeBroker;

    #[tokio::test]
    async fn first_connect_creates_entry_with_zero_reconnections() {
        let registry = PeerRegistry::new(3600);
        let key = PeerKey::new("10.0.0.1", 51000);
        registry.mark_connected(&key).await;

        let peers = registry.peers.lock().await;
        let entry = peers.get(&key).unwrap();
        assert_eq!(entry.reconnection_count, 0);
        assert_eq!(entry.connection_status, ConnectionStatus::Connected);
        assert!(!entry.connect_timestamp.is_empty());
    }

    #[tokio::test]
    async fn reconnect_increments_count() {
        let registry = PeerRegistry::new(3600);
        let key = PeerKey::new("10.0.0.1", 51000);
        registry.mark_connected(&key).await;
        registry.mark_disconnected(&key).await;
        registry.mark_connected(&key).await;

        let peers = registry.peers.lock().await;
        assert_eq!(peers.get(&key).unwrap().reconnection_count, 1);
    }

    #[tokio::test]
    async fn disconnect_marks_status_and_timestamp() {
        let registry = PeerRegistry::new(3600);
        let key = PeerKey::new("10.0.0.1", 51000);
        registry.mark_connected(&key).await;
        registry.mark_disconnected(&key).await;

        let peers = registry.peers.lock().await;
        let entry = peers.get(&key).unwrap();
        assert_eq!(entry.connection_status, ConnectionStatus::Disconnected);
        assert!(!entry.disconnect_timestamp.is_empty());
    }

    #[tokio::test]
    async fn stale_disconnected_peer_is_pruned() {
        let registry = PeerRegistry::new(3600);
        let key = PeerKey::new("10.0.0.1", 51000);
        registry.mark_connected(&key).await;
        registry.mark_disconnected(&key).await;

        {
            let mut peers = registry.peers.lock().await;
            let entry = peers.get_mut(&key).unwrap();
            let old = Local::now() - chrono::Duration::seconds(7200);
            entry.disconnect_timestamp = old.format(TIMESTAMP_FORMAT).to_string();
        }

        let pruned = registry.prune().await;
        assert_eq!(pruned, vec![key.clone()]);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn connected_peer_is_never_pruned() {
        let registry = PeerRegistry::new(0);
        let key = PeerKey::new("10.0.0.1", 51000);
        registry.mark_connected(&key).await;

        let pruned = registry.prune().await;
        assert!(pruned.is_empty());
    }

    #[tokio::test]
    async fn snapshot_serializes_with_address_port_key() {
        let registry = PeerRegistry::new(3600);
        let key = PeerKey::new("10.0.0.1", 51000);
        registry.mark_connected(&key).await;

        let json = registry.snapshot_json().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("10.0.0.1-51000").is_some());
    }

    #[tokio::test]
    async fn maintenance_tick_publishes_snapshot_to_broker() {
        let registry = PeerRegistry::new(3600);
        let key = PeerKey::new("10.0.0.1", 51000);
        registry.mark_connected(&key).await;

        let broker = FakeBroker::new();
        let broker_clone = broker.clone();
        let handle = tokio::spawn(async move {
            registry.run_maintenance(&broker_clone).await;
        });

        tokio::time::sleep(Duration::from_millis(1100)).await;
        handle.abort();

        let stored = broker.get_value(ACTIVE_PEERS_KEY).await;
        assert!(stored.is_some());
    }
}
