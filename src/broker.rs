//! Broker Client: a thin abstraction over the external message broker
//! exposing exactly three operations, backed by Redis in production and by
//! an in-memory fake in tests.
//!
//! `awaitMessage` is a true blocking pop — two independent client instances
//! are required per Connection Handler (one for reads, one for writes)
//! because a blocking pop on a shared connection would serialize both
//! directions. A third instance backs the Peer Registry snapshotter.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::{Mutex, Notify};

use crate::error::BrokerError;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Append `message` to the named FIFO queue, and ensure the queue key
    /// has a TTL of `queue_expiry_secs` seconds.
    async fn send_message(
        &self,
        queue: &str,
        message: String,
        queue_expiry_secs: u64,
    ) -> Result<(), BrokerError>;

    /// Block until a message is available on `queue`, then return
    /// `(queue, message)`. Must not busy-loop.
    async fn await_message(&self, queue: &str) -> Result<(String, String), BrokerError>;

    /// Unconditional write with TTL.
    async fn set_value(&self, key: &str, value: String, key_expiry_secs: u64) -> Result<(), BrokerError>;
}

/// Redis-backed broker client. Each instance owns one
/// `redis::aio::ConnectionManager`, which reconnects transparently but
/// still serializes commands issued against it — callers needing a
/// concurrent blocking pop alongside other traffic must construct a
/// separate `RedisBroker`.
pub struct RedisBroker {
    connection: Mutex<redis::aio::ConnectionManager>,
}

impl RedisBroker {
    pub async fn connect(redis_url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url).map_err(BrokerError::from)?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(BrokerError::from)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn send_message(
        &self,
        queue: &str,
        message: String,
        queue_expiry_secs: u64,
    ) -> Result<(), BrokerError> {
        let mut conn = self.connection.lock().await;
        conn.rpush::<_, _, ()>(queue, message).await?;
        conn.expire::<_, ()>(queue, queue_expiry_secs as i64).await?;
        Ok(())
    }

    async fn await_message(&self, queue: &str) -> Result<(String, String), BrokerError> {
        let mut conn = self.connection.lock().await;
        // BLPOP with a zero timeout blocks indefinitely, matching
        // `awaitMessage`'s "true blocking pop" contract.
        let (popped_queue, message): (String, String) = conn.blpop(queue, 0.0).await?;
        Ok((popped_queue, message))
    }

    async fn set_value(&self, key: &str, value: String, key_expiry_secs: u64) -> Result<(), BrokerError> {
        let mut conn = self.connection.lock().await;
        conn.set_ex::<_, _, ()>(key, value, key_expiry_secs).await?;
        Ok(())
    }
}

#[derive(Default)]
struct FakeBrokerState {
    queues: HashMap<String, VecDeque<String>>,
    values: HashMap<String, String>,
}

/// In-memory broker double for tests: no real Redis server needed to
/// exercise the Connection Handler or Peer Registry end-to-end.
#[derive(Clone)]
pub struct FakeBroker {
    state: Arc<Mutex<FakeBrokerState>>,
    notify: Arc<Notify>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeBrokerState::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    pub async fn get_value(&self, key: &str) -> Option<String> {
        self.state.lock().await.values.get(key).cloned()
    }

    /// Push a message directly onto `queue`, waking any waiting pop.
    pub async fn push(&self, queue: &str, message: impl Into<String>) {
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(message.into());
        drop(state);
        self.notify.notify_waiters();
    }
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn send_message(
        &self,
        queue: &str,
        message: String,
        _queue_expiry_secs: u64,
    ) -> Result<(), BrokerError> {
        self.push(queue, message).await;
        Ok(())
    }

    async fn await_message(&self, queue: &str) -> Result<(String, String), BrokerError> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(message) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) {
                    return Ok((queue.to_string(), message));
                }
            }
            self.notify.notified().await;
        }
    }

    async fn set_value(&self, key: &str, value: String, _key_expiry_secs: u64) -> Result<(), BrokerError> {
        self.state.lock().await.values.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_then_await_round_trips_a_message() {
        let broker = FakeBroker::new();
        broker
            .send_message("diameter-inbound", "payload".to_string(), 10)
            .await
            .unwrap();

        let (queue, message) = broker.await_message("diameter-inbound").await.unwrap();
        assert_eq!(queue, "diameter-inbound");
        assert_eq!(message, "payload");
    }

    #[tokio::test]
    async fn await_message_blocks_until_a_push_arrives() {
        let broker = FakeBroker::new();
        let waiter = broker.clone();

        let handle = tokio::spawn(async move { waiter.await_message("diameter-outbound-10.0.0.1-51000").await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        broker
            .push("diameter-outbound-10.0.0.1-51000", "hello")
            .await;

        let (queue, message) = handle.await.unwrap().unwrap();
        assert_eq!(queue, "diameter-outbound-10.0.0.1-51000");
        assert_eq!(message, "hello");
    }

    #[tokio::test]
    async fn set_value_is_readable_back() {
        let broker = FakeBroker::new();
        broker
            .set_value("ActiveDiameterPeers", "{}".to_string(), 86400)
            .await
            .unwrap();
        assert_eq!(broker.get_value("ActiveDiameterPeers").await.unwrap(), "{}");
    }
}
