//! Broker wire format: JSON envelopes carrying hex-encoded Diameter frames.

use serde::{Deserialize, Serialize};

/// Queue carrying every validated inbound frame, regardless of origin.
pub const INBOUND_QUEUE: &str = "diameter-inbound";

/// Registry snapshot key, refreshed at least once per maintenance tick.
pub const ACTIVE_PEERS_KEY: &str = "ActiveDiameterPeers";

/// Per-connection response queue name for a given client endpoint.
pub fn outbound_queue(client_address: &str, client_port: u16) -> String {
    format!("diameter-outbound-{client_address}-{client_port}")
}

/// Message published to [`INBOUND_QUEUE`] for each raw socket read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "diameter-inbound")]
    pub diameter_inbound: String,
    #[serde(rename = "inbound-received-timestamp")]
    pub inbound_received_timestamp: u128,
    #[serde(rename = "clientAddress")]
    pub client_address: String,
    #[serde(rename = "clientPort")]
    pub client_port: String,
}

impl InboundEnvelope {
    pub fn new(raw: &[u8], received_ns: u128, client_address: &str, client_port: u16) -> Self {
        Self {
            diameter_inbound: hex::encode(raw),
            inbound_received_timestamp: received_ns,
            client_address: client_address.to_string(),
            client_port: client_port.to_string(),
        }
    }
}

/// Message popped from a per-connection outbound queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "diameter-outbound")]
    pub diameter_outbound: String,
    #[serde(rename = "inbound-received-timestamp")]
    pub inbound_received_timestamp: u128,
}

impl OutboundEnvelope {
    /// Hex-decode the payload into raw frame bytes ready to write to the socket.
    pub fn decode(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.diameter_outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_envelope_field_names_match_wire_contract() {
        let env = InboundEnvelope::new(b"\x01\x02", 42, "10.0.0.1", 51000);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["diameter-inbound"], "0102");
        assert_eq!(json["inbound-received-timestamp"], 42);
        assert_eq!(json["clientAddress"], "10.0.0.1");
        assert_eq!(json["clientPort"], "51000");
    }

    #[test]
    fn outbound_envelope_round_trips_hex() {
        let raw = b"hello diameter".to_vec();
        let env = OutboundEnvelope {
            diameter_outbound: hex::encode(&raw),
            inbound_received_timestamp: 7,
        };
        assert_eq!(env.decode().unwrap(), raw);
    }

    #[test]
    fn outbound_queue_name_embeds_address_and_port() {
        assert_eq!(
            outbound_queue("10.0.0.1", 51000),
            "diameter-outbound-10.0.0.1-51000"
        );
    }
}
