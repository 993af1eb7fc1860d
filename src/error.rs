//! Error taxonomy for the Diameter front-end core.
//!
//! One enum per seam, matching the error-handling policy: config errors are
//! fatal at startup, everything else is logged and handled locally without
//! tearing down the whole process.

use thiserror::Error;

/// Fatal at startup: config file missing, unreadable, or invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} not found or unreadable: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid YAML: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unsupported transport {0:?}, only TCP is accepted")]
    UnsupportedTransport(String),

    #[error("hss.bind_ip must contain at least one address")]
    MissingBindAddress,
}

/// Advisory decode failure on an unvalidated first frame. Never fatal: the
/// caller discards the buffer and keeps reading.
#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("buffer too short to contain a Diameter header")]
    TooShort,

    #[error("AVP 264 (Origin-Host) not present in buffer")]
    MissingOriginHost,

    #[error("AVP 264 data is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("AVP length extends past end of buffer")]
    TruncatedAvp,
}

/// Broker transport errors. Always logged and retried by the caller; never
/// propagated to terminate a connection or the process.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("broker command failed: {0}")]
    Command(String),

    #[error("message on queue {queue} was not valid JSON: {source}")]
    Envelope {
        queue: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            BrokerError::Connection(err.to_string())
        } else {
            BrokerError::Command(err.to_string())
        }
    }
}

/// Per-connection read/write task termination. Ends the owning task, which
/// triggers first-completed teardown of its sibling, but is never process
/// fatal.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("socket read timed out after {0}s")]
    ReadTimeout(u64),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("outbound envelope malformed: {0}")]
    MalformedOutbound(String),
}
