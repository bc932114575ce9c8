use thiserror::Error;

mod session;
mod stats;
mod translator;

pub use session::SessionState;
pub use stats::{throughput_kbps, Metrics};
pub use translator::Server;

/// Bytes added to every accepted payload to account for transport framing that is not part of
/// the payload itself.
pub const TRANSPORT_OVERHEAD: usize = 16;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Transport error: {0:?}")]
    Transport(#[from] Box<dyn std::error::Error + Send + Sync>),
    #[error("Server already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Full bus name of the endpoint accepted payloads are forwarded to.
    pub destination: String,
    /// Per-packet framing overhead added to the byte count.
    pub overhead_bytes: usize,
}

impl ServerOptions {
    pub fn new(destination: impl Into<String>) -> Self {
        Self { destination: destination.into(), overhead_bytes: TRANSPORT_OVERHEAD }
    }

    /// Sets the per-packet framing overhead added to the byte count.
    pub fn overhead_bytes(mut self, overhead_bytes: usize) -> Self {
        self.overhead_bytes = overhead_bytes;
        self
    }
}

/// Why a received packet was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The server is not running.
    Inactive,
    /// Shorter than a QoS header.
    MalformedHeader,
    /// Header without a session id. Such packets are never forwarded, not even once a session
    /// is established.
    UnsetSession,
    /// No session yet and the send timestamp cannot seed one.
    InvalidTimestamp,
    /// Receive time not after send time (clock skew or reordering).
    NonPositiveDelay(i64),
}

/// What happened to a single received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Accepted, recorded and forwarded to the bus.
    Forwarded { delay_ms: u64 },
    /// Accepted and recorded, but the bus refused the forwarded message.
    Undeliverable { delay_ms: u64 },
    /// The peer signalled end-of-stream.
    EndOfStream,
    /// Discarded without touching the metrics.
    Dropped(DropReason),
}
