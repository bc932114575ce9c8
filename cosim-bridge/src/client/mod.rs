use std::num::NonZeroU32;
use thiserror::Error;

mod stats;
mod translator;

pub use stats::ClientStats;
pub use translator::Client;

/// Session id stamped on outgoing packets when none is configured.
pub const DEFAULT_SESSION_ID: NonZeroU32 = NonZeroU32::MIN;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0:?}")]
    Transport(#[from] Box<dyn std::error::Error + Send + Sync>),
    #[error("Client already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The session id identifying this translator in every packet header.
    pub session_id: NonZeroU32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self { session_id: DEFAULT_SESSION_ID }
    }
}

impl ClientOptions {
    /// Sets the session id stamped on outgoing packets.
    pub fn session_id(mut self, session_id: NonZeroU32) -> Self {
        self.session_id = session_id;
        self
    }
}
