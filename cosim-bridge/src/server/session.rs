use tracing::debug;

use cosim_wire::QosHeader;

use super::{DropReason, Metrics};

/// State of the inbound session: which sender was established, when, and the running metrics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionState {
    /// Session id of the first accepted packet.
    session_id: Option<u32>,
    /// Receive time of the packet that established the session.
    epoch_ms: u64,
    metrics: Metrics,
}

impl SessionState {
    /// Returns the established session id, if any.
    #[inline]
    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    /// Returns the receive time of the packet that established the session.
    #[inline]
    pub fn epoch_ms(&self) -> Option<u64> {
        self.session_id.map(|_| self.epoch_ms)
    }

    #[inline]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Checks `header` against the session, establishing it on the first valid packet.
    ///
    /// Packets from a different session than the established one are admitted as well, the
    /// session id is recorded, not enforced.
    pub(crate) fn admit(&mut self, header: &QosHeader, now_ms: u64) -> Result<(), DropReason> {
        if !header.has_session() {
            return Err(DropReason::UnsetSession);
        }

        match self.session_id {
            None => {
                if header.timestamp_ms() == 0 {
                    return Err(DropReason::InvalidTimestamp);
                }

                debug!(session_id = header.session_id(), epoch_ms = now_ms, "Session established");
                self.session_id = Some(header.session_id());
                self.epoch_ms = now_ms;
            }
            Some(established) if established != header.session_id() => {
                debug!(established, session_id = header.session_id(), "Packet from another session");
            }
            Some(_) => {}
        }

        Ok(())
    }

    /// Records an accepted packet received at `now_ms`.
    pub(crate) fn record(&mut self, delay_ms: u64, bytes: u64, now_ms: u64) {
        let elapsed_ms = now_ms.saturating_sub(self.epoch_ms);
        self.metrics.record(delay_ms, bytes, elapsed_ms);
    }

    /// Forgets the session and its metrics.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
