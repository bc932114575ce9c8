/// Counters of the outbound translator.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientStats {
    /// Packets handed to the transport.
    sent: u64,
    /// Bytes handed to the transport, headers included.
    bytes_tx: u64,
    /// Packets the transport refused.
    send_failures: u64,
    /// Bus messages dropped because the client was not running.
    dropped_inactive: u64,
}

impl ClientStats {
    #[inline]
    pub(crate) fn increment_tx(&mut self, bytes: usize) {
        self.sent += 1;
        self.bytes_tx += bytes as u64;
    }

    #[inline]
    pub(crate) fn increment_send_failures(&mut self) {
        self.send_failures += 1;
    }

    #[inline]
    pub(crate) fn increment_dropped_inactive(&mut self) {
        self.dropped_inactive += 1;
    }

    #[inline]
    pub fn sent(&self) -> u64 {
        self.sent
    }

    #[inline]
    pub fn bytes_tx(&self) -> u64 {
        self.bytes_tx
    }

    #[inline]
    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }

    #[inline]
    pub fn dropped_inactive(&self) -> u64 {
        self.dropped_inactive
    }
}
