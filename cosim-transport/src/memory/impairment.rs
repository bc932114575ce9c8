//! Link impairment configuration for the in-memory network.

/// Impairments applied to every packet crossing the in-memory network.
///
/// # Example
///
/// ```
/// use cosim_transport::memory::LinkImpairment;
///
/// // A lossy link with 20ms one-way delay.
/// let lossy = LinkImpairment { latency_ms: 20, loss: 5.0 };
/// assert!(lossy.is_lossy());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkImpairment {
    /// One-way delay added to every packet, in milliseconds of network time.
    pub latency_ms: u64,
    /// Packet loss percentage (0.0 to 100.0). Only applies to connectionless endpoints.
    pub loss: f64,
}

impl LinkImpairment {
    /// A link with fixed latency and no loss.
    pub const fn with_latency(latency_ms: u64) -> Self {
        Self { latency_ms, loss: 0.0 }
    }

    #[inline]
    pub fn is_lossy(&self) -> bool {
        self.loss > 0.0
    }

    /// Rolls the dice for a single packet.
    pub(crate) fn should_drop(&self) -> bool {
        self.is_lossy() && rand::random::<f64>() * 100.0 < self.loss
    }
}
