use cosim_common::constants::KiB;

/// Returns the throughput in kbit/s for `total_bytes` received over `elapsed_ms`.
#[inline]
pub fn throughput_kbps(total_bytes: u64, elapsed_ms: u64) -> f64 {
    total_bytes as f64 * 8000.0 / elapsed_ms as f64 / KiB as f64
}

/// Running delay and throughput statistics of an inbound session.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Metrics {
    /// Number of accepted packets.
    received: u64,
    /// Accepted bytes, including per-packet overhead.
    total_bytes: u64,
    /// The cumulative average delay in milliseconds.
    avg_delay_ms: f64,
    max_delay_ms: u64,
    throughput_kbps: f64,
}

impl Metrics {
    /// Records one accepted packet. `elapsed_ms` is the time since the session epoch; the
    /// throughput keeps its previous value while no time has elapsed.
    pub(crate) fn record(&mut self, delay_ms: u64, bytes: u64, elapsed_ms: u64) {
        self.max_delay_ms = self.max_delay_ms.max(delay_ms);
        self.total_bytes += bytes;
        // CA = (delay + n * prev_ca) / (n + 1)
        self.avg_delay_ms =
            (self.avg_delay_ms * self.received as f64 + delay_ms as f64) / (self.received + 1) as f64;
        self.received += 1;

        if elapsed_ms > 0 {
            self.throughput_kbps = throughput_kbps(self.total_bytes, elapsed_ms);
        }
    }

    #[inline]
    pub fn received(&self) -> u64 {
        self.received
    }

    #[inline]
    pub fn total_bytes_received(&self) -> u64 {
        self.total_bytes
    }

    /// Average delay in milliseconds.
    #[inline]
    pub fn average_delay(&self) -> f64 {
        self.avg_delay_ms
    }

    /// Maximum delay in milliseconds.
    #[inline]
    pub fn max_delay(&self) -> u64 {
        self.max_delay_ms
    }

    /// Throughput in kbit/s since the session epoch.
    #[inline]
    pub fn throughput(&self) -> f64 {
        self.throughput_kbps
    }
}
