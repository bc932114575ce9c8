use bytes::Bytes;
use std::{net::SocketAddr, sync::Arc};

use cosim_bridge::{Endpoint, Registrar};
use cosim_bus::{BusMessage, LocalBus, Scope};
use cosim_common::ManualClock;
use cosim_transport::memory::{LinkImpairment, MemoryNetwork};
use cosim_wire::{Packet, QosHeader};

pub const SERVER_ADDR: &str = "10.1.1.2:8080";

/// Two independent clocks and the shared simulation fixtures.
pub struct World {
    /// The network clock.
    pub net_clock: ManualClock,
    /// The bus clock.
    pub bus_clock: ManualClock,
    pub network: MemoryNetwork,
    pub bus: Arc<LocalBus>,
    pub registrar: Registrar<LocalBus>,
}

impl World {
    pub fn new(impairment: LinkImpairment) -> Self {
        let _ = tracing_subscriber::fmt::try_init();

        let net_clock = ManualClock::new(0);
        let bus_clock = ManualClock::new(0);
        let network = MemoryNetwork::with_impairment(Arc::new(net_clock.clone()), impairment);
        let bus = Arc::new(LocalBus::new("ns3", Arc::new(bus_clock.clone())));
        let registrar = Registrar::new(Arc::clone(&bus));

        Self { net_clock, bus_clock, network, bus, registrar }
    }

    /// Registers a plain (callback-less) endpoint, standing in for another federate.
    pub fn federate(&self, name: &str) -> Endpoint<LocalBus> {
        self.registrar.register(name, Scope::Global).unwrap()
    }
}

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

/// Encodes a packet frame with the given header fields.
pub fn frame(session_id: u32, timestamp_ms: u64, payload: &'static [u8]) -> Bytes {
    Packet::new(QosHeader::new(session_id, timestamp_ms), Bytes::from_static(payload)).encode()
}

/// Drains every message queued for `endpoint`.
pub fn drain(endpoint: &Endpoint<LocalBus>) -> Vec<BusMessage> {
    std::iter::from_fn(|| endpoint.get_message()).collect()
}
