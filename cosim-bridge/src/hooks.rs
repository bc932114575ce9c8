//! Observation hooks for external instrumentation.
//!
//! Hooks see every packet a translator emits ([`TxHook`]) or accepts ([`RxHook`]). Any
//! `Fn` closure with the matching signature is a hook:
//!
//! ```rust,ignore
//! let client = client.with_tx_hook(|packet: &Packet| {
//!     println!("sent {} bytes", packet.size());
//! });
//! ```

use cosim_wire::Packet;

/// Called with every packet the outbound translator handed to the transport.
pub trait TxHook: Send + Sync + 'static {
    fn on_tx(&self, packet: &Packet);
}

impl<F> TxHook for F
where
    F: Fn(&Packet) + Send + Sync + 'static,
{
    fn on_tx(&self, packet: &Packet) {
        self(packet)
    }
}

/// Called with every packet the inbound translator accepted, and its source address.
pub trait RxHook<A>: Send + Sync + 'static {
    fn on_rx(&self, packet: &Packet, from: &A);
}

impl<A, F> RxHook<A> for F
where
    F: Fn(&Packet, &A) + Send + Sync + 'static,
{
    fn on_rx(&self, packet: &Packet, from: &A) {
        self(packet, from)
    }
}
