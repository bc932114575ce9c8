//! An in-memory packet network driven by a simulation [`Clock`].
//!
//! Endpoints bind to [`SocketAddr`]s on a shared [`MemoryNetwork`]. A sent packet becomes
//! receivable once the network clock reaches its send time plus the configured latency, so a
//! discrete-event scheduler fully controls when data shows up. Receive order equals send order
//! per destination.

use bytes::Bytes;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::{
    collections::VecDeque,
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
};
use tracing::{debug, trace};

use cosim_common::Clock;

use crate::{Protocol, Transport};

mod impairment;
pub use impairment::LinkImpairment;

/// First port handed out for ephemeral binds.
const EPHEMERAL_PORT_START: u16 = 49152;

#[derive(Debug)]
struct InFlight {
    deliver_at_ms: u64,
    from: SocketAddr,
    payload: Bytes,
}

#[derive(Debug)]
struct Inbox {
    protocol: Protocol,
    queue: VecDeque<InFlight>,
}

#[derive(Debug)]
struct NetworkState {
    inboxes: FxHashMap<SocketAddr, Inbox>,
    impairment: LinkImpairment,
    next_port: u16,
    dropped: usize,
}

impl NetworkState {
    /// Resolves the inbox address for `to`: an exact bind wins over a wildcard bind on the same
    /// port.
    fn resolve(&self, to: SocketAddr) -> Option<SocketAddr> {
        if self.inboxes.contains_key(&to) {
            return Some(to);
        }

        let wildcard = SocketAddr::new(unspecified(to.ip()), to.port());
        self.inboxes.contains_key(&wildcard).then_some(wildcard)
    }
}

/// A shared in-memory network. Cloning yields another handle to the same network.
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
    clock: Arc<dyn Clock>,
}

impl MemoryNetwork {
    /// Creates a network without impairments, timed by `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_impairment(clock, LinkImpairment::default())
    }

    pub fn with_impairment(clock: Arc<dyn Clock>, impairment: LinkImpairment) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState {
                inboxes: FxHashMap::default(),
                impairment,
                next_port: EPHEMERAL_PORT_START,
                dropped: 0,
            })),
            clock,
        }
    }

    /// Creates an unbound transport on this network.
    pub fn transport(&self, protocol: Protocol) -> MemoryTransport {
        MemoryTransport { network: self.clone(), protocol, local: None, peer: None }
    }

    pub fn set_impairment(&self, impairment: LinkImpairment) {
        self.state.lock().impairment = impairment;
    }

    /// Returns the network clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the number of packets sent but not yet received, across all endpoints.
    pub fn in_flight(&self) -> usize {
        self.state.lock().inboxes.values().map(|i| i.queue.len()).sum()
    }

    /// Returns the number of packets lost to impairments or missing receivers.
    pub fn dropped(&self) -> usize {
        self.state.lock().dropped
    }

    fn bind(&self, addr: SocketAddr, protocol: Protocol) -> io::Result<SocketAddr> {
        let mut state = self.state.lock();

        let addr = if addr.port() == 0 {
            let mut port = state.next_port;
            while state.inboxes.contains_key(&SocketAddr::new(addr.ip(), port)) {
                port = port.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
            }
            state.next_port = port.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
            SocketAddr::new(addr.ip(), port)
        } else {
            addr
        };

        if state.inboxes.contains_key(&addr) {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, format!("{addr} already bound")));
        }

        state.inboxes.insert(addr, Inbox { protocol, queue: VecDeque::new() });
        debug!(%addr, %protocol, "Bound in-memory endpoint");

        Ok(addr)
    }

    fn unbind(&self, addr: SocketAddr) {
        self.state.lock().inboxes.remove(&addr);
    }

    fn is_listening(&self, addr: SocketAddr, protocol: Protocol) -> bool {
        let state = self.state.lock();
        state.resolve(addr).and_then(|a| state.inboxes.get(&a)).is_some_and(|i| i.protocol == protocol)
    }

    fn send(&self, from: SocketAddr, to: SocketAddr, payload: Bytes, protocol: Protocol) -> io::Result<usize> {
        let len = payload.len();
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        let Some(addr) = state.resolve(to) else {
            if protocol.is_connection_oriented() {
                return Err(io::ErrorKind::BrokenPipe.into());
            }

            // Nobody listening, the datagram is lost.
            trace!(%to, "No receiver bound, dropping datagram");
            state.dropped += 1;
            return Ok(len);
        };

        let impairment = state.impairment;
        if !protocol.is_connection_oriented() && impairment.should_drop() {
            trace!(%from, %to, "Packet lost on link");
            state.dropped += 1;
            return Ok(len);
        }

        if let Some(inbox) = state.inboxes.get_mut(&addr) {
            inbox.queue.push_back(InFlight {
                deliver_at_ms: now.saturating_add(impairment.latency_ms),
                from,
                payload,
            });
        }

        Ok(len)
    }

    fn recv(&self, addr: SocketAddr) -> Option<(Bytes, SocketAddr)> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let inbox = state.inboxes.get_mut(&addr)?;

        if inbox.queue.front().is_some_and(|p| p.deliver_at_ms <= now) {
            return inbox.queue.pop_front().map(|p| (p.payload, p.from));
        }

        None
    }
}

const fn unspecified(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// A transport endpoint on a [`MemoryNetwork`].
///
/// In connection-oriented mode, connecting requires a listener at the peer address and closing
/// delivers an end-of-stream (empty) packet to the peer.
#[derive(Debug)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    protocol: Protocol,
    local: Option<SocketAddr>,
    peer: Option<SocketAddr>,
}

impl MemoryTransport {
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

#[async_trait::async_trait]
impl Transport<SocketAddr> for MemoryTransport {
    type Error = io::Error;

    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    async fn bind(&mut self, addr: SocketAddr) -> Result<(), Self::Error> {
        if let Some(local) = self.local.take() {
            self.network.unbind(local);
        }

        self.local = Some(self.network.bind(addr, self.protocol)?);

        Ok(())
    }

    async fn connect(&mut self, addr: SocketAddr) -> Result<(), Self::Error> {
        if self.protocol.is_connection_oriented() && !self.network.is_listening(addr, self.protocol) {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }

        if self.local.is_none() {
            self.bind(SocketAddr::new(unspecified(addr.ip()), 0)).await?;
        }

        self.peer = Some(addr);

        Ok(())
    }

    fn send(&mut self, frame: Bytes) -> Result<usize, Self::Error> {
        let (Some(local), Some(peer)) = (self.local, self.peer) else {
            return Err(io::ErrorKind::NotConnected.into());
        };

        self.network.send(local, peer, frame, self.protocol)
    }

    fn recv_from(&mut self) -> Result<Option<(Bytes, SocketAddr)>, Self::Error> {
        Ok(self.local.and_then(|local| self.network.recv(local)))
    }

    fn close(&mut self) {
        if let (Some(local), Some(peer)) = (self.local, self.peer) {
            if self.protocol.is_connection_oriented() {
                let _ = self.network.send(local, peer, Bytes::new(), self.protocol);
            }
        }

        if let Some(local) = self.local.take() {
            self.network.unbind(local);
        }
        self.peer = None;
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}
