use bytes::Bytes;
use parking_lot::Mutex;
use std::{io, net::SocketAddr, num::NonZeroU32, sync::Arc};

use cosim_bridge::{Client, ClientError, ClientOptions, Deliveries, Endpoint};
use cosim_bus::{LocalBus, Scope};
use cosim_transport::{
    memory::{LinkImpairment, MemoryTransport},
    Protocol, Transport,
};
use cosim_wire::{Packet, HEADER_SIZE};

use crate::common::{addr, World, SERVER_ADDR};

/// A transport that connects fine but refuses every frame.
#[derive(Debug, Default)]
struct FailingTransport {
    local: Option<SocketAddr>,
}

#[async_trait::async_trait]
impl Transport<SocketAddr> for FailingTransport {
    type Error = io::Error;

    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    async fn bind(&mut self, addr: SocketAddr) -> Result<(), Self::Error> {
        self.local = Some(addr);
        Ok(())
    }

    async fn connect(&mut self, _addr: SocketAddr) -> Result<(), Self::Error> {
        Ok(())
    }

    fn send(&mut self, _frame: Bytes) -> Result<usize, Self::Error> {
        Err(io::ErrorKind::WouldBlock.into())
    }

    fn recv_from(&mut self) -> Result<Option<(Bytes, SocketAddr)>, Self::Error> {
        Ok(None)
    }

    fn close(&mut self) {}
}

struct Outbound {
    world: World,
    client: Client<MemoryTransport, SocketAddr, LocalBus>,
    /// Bound at the client's peer address.
    sink: MemoryTransport,
    grid: Endpoint<LocalBus>,
}

fn client_endpoint(world: &World) -> (Endpoint<LocalBus>, Deliveries) {
    world.registrar.register_with_delivery("client", Scope::Local).unwrap()
}

async fn outbound(options: ClientOptions) -> Outbound {
    let world = World::new(LinkImpairment::default());
    let grid = world.federate("grid");

    let mut sink = world.network.transport(Protocol::Udp);
    sink.bind(addr(SERVER_ADDR)).await.unwrap();

    let (endpoint, deliveries) = client_endpoint(&world);
    let mut client = Client::with_options(
        world.network.transport(Protocol::Udp),
        endpoint,
        Arc::new(world.net_clock.clone()),
        options,
    )
    .with_deliveries(deliveries);
    client.start(addr(SERVER_ADDR)).await.unwrap();

    Outbound { world, client, sink, grid }
}

impl Outbound {
    fn recv(&mut self) -> Option<Packet> {
        let (frame, _) = self.sink.recv_from().unwrap()?;
        Some(Packet::decode(frame).unwrap())
    }
}

#[tokio::test]
async fn bus_message_becomes_one_stamped_packet() {
    let mut t = outbound(ClientOptions::default().session_id(NonZeroU32::new(3).unwrap())).await;

    // The two clocks disagree on purpose: the header carries network time.
    t.world.bus_clock.set(9_000);
    t.world.net_clock.set(40);
    t.grid.send("ns3/client", Bytes::from_static(b"v=1.02")).unwrap();

    assert_eq!(t.world.bus.deliver(), 1);
    assert_eq!(t.client.process_deliveries(), 1);

    let packet = t.recv().unwrap();
    assert_eq!(packet.header().session_id(), 3);
    assert_eq!(packet.header().timestamp_ms(), 40);
    assert_eq!(packet.payload(), &Bytes::from_static(b"v=1.02"));
    assert_eq!(packet.size(), HEADER_SIZE + 6);
    assert!(t.recv().is_none());

    assert_eq!(t.client.sent(), 1);
    assert_eq!(t.client.stats().bytes_tx(), (HEADER_SIZE + 6) as u64);
}

#[tokio::test]
async fn deliveries_are_sent_in_bus_order() {
    let mut t = outbound(ClientOptions::default()).await;

    for (i, payload) in [&b"a"[..], &b"bb"[..], &b""[..], &b"dddd"[..]].into_iter().enumerate() {
        t.world.net_clock.set(10 * (i as u64 + 1));
        t.grid.send("client", Bytes::from_static(payload)).unwrap();
        t.world.bus.deliver();
        t.client.process_deliveries();
    }

    let packets: Vec<_> = std::iter::from_fn(|| t.recv()).collect();
    assert_eq!(packets.len(), 4);

    let sizes: Vec<_> = packets.iter().map(Packet::payload_size).collect();
    assert_eq!(sizes, [1, 2, 0, 4]);

    let stamps: Vec<_> = packets.iter().map(|p| p.header().timestamp_ms()).collect();
    assert_eq!(stamps, [10, 20, 30, 40]);

    assert!(packets.iter().all(|p| p.header().session_id() == 1));
    assert_eq!(t.client.sent(), 4);
}

#[tokio::test]
async fn batched_deliveries_are_drained_at_once() {
    let mut t = outbound(ClientOptions::default()).await;

    t.grid.send("client", Bytes::from_static(b"1")).unwrap();
    t.grid.send("client", Bytes::from_static(b"2")).unwrap();
    t.grid.send("client", Bytes::from_static(b"3")).unwrap();
    assert_eq!(t.world.bus.deliver(), 3);

    assert_eq!(t.client.process_deliveries(), 3);
    assert_eq!(t.client.process_deliveries(), 0);

    let payloads: Vec<_> = std::iter::from_fn(|| t.recv()).map(|p| p.payload().clone()).collect();
    assert_eq!(payloads, [Bytes::from_static(b"1"), Bytes::from_static(b"2"), Bytes::from_static(b"3")]);
}

#[tokio::test]
async fn refused_send_drops_the_message() {
    let world = World::new(LinkImpairment::default());
    let grid = world.federate("grid");
    let (endpoint, deliveries) = client_endpoint(&world);

    let mut client = Client::new(FailingTransport::default(), endpoint, Arc::new(world.net_clock.clone()))
        .with_deliveries(deliveries);
    client.start(addr(SERVER_ADDR)).await.unwrap();

    grid.send("client", Bytes::from_static(b"x")).unwrap();
    world.bus.deliver();

    assert_eq!(client.process_deliveries(), 0);
    assert_eq!(client.sent(), 0);
    assert_eq!(client.stats().send_failures(), 1);
    // Not retried.
    assert_eq!(client.process_deliveries(), 0);
    assert_eq!(client.stats().send_failures(), 1);
}

#[tokio::test]
async fn messages_are_dropped_while_stopped() {
    let mut t = outbound(ClientOptions::default()).await;

    t.client.stop();
    assert!(!t.client.is_running());

    t.grid.send("client", Bytes::from_static(b"x")).unwrap();
    t.world.bus.deliver();

    assert_eq!(t.client.process_deliveries(), 0);
    assert_eq!(t.client.stats().dropped_inactive(), 1);
    assert!(t.recv().is_none());
}

#[tokio::test]
async fn tx_hook_sees_sent_packets() {
    let world = World::new(LinkImpairment::default());
    let grid = world.federate("grid");

    let mut sink = world.network.transport(Protocol::Udp);
    sink.bind(addr(SERVER_ADDR)).await.unwrap();

    let seen: Arc<Mutex<Vec<Packet>>> = Arc::default();
    let observer = Arc::clone(&seen);

    let (endpoint, deliveries) = client_endpoint(&world);
    let mut client = Client::new(world.network.transport(Protocol::Udp), endpoint, Arc::new(world.net_clock.clone()))
        .with_deliveries(deliveries)
        .with_tx_hook(move |packet: &Packet| observer.lock().push(packet.clone()));
    client.start(addr(SERVER_ADDR)).await.unwrap();

    world.net_clock.set(7);
    grid.send("client", Bytes::from_static(b"hook")).unwrap();
    world.bus.deliver();
    client.process_deliveries();

    let (frame, _) = sink.recv_from().unwrap().unwrap();
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].encode(), frame);
}

#[tokio::test]
async fn double_start_is_rejected() {
    let mut t = outbound(ClientOptions::default()).await;

    assert!(matches!(t.client.start(addr(SERVER_ADDR)).await, Err(ClientError::AlreadyStarted)));
    assert_eq!(t.client.peer(), Some(&addr(SERVER_ADDR)));
}

#[tokio::test]
async fn tcp_connect_without_listener_fails() {
    let world = World::new(LinkImpairment::default());
    let (endpoint, _deliveries) = client_endpoint(&world);

    let mut client = Client::new(world.network.transport(Protocol::Tcp), endpoint, Arc::new(world.net_clock.clone()));
    assert!(matches!(client.start(addr(SERVER_ADDR)).await, Err(ClientError::Transport(_))));
    assert!(!client.is_running());
}
