use bytes::Bytes;
use parking_lot::Mutex;
use std::{net::SocketAddr, sync::Arc};

use cosim_bridge::{throughput_kbps, DropReason, Outcome, Server, ServerOptions, TRANSPORT_OVERHEAD};
use cosim_bus::{LocalBus, Scope};
use cosim_transport::{
    memory::{LinkImpairment, MemoryTransport},
    Protocol, Transport,
};
use cosim_wire::Packet;

use crate::common::{addr, drain, frame, World, SERVER_ADDR};

struct Inbound {
    world: World,
    server: Server<MemoryTransport, SocketAddr, LocalBus>,
    /// Raw sender, to craft headers by hand.
    sender: MemoryTransport,
    /// Destination federate of forwarded messages.
    grid: cosim_bridge::Endpoint<LocalBus>,
}

async fn inbound() -> Inbound {
    let world = World::new(LinkImpairment::default());
    let grid = world.federate("grid");

    let endpoint = world.registrar.register("server", Scope::Local).unwrap();
    let mut server = Server::new(
        world.network.transport(Protocol::Udp),
        endpoint,
        Arc::new(world.net_clock.clone()),
        ServerOptions::new("grid"),
    );
    server.start(addr(SERVER_ADDR)).await.unwrap();

    let mut sender = world.network.transport(Protocol::Udp);
    sender.connect(addr(SERVER_ADDR)).await.unwrap();

    Inbound { world, server, sender, grid }
}

impl Inbound {
    /// Sends `frame` so that it is received at network time `recv_ms`.
    fn send_at(&mut self, recv_ms: u64, frame: Bytes) {
        self.world.net_clock.set(recv_ms);
        self.sender.send(frame).unwrap();
    }
}

#[tokio::test]
async fn three_packet_scenario() {
    let mut t = inbound().await;

    t.send_at(100, frame(3, 40, b"a"));
    assert_eq!(t.server.handle_read(), 1);
    t.send_at(150, frame(3, 90, b"b"));
    assert_eq!(t.server.handle_read(), 1);
    t.send_at(200, frame(3, 260, b"c"));
    assert_eq!(t.server.handle_read(), 0);

    let metrics = t.server.metrics();
    assert_eq!(metrics.received(), 2);
    assert_eq!(metrics.average_delay(), 60.0);
    assert_eq!(metrics.max_delay(), 60);
    assert_eq!(metrics.total_bytes_received(), 2 * (1 + TRANSPORT_OVERHEAD as u64));

    let forwarded = drain(&t.grid);
    assert_eq!(forwarded.len(), 2);
    assert_eq!(forwarded[0].payload(), &Bytes::from_static(b"awith delay time 60ms..."));
    assert_eq!(forwarded[0].source(), "ns3/server");
    assert_eq!(forwarded[1].payload(), &Bytes::from_static(b"bwith delay time 60ms..."));
}

#[tokio::test]
async fn throughput_is_measured_from_session_epoch() {
    let mut t = inbound().await;

    t.send_at(100, frame(3, 40, b"0123456789"));
    t.server.handle_read();
    // No time elapsed since the epoch yet.
    assert_eq!(t.server.metrics().throughput(), 0.0);

    t.send_at(300, frame(3, 250, b"0123456789"));
    t.server.handle_read();

    let total = 2 * (10 + TRANSPORT_OVERHEAD as u64);
    assert_eq!(t.server.total_rx(), total);
    assert_eq!(t.server.metrics().throughput(), throughput_kbps(total, 200));
    assert_eq!(t.server.session().epoch_ms(), Some(100));
}

#[tokio::test]
async fn zero_length_packet_halts_the_drain() {
    let mut t = inbound().await;

    t.world.net_clock.set(100);
    t.sender.send(frame(3, 40, b"first")).unwrap();
    t.sender.send(Bytes::new()).unwrap();
    t.sender.send(frame(3, 50, b"second")).unwrap();

    assert_eq!(t.server.handle_read(), 1);
    assert_eq!(drain(&t.grid).len(), 1);

    // The remaining backlog is picked up by the next invocation, in order.
    assert_eq!(t.server.handle_read(), 1);
    let rest = drain(&t.grid);
    assert_eq!(rest[0].payload(), &Bytes::from_static(b"secondwith delay time 50ms..."));
}

#[tokio::test]
async fn non_positive_delay_leaves_metrics_unchanged() {
    let mut t = inbound().await;

    t.send_at(100, frame(3, 40, b"seed"));
    t.server.handle_read();
    let before = t.server.metrics().clone();

    for timestamp_ms in [100, 101, u64::MAX] {
        assert_eq!(
            t.server.on_packet(frame(3, timestamp_ms, b"late"), addr("10.1.1.1:49152")),
            Outcome::Dropped(DropReason::NonPositiveDelay(
                i64::try_from(100i128 - i128::from(timestamp_ms)).unwrap_or(i64::MIN)
            ))
        );
    }

    assert_eq!(t.server.metrics(), &before);
    assert_eq!(drain(&t.grid).len(), 1);
}

#[tokio::test]
async fn zero_timestamp_cannot_open_a_session() {
    let mut t = inbound().await;
    let from = addr("10.1.1.1:49152");

    t.world.net_clock.set(100);
    assert_eq!(t.server.on_packet(frame(3, 0, b"x"), from), Outcome::Dropped(DropReason::InvalidTimestamp));
    assert_eq!(t.server.session().session_id(), None);

    assert_eq!(t.server.on_packet(frame(0, 40, b"x"), from), Outcome::Dropped(DropReason::UnsetSession));
    assert_eq!(t.server.session().session_id(), None);

    assert_eq!(t.server.on_packet(frame(3, 40, b"x"), from), Outcome::Forwarded { delay_ms: 60 });
    assert_eq!(t.server.session().session_id(), Some(3));
    assert_eq!(t.server.metrics().received(), 1);
}

#[tokio::test]
async fn other_sessions_are_still_processed() {
    let mut t = inbound().await;

    t.send_at(100, frame(3, 40, b"a"));
    assert_eq!(t.server.handle_read(), 1);
    t.send_at(150, frame(9, 120, b"b"));
    assert_eq!(t.server.handle_read(), 1);

    assert_eq!(t.server.session().session_id(), Some(3));
    assert_eq!(t.server.metrics().received(), 2);
    assert_eq!(t.server.metrics().max_delay(), 60);
    assert_eq!(t.server.metrics().average_delay(), 45.0);
}

#[tokio::test]
async fn malformed_header_is_discarded() {
    let mut t = inbound().await;

    t.send_at(100, Bytes::from_static(&[0, 0, 0, 3, 0]));
    t.sender.send(frame(3, 40, b"ok")).unwrap();

    // The malformed packet does not stop the drain.
    assert_eq!(t.server.handle_read(), 1);
    assert_eq!(t.server.metrics().received(), 1);
}

#[tokio::test]
async fn rx_hook_observes_accepted_packets() {
    let world = World::new(LinkImpairment::default());
    world.federate("grid");

    let seen: Arc<Mutex<Vec<(Packet, SocketAddr)>>> = Arc::default();
    let observer = Arc::clone(&seen);

    let endpoint = world.registrar.register("server", Scope::Local).unwrap();
    let mut server = Server::new(
        world.network.transport(Protocol::Udp),
        endpoint,
        Arc::new(world.net_clock.clone()),
        ServerOptions::new("grid"),
    )
    .with_rx_hook(move |packet: &Packet, from: &SocketAddr| observer.lock().push((packet.clone(), *from)));
    server.start(addr(SERVER_ADDR)).await.unwrap();

    let mut sender = world.network.transport(Protocol::Udp);
    sender.connect(addr(SERVER_ADDR)).await.unwrap();
    let from = sender.local_addr().unwrap();

    world.net_clock.set(100);
    sender.send(frame(3, 0, b"dropped")).unwrap();
    sender.send(frame(3, 40, b"accepted")).unwrap();
    server.handle_read();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.payload(), &Bytes::from_static(b"accepted"));
    assert_eq!(seen[0].0.header().timestamp_ms(), 40);
    assert_eq!(seen[0].1, from);
}

#[tokio::test]
async fn unknown_destination_still_records_metrics() {
    let world = World::new(LinkImpairment::default());

    let endpoint = world.registrar.register("server", Scope::Local).unwrap();
    let mut server = Server::new(
        world.network.transport(Protocol::Udp),
        endpoint,
        Arc::new(world.net_clock.clone()),
        ServerOptions::new("nowhere"),
    );
    server.start(addr(SERVER_ADDR)).await.unwrap();

    world.net_clock.set(100);
    assert_eq!(
        server.on_packet(frame(3, 40, b"x"), addr("10.1.1.1:49152")),
        Outcome::Undeliverable { delay_ms: 60 }
    );
    assert_eq!(server.metrics().received(), 1);
}

#[tokio::test]
async fn stop_closes_and_restart_resets_the_session() {
    let mut t = inbound().await;

    t.send_at(100, frame(3, 40, b"a"));
    assert_eq!(t.server.handle_read(), 1);

    t.server.stop();
    assert!(!t.server.is_running());
    assert_eq!(t.server.handle_read(), 0);
    assert_eq!(
        t.server.on_packet(frame(3, 40, b"a"), addr("10.1.1.1:49152")),
        Outcome::Dropped(DropReason::Inactive)
    );
    // Stopping keeps the final metrics readable.
    assert_eq!(t.server.metrics().received(), 1);

    t.server.start(addr(SERVER_ADDR)).await.unwrap();
    assert_eq!(t.server.metrics().received(), 0);
    assert_eq!(t.server.session().session_id(), None);

    t.send_at(300, frame(5, 280, b"b"));
    assert_eq!(t.server.handle_read(), 1);
    assert_eq!(t.server.session().session_id(), Some(5));
    assert_eq!(t.server.session().epoch_ms(), Some(300));
}

#[tokio::test]
async fn double_start_is_rejected() {
    let mut t = inbound().await;
    assert!(matches!(
        t.server.start(addr(SERVER_ADDR)).await,
        Err(cosim_bridge::ServerError::AlreadyStarted)
    ));
}
