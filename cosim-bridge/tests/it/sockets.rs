use bytes::Bytes;
use std::{net::SocketAddr, sync::Arc, time::Duration};

use cosim_bridge::{ClientHelper, Server, ServerHelper};
use cosim_bus::{LocalBus, Scope};
use cosim_transport::{memory::LinkImpairment, Protocol, Socket};

use crate::common::{addr, drain, World};

/// Drives `server` until it forwarded a packet, like the host would on every readable event.
async fn read_one(server: &mut Server<Socket, SocketAddr, LocalBus>) -> usize {
    let forward = async {
        loop {
            let forwarded = server.handle_read();
            if forwarded > 0 {
                return forwarded;
            }
            server.transport_mut().readable().await.unwrap();
        }
    };

    tokio::time::timeout(Duration::from_secs(5), forward).await.expect("no packet within 5s")
}

async fn over_sockets(protocol: Protocol) {
    let world = World::new(LinkImpairment::default());
    let grid = world.federate("grid");
    let clock = Arc::new(world.net_clock.clone());

    let mut server = ServerHelper::new(protocol)
        .with_local(addr("127.0.0.1:0"))
        .install(&world.registrar, "server", "grid", Scope::Local, clock.clone())
        .await
        .unwrap();
    let local = server.local_addr().unwrap();
    assert_ne!(local.port(), 0);

    let mut client = ClientHelper::new(protocol, local)
        .install(&world.registrar, "client", Scope::Local, clock)
        .await
        .unwrap();
    assert!(client.is_running());

    world.net_clock.set(40);
    grid.send("client", Bytes::from_static(b"hello")).unwrap();
    world.bus.deliver();
    assert_eq!(client.process_deliveries(), 1);

    world.net_clock.set(100);
    assert_eq!(read_one(&mut server).await, 1);

    assert_eq!(server.metrics().max_delay(), 60);
    assert_eq!(server.total_rx(), 5 + 16);
    assert_eq!(drain(&grid)[0].payload(), &Bytes::from_static(b"hellowith delay time 60ms..."));

    client.stop();
    server.stop();
}

#[tokio::test]
async fn udp_sockets() {
    over_sockets(Protocol::Udp).await;
}

#[tokio::test]
async fn tcp_sockets() {
    over_sockets(Protocol::Tcp).await;
}

#[tokio::test]
async fn taken_name_fails_install() {
    let world = World::new(LinkImpairment::default());
    let clock = Arc::new(world.net_clock.clone());
    world.registrar.register("client", Scope::Local).unwrap();

    let err = ClientHelper::new(Protocol::Udp, addr("127.0.0.1:9"))
        .install(&world.registrar, "client", Scope::Local, clock)
        .await
        .unwrap_err();
    assert!(matches!(err, cosim_bridge::InstallError::Bus(_)));
}
