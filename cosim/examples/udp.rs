//! The translators over real UDP sockets on localhost, timed by the wall clock.

use bytes::Bytes;
use std::{sync::Arc, time::Duration};

use cosim::{ClientHelper, LocalBus, Protocol, Registrar, Scope, ServerHelper, SystemClock};

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    let clock = Arc::new(SystemClock::new());
    let bus = Arc::new(LocalBus::new("ns3", clock.clone()));
    let registrar = Registrar::new(Arc::clone(&bus));
    let grid = registrar.register("grid", Scope::Global).unwrap();

    let mut server = ServerHelper::new(Protocol::Udp)
        .with_local("127.0.0.1:0".parse().unwrap())
        .install(&registrar, "server", "grid", Scope::Local, clock.clone())
        .await
        .unwrap();

    let mut client = ClientHelper::new(Protocol::Udp, server.local_addr().unwrap())
        .install(&registrar, "client", Scope::Local, clock)
        .await
        .unwrap();

    for i in 0..10 {
        tokio::time::sleep(Duration::from_millis(50)).await;

        grid.send("client", Bytes::from(format!("Message {i};"))).unwrap();
        bus.deliver();
        client.process_deliveries();

        // Loopback is fast, give the packet a measurable delay.
        tokio::time::sleep(Duration::from_millis(5)).await;
        server.transport_mut().readable().await.unwrap();
        server.handle_read();

        while let Some(msg) = grid.get_message() {
            tracing::info!("Grid received: {}", String::from_utf8_lossy(msg.payload()));
        }
    }

    client.stop();
    server.stop();
}
