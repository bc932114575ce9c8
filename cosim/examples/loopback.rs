//! A grid federate talking to itself across a simulated 20ms link.

use bytes::Bytes;
use std::sync::Arc;

use cosim::{
    memory::{LinkImpairment, MemoryNetwork},
    Client, LocalBus, ManualClock, Protocol, Registrar, Scope, Server, ServerOptions,
};

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    // The network and the bus each keep their own time.
    let net_clock = ManualClock::new(0);
    let bus_clock = ManualClock::new(0);

    let network = MemoryNetwork::with_impairment(Arc::new(net_clock.clone()), LinkImpairment::with_latency(20));
    let bus = Arc::new(LocalBus::new("ns3", Arc::new(bus_clock.clone())));
    let registrar = Registrar::new(Arc::clone(&bus));

    let grid = registrar.register("grid", Scope::Global).unwrap();

    let mut server = Server::new(
        network.transport(Protocol::Udp),
        registrar.register("server", Scope::Local).unwrap(),
        Arc::new(net_clock.clone()),
        ServerOptions::new("grid"),
    );
    server.start("0.0.0.0:8080".parse().unwrap()).await.unwrap();

    let (endpoint, deliveries) = registrar.register_with_delivery("client", Scope::Local).unwrap();
    let mut client = Client::new(network.transport(Protocol::Udp), endpoint, Arc::new(net_clock.clone()))
        .with_deliveries(deliveries);
    client.start("10.1.1.2:8080".parse().unwrap()).await.unwrap();

    for step in 1..=5u64 {
        net_clock.set(step * 100);
        bus_clock.set(step * 1000);

        grid.send("client", Bytes::from(format!("P={step}kW;"))).unwrap();
        bus.deliver();
        client.process_deliveries();

        // Let the link carry the packet.
        net_clock.advance(20);
        server.handle_read();

        while let Some(msg) = grid.get_message() {
            tracing::info!("Grid received: {}", String::from_utf8_lossy(msg.payload()));
        }
    }

    client.stop();
    server.stop();
}
