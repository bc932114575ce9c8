use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use thiserror::Error;

use cosim_bus::{BusError, MessageBus, Scope};
use cosim_common::Clock;
use cosim_transport::{Protocol, Socket};

use crate::{Client, ClientError, ClientOptions, Registrar, Server, ServerError, ServerOptions};

/// Port the inbound translator listens on unless configured otherwise.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Builds running outbound translators over real sockets.
#[derive(Debug, Clone)]
pub struct ClientHelper {
    protocol: Protocol,
    peer: SocketAddr,
    options: ClientOptions,
}

impl ClientHelper {
    pub fn new(protocol: Protocol, peer: SocketAddr) -> Self {
        Self { protocol, peer, options: ClientOptions::default() }
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Registers the endpoint `name` with a delivery callback and starts a client connected to
    /// the configured peer.
    ///
    /// # Errors
    /// Fails if the name is taken or the socket cannot connect. Both are fatal setup errors.
    pub async fn install<B: MessageBus>(
        &self,
        registrar: &Registrar<B>,
        name: &str,
        scope: Scope,
        clock: Arc<dyn Clock>,
    ) -> Result<Client<Socket, SocketAddr, B>, InstallError> {
        let (endpoint, deliveries) = registrar.register_with_delivery(name, scope)?;

        let mut client =
            Client::with_options(Socket::new(self.protocol), endpoint, clock, self.options.clone())
                .with_deliveries(deliveries);
        client.start(self.peer).await?;

        Ok(client)
    }
}

/// Builds running inbound translators over real sockets.
#[derive(Debug, Clone)]
pub struct ServerHelper {
    protocol: Protocol,
    local: SocketAddr,
}

impl ServerHelper {
    /// Listens on all IPv4 interfaces on [`DEFAULT_SERVER_PORT`].
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol, local: (Ipv4Addr::UNSPECIFIED, DEFAULT_SERVER_PORT).into() }
    }

    pub fn with_local(mut self, local: SocketAddr) -> Self {
        self.local = local;
        self
    }

    /// Registers the endpoint `name` and starts a server forwarding to `destination`.
    ///
    /// # Errors
    /// Fails if the name is taken or the socket cannot bind. Both are fatal setup errors.
    pub async fn install<B: MessageBus>(
        &self,
        registrar: &Registrar<B>,
        name: &str,
        destination: &str,
        scope: Scope,
        clock: Arc<dyn Clock>,
    ) -> Result<Server<Socket, SocketAddr, B>, InstallError> {
        let endpoint = registrar.register(name, scope)?;

        let mut server =
            Server::new(Socket::new(self.protocol), endpoint, clock, ServerOptions::new(destination));
        server.start(self.local).await?;

        Ok(server)
    }
}
