use bytes::Bytes;
use std::{io, net::SocketAddr};

use crate::{tcp::Tcp, udp::Udp, Protocol, Transport};

/// A real network socket whose protocol is picked at runtime from configuration.
#[derive(Debug)]
pub enum Socket {
    Tcp(Tcp),
    Udp(Udp),
}

impl Socket {
    /// Creates an unbound socket for the given protocol with default options.
    pub fn new(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Tcp => Self::Tcp(Tcp::default()),
            Protocol::Udp => Self::Udp(Udp::default()),
        }
    }

    /// Waits until the socket may have something to read. For TCP this includes a pending
    /// connection on the listener.
    pub async fn readable(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(tcp) => tcp.readable().await,
            Self::Udp(udp) => udp.readable().await,
        }
    }
}

impl From<Tcp> for Socket {
    fn from(tcp: Tcp) -> Self {
        Self::Tcp(tcp)
    }
}

impl From<Udp> for Socket {
    fn from(udp: Udp) -> Self {
        Self::Udp(udp)
    }
}

#[async_trait::async_trait]
impl Transport<SocketAddr> for Socket {
    type Error = io::Error;

    fn protocol(&self) -> Protocol {
        match self {
            Self::Tcp(t) => t.protocol(),
            Self::Udp(u) => u.protocol(),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(t) => t.local_addr(),
            Self::Udp(u) => u.local_addr(),
        }
    }

    async fn bind(&mut self, addr: SocketAddr) -> Result<(), Self::Error> {
        match self {
            Self::Tcp(t) => t.bind(addr).await,
            Self::Udp(u) => u.bind(addr).await,
        }
    }

    async fn connect(&mut self, addr: SocketAddr) -> Result<(), Self::Error> {
        match self {
            Self::Tcp(t) => t.connect(addr).await,
            Self::Udp(u) => u.connect(addr).await,
        }
    }

    fn send(&mut self, frame: Bytes) -> Result<usize, Self::Error> {
        match self {
            Self::Tcp(t) => t.send(frame),
            Self::Udp(u) => u.send(frame),
        }
    }

    fn recv_from(&mut self) -> Result<Option<(Bytes, SocketAddr)>, Self::Error> {
        match self {
            Self::Tcp(t) => t.recv_from(),
            Self::Udp(u) => u.recv_from(),
        }
    }

    fn close(&mut self) {
        match self {
            Self::Tcp(t) => t.close(),
            Self::Udp(u) => u.close(),
        }
    }
}
