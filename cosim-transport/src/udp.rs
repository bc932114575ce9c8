use bytes::{Bytes, BytesMut};
use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
};
use tokio::net::UdpSocket;
use tracing::debug;

use cosim_common::constants::KiB;

use crate::{Protocol, Transport};

#[derive(Debug, Clone)]
pub struct Config {
    /// Space reserved for a single incoming datagram.
    pub recv_buffer_size: usize,
    /// Whether connected sockets may send to broadcast addresses.
    pub broadcast: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { recv_buffer_size: 64 * KiB as usize, broadcast: true }
    }
}

/// A connectionless UDP transport.
#[derive(Debug, Default)]
pub struct Udp {
    config: Config,
    socket: Option<UdpSocket>,
    peer: Option<SocketAddr>,
    recv_buf: BytesMut,
}

impl Udp {
    pub fn new(config: Config) -> Self {
        Self { config, socket: None, peer: None, recv_buf: BytesMut::new() }
    }

    /// Returns the connected peer address, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Waits until the socket has a datagram to read.
    pub async fn readable(&self) -> io::Result<()> {
        match self.socket {
            Some(ref socket) => socket.readable().await,
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }
}

#[async_trait::async_trait]
impl Transport<SocketAddr> for Udp {
    type Error = io::Error;

    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    async fn bind(&mut self, addr: SocketAddr) -> Result<(), Self::Error> {
        let socket = UdpSocket::bind(addr).await?;

        match addr.ip() {
            IpAddr::V4(group) if group.is_multicast() => {
                socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
                debug!(%group, "Joined multicast group");
            }
            IpAddr::V6(group) if group.is_multicast() => {
                socket.join_multicast_v6(&group, 0)?;
                debug!(%group, "Joined multicast group");
            }
            _ => {}
        }

        self.socket = Some(socket);

        Ok(())
    }

    async fn connect(&mut self, addr: SocketAddr) -> Result<(), Self::Error> {
        if self.socket.is_none() {
            let local: SocketAddr = match addr {
                SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
                SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
            };
            self.bind(local).await?;
        }

        let Some(ref socket) = self.socket else {
            return Err(io::ErrorKind::NotConnected.into());
        };

        socket.connect(addr).await?;
        if addr.is_ipv4() && self.config.broadcast {
            socket.set_broadcast(true)?;
        }
        // Sends are non-blocking, make sure the first one sees the socket as writable.
        socket.writable().await?;

        self.peer = Some(addr);

        Ok(())
    }

    fn send(&mut self, frame: Bytes) -> Result<usize, Self::Error> {
        let (Some(socket), Some(_)) = (self.socket.as_ref(), self.peer) else {
            return Err(io::ErrorKind::NotConnected.into());
        };

        socket.try_send(&frame)
    }

    fn recv_from(&mut self) -> Result<Option<(Bytes, SocketAddr)>, Self::Error> {
        let Some(ref socket) = self.socket else {
            return Ok(None);
        };

        self.recv_buf.reserve(self.config.recv_buffer_size);

        match socket.try_recv_buf_from(&mut self.recv_buf) {
            Ok((_, from)) => Ok(Some((self.recv_buf.split().freeze(), from))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        self.socket = None;
        self.peer = None;
    }
}
