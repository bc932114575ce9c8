#![doc(issue_tracker_base_url = "https://github.com/chainbound/msg-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use bytes::Bytes;
use std::{fmt::Debug, hash::Hash, net::SocketAddr, str::FromStr};
use thiserror::Error;

pub mod memory;
mod socket;
pub mod tcp;
pub mod udp;

pub use socket::Socket;

/// A transport address.
pub trait Address: Clone + Debug + Eq + Hash + Send + Sync + Unpin + 'static {}

impl Address for SocketAddr {}

/// The transport protocol family a translator runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Connection-oriented, stream based. Frames are length-delimited by the transport.
    Tcp,
    /// Connectionless, datagram based. One datagram is one packet.
    Udp,
}

impl Protocol {
    #[inline]
    pub const fn is_connection_oriented(self) -> bool {
        matches!(self, Self::Tcp)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown protocol: {0}")]
pub struct ProtocolError(pub String);

impl FromStr for Protocol {
    type Err = ProtocolError;

    /// Parses `tcp` / `udp`, as well as the socket factory names used by simulator scripts
    /// (`TcpSocketFactory`, `ns3::UdpSocketFactory`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.rsplit("::").next().unwrap_or(s);

        match name.to_ascii_lowercase().as_str() {
            "tcp" | "tcpsocketfactory" => Ok(Self::Tcp),
            "udp" | "udpsocketfactory" => Ok(Self::Udp),
            _ => Err(ProtocolError(s.to_owned())),
        }
    }
}

/// A packet transport.
///
/// Setup (`bind`, `connect`) is async and may fail fatally. The data path is non-blocking:
/// [`Transport::send`] either hands the frame to the network or fails, and
/// [`Transport::recv_from`] returns `Ok(None)` once no more frames are immediately available.
/// A zero-length frame signals end-of-stream from the peer.
#[async_trait::async_trait]
pub trait Transport<A: Address>: Send + Sync + Unpin + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the protocol of this transport.
    fn protocol(&self) -> Protocol;

    /// Returns the local address this transport is bound to, if any.
    fn local_addr(&self) -> Option<A>;

    /// Binds the transport to the given local address.
    async fn bind(&mut self, addr: A) -> Result<(), Self::Error>;

    /// Connects the transport to the given peer. Binds to an ephemeral local address of the
    /// matching family first if the transport is not bound yet.
    async fn connect(&mut self, addr: A) -> Result<(), Self::Error>;

    /// Sends a single frame to the connected peer, returning the number of bytes accepted.
    fn send(&mut self, frame: Bytes) -> Result<usize, Self::Error>;

    /// Returns the next immediately available frame and its source address.
    fn recv_from(&mut self) -> Result<Option<(Bytes, A)>, Self::Error>;

    /// Closes the transport. Further receives yield nothing.
    fn close(&mut self);
}
