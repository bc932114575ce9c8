use bytes::{Buf, Bytes, BytesMut};
use futures::{
    future::{select_all, BoxFuture},
    FutureExt,
};
use std::{io, net::SocketAddr};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};
use tracing::{debug, trace};

use cosim_common::constants::{KiB, MiB};

use crate::{Protocol, Transport};

#[derive(Debug, Clone)]
pub struct Config {
    /// Enables `TCP_NODELAY` on every stream.
    pub nodelay: bool,
    /// Maximum size of a single frame.
    pub max_frame_size: usize,
    /// Space reserved in the read buffer before every read.
    pub read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { nodelay: true, max_frame_size: 8 * MiB as usize, read_buffer_size: 8 * KiB as usize }
    }
}

/// A single TCP stream with length-delimited framing.
#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    codec: LengthDelimitedCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    /// Set once the peer closed the stream and the end-of-stream frame was yielded.
    closed: bool,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr, config: &Config) -> io::Result<Self> {
        stream.set_nodelay(config.nodelay)?;

        Ok(Self {
            stream,
            peer,
            codec: LengthDelimitedCodec::builder()
                .max_frame_length(config.max_frame_size)
                .new_codec(),
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            closed: false,
        })
    }

    /// Writes as much of the pending write buffer as the socket accepts without blocking.
    fn flush(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.try_write(&self.write_buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.write_buf.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    fn send(&mut self, frame: Bytes) -> io::Result<usize> {
        let len = frame.len();
        self.codec.encode(frame, &mut self.write_buf)?;
        self.flush()?;
        Ok(len)
    }

    /// Returns the next complete frame, or an empty frame once the peer closed the stream.
    fn next_frame(&mut self, read_buffer_size: usize) -> io::Result<Option<Bytes>> {
        if self.closed {
            return Ok(None);
        }

        if let Some(frame) = self.codec.decode(&mut self.read_buf)? {
            return Ok(Some(frame.freeze()));
        }

        loop {
            self.read_buf.reserve(read_buffer_size);
            match self.stream.try_read_buf(&mut self.read_buf) {
                Ok(0) => {
                    debug!(peer = %self.peer, "Connection closed by peer");
                    self.closed = true;
                    return Ok(Some(Bytes::new()));
                }
                Ok(n) => {
                    trace!(peer = %self.peer, n, "Read bytes");
                    if let Some(frame) = self.codec.decode(&mut self.read_buf)? {
                        return Ok(Some(frame.freeze()));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }
}

/// A connection-oriented TCP transport.
///
/// When bound, incoming connections are accepted lazily on every receive. Accepted streams are
/// kept separately from the outgoing stream created by [`Transport::connect`].
#[derive(Debug, Default)]
pub struct Tcp {
    config: Config,
    listener: Option<TcpListener>,
    /// The outgoing stream.
    stream: Option<Connection>,
    /// Streams accepted by the listener.
    accepted: Vec<Connection>,
}

impl Tcp {
    pub fn new(config: Config) -> Self {
        Self { config, listener: None, stream: None, accepted: Vec::new() }
    }

    /// Returns the peer addresses of all accepted connections.
    pub fn accepted(&self) -> Vec<SocketAddr> {
        self.accepted.iter().map(|c| c.peer).collect()
    }

    /// Returns the connected peer address, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().map(|c| c.peer)
    }

    fn accept_pending(&mut self) -> io::Result<()> {
        let Some(ref listener) = self.listener else {
            return Ok(());
        };

        while let Some(accepted) = listener.accept().now_or_never() {
            let (stream, addr) = accepted?;
            debug!(%addr, "Accepted connection");
            self.accepted.push(Connection::new(stream, addr, &self.config)?);
        }

        Ok(())
    }

    /// Waits until the listener has a connection to accept or any open stream has data to read.
    /// A connection accepted while waiting is kept and read on the next receive.
    pub async fn readable(&mut self) -> io::Result<()> {
        enum Ready {
            Accepted(TcpStream, SocketAddr),
            Stream,
        }

        let ready = {
            let mut waits: Vec<BoxFuture<'_, io::Result<Ready>>> = Vec::new();

            if let Some(ref listener) = self.listener {
                waits.push(listener.accept().map(|r| r.map(|(s, a)| Ready::Accepted(s, a))).boxed());
            }
            for conn in self.stream.iter().chain(self.accepted.iter()).filter(|c| !c.closed) {
                waits.push(conn.stream.readable().map(|r| r.map(|()| Ready::Stream)).boxed());
            }

            if waits.is_empty() {
                return Err(io::ErrorKind::NotConnected.into());
            }

            select_all(waits).await.0?
        };

        if let Ready::Accepted(stream, addr) = ready {
            debug!(%addr, "Accepted connection");
            self.accepted.push(Connection::new(stream, addr, &self.config)?);
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport<SocketAddr> for Tcp {
    type Error = io::Error;

    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        if let Some(ref listener) = self.listener {
            return listener.local_addr().ok();
        }

        self.stream.as_ref().and_then(|c| c.stream.local_addr().ok())
    }

    async fn bind(&mut self, addr: SocketAddr) -> Result<(), Self::Error> {
        if addr.ip().is_multicast() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot join a multicast group on a TCP socket",
            ));
        }

        let listener = TcpListener::bind(addr).await?;
        self.listener = Some(listener);

        Ok(())
    }

    async fn connect(&mut self, addr: SocketAddr) -> Result<(), Self::Error> {
        let stream = TcpStream::connect(addr).await?;
        self.stream = Some(Connection::new(stream, addr, &self.config)?);

        Ok(())
    }

    fn send(&mut self, frame: Bytes) -> Result<usize, Self::Error> {
        match self.stream {
            Some(ref mut conn) if !conn.closed => conn.send(frame),
            Some(_) => Err(io::ErrorKind::BrokenPipe.into()),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    fn recv_from(&mut self) -> Result<Option<(Bytes, SocketAddr)>, Self::Error> {
        self.accepted.retain(|c| !c.closed);
        self.accept_pending()?;

        let read_buffer_size = self.config.read_buffer_size;
        for conn in self.stream.iter_mut().chain(self.accepted.iter_mut()) {
            conn.flush()?;
            if let Some(frame) = conn.next_frame(read_buffer_size)? {
                return Ok(Some((frame, conn.peer)));
            }
        }

        Ok(None)
    }

    fn close(&mut self) {
        // Dropping the streams closes them.
        self.accepted.clear();
        self.stream = None;
        self.listener = None;
    }
}
