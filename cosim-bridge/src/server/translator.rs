use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use cosim_bus::MessageBus;
use cosim_common::Clock;
use cosim_transport::{Address, Transport};
use cosim_wire::Packet;

use super::{DropReason, Metrics, Outcome, ServerError, ServerOptions, SessionState};
use crate::{Endpoint, RxHook};

/// The inbound translator: turns received packets into annotated bus messages.
///
/// Every accepted packet updates the session [`Metrics`] and is forwarded to the configured
/// destination endpoint with its measured delay appended to the payload.
pub struct Server<T: Transport<A>, A: Address, B: MessageBus> {
    options: ServerOptions,
    transport: T,
    endpoint: Endpoint<B>,
    /// The network clock, the domain packet timestamps are expressed in.
    clock: Arc<dyn Clock>,
    session: SessionState,
    running: bool,
    hooks: Vec<Box<dyn RxHook<A>>>,
}

impl<T, A, B> Server<T, A, B>
where
    T: Transport<A>,
    A: Address,
    B: MessageBus,
{
    pub fn new(transport: T, endpoint: Endpoint<B>, clock: Arc<dyn Clock>, options: ServerOptions) -> Self {
        Self {
            options,
            transport,
            endpoint,
            clock,
            session: SessionState::default(),
            running: false,
            hooks: Vec::new(),
        }
    }

    /// Adds an observer for every accepted packet.
    pub fn with_rx_hook<H: RxHook<A>>(mut self, hook: H) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Binds the transport to `local` and starts accepting packets. A restart begins a fresh
    /// session.
    pub async fn start(&mut self, local: A) -> Result<(), ServerError> {
        if self.running {
            return Err(ServerError::AlreadyStarted);
        }

        self.transport.bind(local.clone()).await.map_err(|e| ServerError::Transport(Box::new(e)))?;
        self.session.reset();
        self.running = true;

        info!(
            endpoint = self.endpoint.name(),
            local = ?self.transport.local_addr().unwrap_or(local),
            protocol = %self.transport.protocol(),
            destination = %self.options.destination,
            "Server started"
        );

        Ok(())
    }

    /// Closes the transport and logs the session summary.
    pub fn stop(&mut self) {
        if !self.running {
            warn!(endpoint = self.endpoint.name(), "Server not running, nothing to stop");
            return;
        }

        self.running = false;
        self.transport.close();

        let metrics = self.session.metrics();
        info!(
            now_ms = self.clock.now_ms(),
            total_rx = metrics.total_bytes_received(),
            received = metrics.received(),
            session_id = ?self.session.session_id(),
            "Server stopped"
        );
        info!(
            avg_latency_ms = metrics.average_delay(),
            avg_throughput_kbps = metrics.throughput(),
            max_latency_ms = metrics.max_delay(),
            "Session summary"
        );
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Drains every packet immediately available from the transport, in receive order.
    /// Stops early at end-of-stream. Returns the number of packets forwarded to the bus.
    pub fn handle_read(&mut self) -> usize {
        let mut forwarded = 0;

        while self.running {
            let (frame, from) = match self.transport.recv_from() {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(e) => {
                    error!(err = ?e, "Error receiving from transport");
                    break;
                }
            };

            match self.on_packet(frame, from) {
                Outcome::Forwarded { .. } => forwarded += 1,
                Outcome::EndOfStream => break,
                Outcome::Undeliverable { .. } | Outcome::Dropped(_) => {}
            }
        }

        forwarded
    }

    /// Processes a single received frame.
    pub fn on_packet(&mut self, frame: Bytes, from: A) -> Outcome {
        if !self.running {
            return Outcome::Dropped(DropReason::Inactive);
        }

        if frame.is_empty() {
            debug!(?from, "End of stream");
            return Outcome::EndOfStream;
        }

        let size = frame.len();
        let packet = match Packet::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(err = %e, ?from, size, "Dropping packet");
                return Outcome::Dropped(DropReason::MalformedHeader);
            }
        };

        let now_ms = self.clock.now_ms();
        let header = *packet.header();
        trace!(?from, size, session_id = header.session_id(), timestamp_ms = header.timestamp_ms(), now_ms, "Received packet");

        if let Err(reason) = self.session.admit(&header, now_ms) {
            debug!(?from, ?reason, session_id = header.session_id(), timestamp_ms = header.timestamp_ms(), "Dropping packet");
            return Outcome::Dropped(reason);
        }

        let delay = i128::from(now_ms) - i128::from(header.timestamp_ms());
        if delay <= 0 {
            let delay = i64::try_from(delay).unwrap_or(i64::MIN);
            debug!(?from, delay_ms = delay, "Dropping packet with non-positive delay");
            return Outcome::Dropped(DropReason::NonPositiveDelay(delay));
        }
        // `now_ms` is a u64 and the timestamp is non-negative, so a positive delay fits.
        let delay_ms = delay as u64;

        let payload_size = packet.payload_size();
        self.session.record(delay_ms, (payload_size + self.options.overhead_bytes) as u64, now_ms);
        debug!(size = payload_size, delay_ms, "Accepted packet");

        for hook in &self.hooks {
            hook.on_rx(&packet, &from);
        }

        let message = annotate(packet.payload(), delay_ms);
        match self.endpoint.send(&self.options.destination, message) {
            Ok(()) => Outcome::Forwarded { delay_ms },
            Err(e) => {
                warn!(err = %e, destination = %self.options.destination, "Error forwarding to the bus");
                Outcome::Undeliverable { delay_ms }
            }
        }
    }

    #[inline]
    pub fn metrics(&self) -> &Metrics {
        self.session.metrics()
    }

    #[inline]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Returns the total number of bytes received, overhead included.
    #[inline]
    pub fn total_rx(&self) -> u64 {
        self.session.metrics().total_bytes_received()
    }

    #[inline]
    pub fn local_addr(&self) -> Option<A> {
        self.transport.local_addr()
    }

    #[inline]
    pub fn endpoint(&self) -> &Endpoint<B> {
        &self.endpoint
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the transport mutably, e.g. to wait for readiness before [`Server::handle_read`].
    #[inline]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[inline]
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }
}

/// Appends the human-readable delay annotation to a forwarded payload.
fn annotate(payload: &Bytes, delay_ms: u64) -> Bytes {
    let note = format!("with delay time {delay_ms}ms...");
    let mut out = BytesMut::with_capacity(payload.len() + note.len());
    out.put_slice(payload);
    out.put_slice(note.as_bytes());
    out.freeze()
}

impl<T, A, B> std::fmt::Debug for Server<T, A, B>
where
    T: Transport<A> + std::fmt::Debug,
    A: Address,
    B: MessageBus,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("options", &self.options)
            .field("transport", &self.transport)
            .field("endpoint", &self.endpoint.name())
            .field("session", &self.session)
            .field("running", &self.running)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
