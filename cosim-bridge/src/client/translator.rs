use std::{num::NonZeroU32, sync::Arc};
use tracing::{debug, info, warn};

use cosim_bus::{BusMessage, MessageBus};
use cosim_common::Clock;
use cosim_transport::{Address, Transport};
use cosim_wire::{Packet, QosHeader};

use super::{ClientError, ClientOptions, ClientStats};
use crate::{Deliveries, Delivery, Endpoint, TxHook};

/// The outbound translator: turns bus messages into QoS-tagged packets.
///
/// Every bus message received while running yields exactly one packet to the connected peer.
/// Nothing is buffered or retried, a refused send drops the message.
pub struct Client<T: Transport<A>, A: Address, B: MessageBus> {
    options: ClientOptions,
    transport: T,
    endpoint: Endpoint<B>,
    /// Deliveries for `endpoint`, if a delivery callback was attached.
    deliveries: Option<Deliveries>,
    /// The network clock. Header timestamps are always in the network domain.
    clock: Arc<dyn Clock>,
    /// The connected peer, set while running.
    peer: Option<A>,
    stats: ClientStats,
    hooks: Vec<Box<dyn TxHook>>,
}

impl<T, A, B> Client<T, A, B>
where
    T: Transport<A>,
    A: Address,
    B: MessageBus,
{
    /// Creates a new client with the default [`ClientOptions`].
    pub fn new(transport: T, endpoint: Endpoint<B>, clock: Arc<dyn Clock>) -> Self {
        Self::with_options(transport, endpoint, clock, ClientOptions::default())
    }

    pub fn with_options(
        transport: T,
        endpoint: Endpoint<B>,
        clock: Arc<dyn Clock>,
        options: ClientOptions,
    ) -> Self {
        Self {
            options,
            transport,
            endpoint,
            deliveries: None,
            clock,
            peer: None,
            stats: ClientStats::default(),
            hooks: Vec::new(),
        }
    }

    /// Attaches the delivery receiver of the endpoint, see
    /// [`Registrar::register_with_delivery`](crate::Registrar::register_with_delivery).
    pub fn with_deliveries(mut self, deliveries: Deliveries) -> Self {
        self.deliveries = Some(deliveries);
        self
    }

    /// Adds an observer for every packet handed to the transport.
    pub fn with_tx_hook<H: TxHook>(mut self, hook: H) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Connects the transport to `peer` and starts translating.
    pub async fn start(&mut self, peer: A) -> Result<(), ClientError> {
        if self.peer.is_some() {
            return Err(ClientError::AlreadyStarted);
        }

        self.transport.connect(peer.clone()).await.map_err(|e| ClientError::Transport(Box::new(e)))?;

        info!(
            endpoint = self.endpoint.name(),
            ?peer,
            protocol = %self.transport.protocol(),
            session_id = self.options.session_id.get(),
            "Client started"
        );
        self.peer = Some(peer);

        Ok(())
    }

    /// Closes the transport. Bus messages arriving afterwards are dropped.
    pub fn stop(&mut self) {
        if self.peer.take().is_none() {
            warn!(endpoint = self.endpoint.name(), "Client not running, nothing to stop");
            return;
        }

        self.transport.close();
        info!(endpoint = self.endpoint.name(), sent = self.stats.sent(), "Client stopped");
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.peer.is_some()
    }

    /// Handles every pending delivery of the endpoint, returning the number of packets sent.
    pub fn process_deliveries(&mut self) -> usize {
        let mut sent = 0;

        while let Some(delivery) = self.deliveries.as_mut().and_then(Deliveries::try_next) {
            if self.on_delivery(delivery) {
                sent += 1;
            }
        }

        sent
    }

    /// Fetches the message announced by `delivery` from the bus and translates it.
    pub fn on_delivery(&mut self, delivery: Delivery) -> bool {
        debug!(endpoint = %delivery.endpoint, bus_time_ms = delivery.time_ms, now_ms = self.clock.now_ms(), "Delivery");

        match self.endpoint.get_message() {
            Some(message) => self.on_bus_message(message),
            None => {
                warn!(endpoint = %delivery.endpoint, "Delivery without a queued message");
                false
            }
        }
    }

    /// Translates a bus message into a single packet and sends it to the peer.
    ///
    /// Returns `true` if the transport accepted the packet.
    pub fn on_bus_message(&mut self, message: BusMessage) -> bool {
        if self.peer.is_none() {
            warn!(source = message.source(), "Client not running, dropping bus message");
            self.stats.increment_dropped_inactive();
            return false;
        }

        let header = QosHeader::new(self.options.session_id.get(), self.clock.now_ms());
        let packet = Packet::new(header, message.into_payload());
        let size = packet.size();

        match self.transport.send(packet.encode()) {
            Ok(_) => {
                self.stats.increment_tx(size);
                for hook in &self.hooks {
                    hook.on_tx(&packet);
                }

                debug!(size, peer = ?self.peer, timestamp_ms = header.timestamp_ms(), "Sent packet");
                true
            }
            Err(e) => {
                self.stats.increment_send_failures();
                warn!(err = ?e, size, peer = ?self.peer, "Error while sending packet, dropping");
                false
            }
        }
    }

    #[inline]
    pub fn session_id(&self) -> NonZeroU32 {
        self.options.session_id
    }

    #[inline]
    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Returns the number of packets sent so far.
    #[inline]
    pub fn sent(&self) -> u64 {
        self.stats.sent()
    }

    #[inline]
    pub fn endpoint(&self) -> &Endpoint<B> {
        &self.endpoint
    }

    #[inline]
    pub fn peer(&self) -> Option<&A> {
        self.peer.as_ref()
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T, A, B> std::fmt::Debug for Client<T, A, B>
where
    T: Transport<A> + std::fmt::Debug,
    A: Address,
    B: MessageBus,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .field("transport", &self.transport)
            .field("endpoint", &self.endpoint.name())
            .field("peer", &self.peer)
            .field("stats", &self.stats)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
