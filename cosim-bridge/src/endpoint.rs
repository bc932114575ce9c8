use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, trace};

use cosim_bus::{BusError, BusMessage, EndpointId, MessageBus, Scope};

/// Replaces path separators in application names, which would otherwise clash with the
/// `<federate>/<name>` form of local endpoint names.
pub fn sanitize_name(name: &str) -> String {
    name.replace('/', "+")
}

/// A delivery event: a message for `endpoint` arrived at bus time `time_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub endpoint: EndpointId,
    pub time_ms: u64,
}

/// The receiving half of an endpoint's delivery callback.
#[derive(Debug)]
pub struct Deliveries {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Deliveries {
    /// Returns the next pending delivery without waiting.
    pub fn try_next(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

/// A registered bus endpoint. Holding one is proof of registration.
#[derive(Debug)]
pub struct Endpoint<B: MessageBus> {
    id: EndpointId,
    /// Full bus name.
    name: String,
    scope: Scope,
    bus: Arc<B>,
}

impl<B: MessageBus> Endpoint<B> {
    #[inline]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    #[inline]
    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    /// Sends `payload` to the endpoint named `destination`.
    pub fn send(&self, destination: &str, payload: Bytes) -> Result<(), BusError> {
        self.bus.send_message(self.id, destination, payload)
    }

    /// Takes the next message queued for this endpoint.
    pub fn get_message(&self) -> Option<BusMessage> {
        self.bus.get_message(self.id)
    }
}

/// Registers translator endpoints on a shared bus handle.
#[derive(Debug)]
pub struct Registrar<B: MessageBus> {
    bus: Arc<B>,
}

impl<B: MessageBus> Clone for Registrar<B> {
    fn clone(&self) -> Self {
        Self { bus: Arc::clone(&self.bus) }
    }
}

impl<B: MessageBus> Registrar<B> {
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    #[inline]
    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    /// Registers an endpoint without a delivery callback. Messages sent to it stay queued on
    /// the bus. Local names are sanitized with [`sanitize_name`], global names are kept as given.
    ///
    /// # Errors
    /// Fails if the name is already registered in the same scope.
    pub fn register(&self, name: &str, scope: Scope) -> Result<Endpoint<B>, BusError> {
        let id = match scope {
            Scope::Local => self.bus.register_endpoint(&sanitize_name(name), scope)?,
            Scope::Global => self.bus.register_endpoint(name, scope)?,
        };
        let name = self.bus.endpoint_name(id).ok_or(BusError::UnknownEndpoint(id))?;

        info!(endpoint = %id, %name, global = scope.is_global(), "Registered endpoint");

        Ok(Endpoint { id, name, scope, bus: Arc::clone(&self.bus) })
    }

    /// Registers an endpoint and attaches its delivery callback. Every message arriving for the
    /// endpoint produces one [`Delivery`] on the returned receiver, in bus order.
    pub fn register_with_delivery(
        &self,
        name: &str,
        scope: Scope,
    ) -> Result<(Endpoint<B>, Deliveries), BusError> {
        let endpoint = self.register(name, scope)?;
        let (tx, rx) = mpsc::unbounded_channel();

        self.bus.register_delivery_callback(
            endpoint.id,
            Box::new(move |endpoint, time_ms| {
                if tx.send(Delivery { endpoint, time_ms }).is_err() {
                    trace!(%endpoint, "Delivery receiver dropped");
                }
            }),
        )?;

        Ok((endpoint, Deliveries { rx }))
    }
}
