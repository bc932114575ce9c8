#![doc(issue_tracker_base_url = "https://github.com/chainbound/msg-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! The message bus side of the bridge: named endpoints exchanging time-stamped messages
//! between federated simulators.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

mod local;
pub use local::LocalBus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("Endpoint already registered: {0}")]
    DuplicateEndpoint(String),
    #[error("Invalid endpoint name: {0:?}")]
    InvalidName(String),
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(EndpointId),
    #[error("Unknown destination: {0}")]
    UnknownDestination(String),
    #[error("Delivery callback already registered for endpoint {0}")]
    CallbackExists(EndpointId),
}

/// Bus-assigned endpoint handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl EndpointId {
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visibility of an endpoint name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Scoped to the owning federate, addressable as `<federate>/<name>`.
    #[default]
    Local,
    /// Visible bus-wide under its bare name.
    Global,
}

impl Scope {
    #[inline]
    pub const fn from_global(is_global: bool) -> Self {
        if is_global {
            Self::Global
        } else {
            Self::Local
        }
    }

    #[inline]
    pub const fn is_global(self) -> bool {
        matches!(self, Self::Global)
    }
}

/// A message travelling over the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Full name of the sending endpoint.
    source: String,
    /// Full name of the destination endpoint.
    destination: String,
    /// Bus time at which the message was sent, in milliseconds.
    time_ms: u64,
    payload: Bytes,
}

impl BusMessage {
    pub fn new(source: String, destination: String, time_ms: u64, payload: Bytes) -> Self {
        Self { source, destination, time_ms, payload }
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    #[inline]
    pub fn time_ms(&self) -> u64 {
        self.time_ms
    }

    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[inline]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Invoked by the bus with the destination endpoint and the bus time whenever a message for
/// that endpoint arrives.
pub type DeliveryCallback = Box<dyn Fn(EndpointId, u64) + Send + Sync>;

/// The message bus collaborator.
pub trait MessageBus: Send + Sync + 'static {
    /// Registers a named endpoint. Names are unique per scope.
    fn register_endpoint(&self, name: &str, scope: Scope) -> Result<EndpointId, BusError>;

    /// Attaches the delivery callback of an endpoint. Only one callback per endpoint.
    fn register_delivery_callback(
        &self,
        id: EndpointId,
        callback: DeliveryCallback,
    ) -> Result<(), BusError>;

    /// Returns the full bus name of an endpoint.
    fn endpoint_name(&self, id: EndpointId) -> Option<String>;

    /// Takes the next queued message for the given endpoint.
    fn get_message(&self, id: EndpointId) -> Option<BusMessage>;

    /// Sends `payload` from endpoint `id` to the endpoint named `destination`.
    fn send_message(&self, id: EndpointId, destination: &str, payload: Bytes) -> Result<(), BusError>;
}
