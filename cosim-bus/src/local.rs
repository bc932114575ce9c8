use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, trace};

use cosim_common::Clock;

use crate::{BusError, BusMessage, DeliveryCallback, EndpointId, MessageBus, Scope};

#[derive(Debug)]
struct Endpoint {
    /// Full bus name.
    name: String,
    queue: VecDeque<BusMessage>,
}

#[derive(Debug, Default)]
struct BusState {
    /// Full endpoint names to ids.
    names: FxHashMap<String, EndpointId>,
    endpoints: FxHashMap<EndpointId, Endpoint>,
    /// Delivery events not yet dispatched to callbacks, in send order.
    pending: VecDeque<(EndpointId, u64)>,
    next_id: u64,
}

/// An in-process message bus for a single federate.
///
/// Messages are queued on send and handed to delivery callbacks when the host calls
/// [`LocalBus::deliver`], one callback invocation per message. Callbacks run without any bus
/// lock held, so they may call back into the bus.
pub struct LocalBus {
    /// Name of the federate owning the local endpoint namespace.
    federate: String,
    /// The bus time source.
    clock: Arc<dyn Clock>,
    state: Mutex<BusState>,
    /// Written at registration time only.
    callbacks: RwLock<FxHashMap<EndpointId, Arc<dyn Fn(EndpointId, u64) + Send + Sync>>>,
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("federate", &self.federate)
            .field("clock", &self.clock)
            .field("state", &self.state)
            .field("callbacks", &self.callbacks.read().len())
            .finish()
    }
}

impl LocalBus {
    pub fn new(federate: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            federate: federate.into(),
            clock,
            state: Mutex::new(BusState::default()),
            callbacks: RwLock::new(FxHashMap::default()),
        }
    }

    #[inline]
    pub fn federate(&self) -> &str {
        &self.federate
    }

    /// Returns the full bus name an endpoint registered as `name` with `scope` ends up with.
    pub fn qualify(&self, name: &str, scope: Scope) -> String {
        match scope {
            Scope::Global => name.to_owned(),
            Scope::Local => format!("{}/{name}", self.federate),
        }
    }

    /// Returns the number of delivery events waiting for [`LocalBus::deliver`].
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Dispatches all pending delivery events to their callbacks, returning the number of
    /// callbacks invoked. Messages for endpoints without a callback stay queued for polling.
    pub fn deliver(&self) -> usize {
        let pending = std::mem::take(&mut self.state.lock().pending);
        let mut invoked = 0;

        for (id, time_ms) in pending {
            let callback = self.callbacks.read().get(&id).cloned();
            if let Some(callback) = callback {
                trace!(endpoint = %id, time_ms, "Delivering message");
                callback(id, time_ms);
                invoked += 1;
            }
        }

        invoked
    }

    fn resolve(&self, state: &BusState, destination: &str) -> Option<EndpointId> {
        state
            .names
            .get(destination)
            .or_else(|| state.names.get(&self.qualify(destination, Scope::Local)))
            .copied()
    }
}

impl MessageBus for LocalBus {
    fn register_endpoint(&self, name: &str, scope: Scope) -> Result<EndpointId, BusError> {
        if name.is_empty() {
            return Err(BusError::InvalidName(name.to_owned()));
        }

        let full_name = self.qualify(name, scope);
        let mut state = self.state.lock();

        if state.names.contains_key(&full_name) {
            return Err(BusError::DuplicateEndpoint(full_name));
        }

        let id = EndpointId::new(state.next_id);
        state.next_id += 1;
        state.names.insert(full_name.clone(), id);
        state.endpoints.insert(id, Endpoint { name: full_name.clone(), queue: VecDeque::new() });

        debug!(endpoint = %id, name = %full_name, ?scope, "Registered endpoint");

        Ok(id)
    }

    fn register_delivery_callback(
        &self,
        id: EndpointId,
        callback: DeliveryCallback,
    ) -> Result<(), BusError> {
        if !self.state.lock().endpoints.contains_key(&id) {
            return Err(BusError::UnknownEndpoint(id));
        }

        let mut callbacks = self.callbacks.write();
        if callbacks.contains_key(&id) {
            return Err(BusError::CallbackExists(id));
        }
        callbacks.insert(id, Arc::from(callback));

        Ok(())
    }

    fn endpoint_name(&self, id: EndpointId) -> Option<String> {
        self.state.lock().endpoints.get(&id).map(|e| e.name.clone())
    }

    fn get_message(&self, id: EndpointId) -> Option<BusMessage> {
        self.state.lock().endpoints.get_mut(&id)?.queue.pop_front()
    }

    fn send_message(&self, id: EndpointId, destination: &str, payload: Bytes) -> Result<(), BusError> {
        let time_ms = self.clock.now_ms();
        let mut state = self.state.lock();

        let source = state.endpoints.get(&id).ok_or(BusError::UnknownEndpoint(id))?.name.clone();
        let dest_id = self
            .resolve(&state, destination)
            .ok_or_else(|| BusError::UnknownDestination(destination.to_owned()))?;

        let Some(dest) = state.endpoints.get_mut(&dest_id) else {
            return Err(BusError::UnknownEndpoint(dest_id));
        };

        trace!(%source, destination = %dest.name, size = payload.len(), time_ms, "Queued message");
        dest.queue.push_back(BusMessage::new(source, dest.name.clone(), time_ms, payload));
        state.pending.push_back((dest_id, time_ms));

        Ok(())
    }
}
