#![doc(issue_tracker_base_url = "https://github.com/chainbound/msg-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use cosim_bridge::*;
pub use cosim_bus::{BusError, BusMessage, EndpointId, LocalBus, MessageBus, Scope};
pub use cosim_common::{Clock, ManualClock, SystemClock};
pub use cosim_transport::{memory, tcp, udp, Address, Protocol, Socket, Transport};
pub use cosim_wire::{qos, Packet, QosHeader, HEADER_SIZE};
