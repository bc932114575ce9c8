#![doc(issue_tracker_base_url = "https://github.com/chainbound/msg-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Translators between a packet network and a co-simulation message bus.
//!
//! * [`Client`] (outbound): bus message in, QoS-tagged packet out.
//! * [`Server`] (inbound): packet in, delay/throughput bookkeeping, annotated bus message out.
//!
//! Both translators are plain state machines. The host simulation invokes their handlers
//! ([`Client::process_deliveries`], [`Server::handle_read`]) whenever the respective event
//! source fires; every handler runs to completion and never blocks.

mod client;
mod endpoint;
mod helper;
mod hooks;
mod server;

pub use client::*;
pub use endpoint::*;
pub use helper::*;
pub use hooks::*;
pub use server::*;
