#![doc(issue_tracker_base_url = "https://github.com/chainbound/msg-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Wire format of packets exchanged between the outbound and inbound translators.
//!
//! A packet is a fixed-size [`QosHeader`] followed by the opaque application payload:
//!
//! ```text
//! +----------------+----------------------+----------------------+
//! | session id u32 | send timestamp u64   | payload ...          |
//! |   (4 bytes)    | (8 bytes, millis)    | (transport-framed)   |
//! +----------------+----------------------+----------------------+
//! ```
//!
//! All integers are big-endian. There is no length field, the transport framing delimits the
//! payload.

use thiserror::Error;

mod packet;
pub mod qos;

pub use packet::Packet;
pub use qos::{QosHeader, HEADER_SIZE};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Malformed QoS header: need {HEADER_SIZE} bytes, got {0}")]
    MalformedHeader(usize),
}
