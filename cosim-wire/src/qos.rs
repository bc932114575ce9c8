use bytes::{Buf, BufMut};

use crate::Error;

/// Size of the encoded [`QosHeader`] in bytes.
pub const HEADER_SIZE: usize = 4 + 8;

/// Session and timing metadata carried in front of every packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct QosHeader {
    /// Identifies the sending translator. Zero means "not established".
    session_id: u32,
    /// Send time in the network clock domain, in milliseconds.
    timestamp_ms: u64,
}

impl QosHeader {
    #[inline]
    pub const fn new(session_id: u32, timestamp_ms: u64) -> Self {
        Self { session_id, timestamp_ms }
    }

    #[inline]
    pub const fn session_id(&self) -> u32 {
        self.session_id
    }

    #[inline]
    pub const fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Returns `true` if the header carries a session id.
    #[inline]
    pub const fn has_session(&self) -> bool {
        self.session_id != 0
    }

    /// Writes the header into `dst`.
    #[inline]
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u32(self.session_id);
        dst.put_u64(self.timestamp_ms);
    }

    /// Reads a header from the front of `src`, advancing it past the header.
    ///
    /// Nothing is consumed if `src` is too short.
    pub fn decode<B: Buf>(src: &mut B) -> Result<Self, Error> {
        if src.remaining() < HEADER_SIZE {
            tracing::trace!(remaining = src.remaining(), "not enough bytes for QoS header");
            return Err(Error::MalformedHeader(src.remaining()));
        }

        Ok(Self { session_id: src.get_u32(), timestamp_ms: src.get_u64() })
    }
}

/// Encodes a session id and timestamp into a fixed-size header block.
pub fn encode(session_id: u32, timestamp_ms: u64) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    QosHeader::new(session_id, timestamp_ms).encode(&mut &mut out[..]);
    out
}

/// Decodes the session id and timestamp from the front of `bytes`.
pub fn decode(mut bytes: &[u8]) -> Result<(u32, u64), Error> {
    let header = QosHeader::decode(&mut bytes)?;
    Ok((header.session_id, header.timestamp_ms))
}
