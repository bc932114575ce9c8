use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, QosHeader, HEADER_SIZE};

/// A network packet: a [`QosHeader`] followed by the application payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: QosHeader,
    /// The application payload.
    payload: Bytes,
}

impl Packet {
    #[inline]
    pub fn new(header: QosHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    #[inline]
    pub fn header(&self) -> &QosHeader {
        &self.header
    }

    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[inline]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// Returns the size of the packet on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    #[inline]
    pub fn into_parts(self) -> (QosHeader, Bytes) {
        (self.header, self.payload)
    }

    /// Encodes the packet into a single contiguous buffer.
    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.size());
        self.header.encode(&mut dst);
        dst.put_slice(&self.payload);
        dst.freeze()
    }

    /// Decodes a packet from a transport frame. The payload is a zero-copy slice of `frame`.
    pub fn decode(mut frame: Bytes) -> Result<Self, Error> {
        let header = QosHeader::decode(&mut frame)?;
        Ok(Self { header, payload: frame })
    }
}
