//! # Packet Codec
//!
//! Tokio codec that frames [`Packet`]s over a byte stream.
//!
//! ## Wire Format
//! ```text
//! [id: 4] [size: 4] [nonce: 24] [body: size]
//! ```
//!
//! Integers are encoded in the host's native byte order, which ties both peers
//! to the same endianness. Mixed-endian deployments are unsupported.
//!
//! ## Security
//! The `size` field is validated against [`MAX_BODY_SIZE`] before any buffer
//! space is reserved, so an attacker-controlled length can never request an
//! unbounded allocation.

use crate::config::{HEADER_LEN, MAX_BODY_SIZE, NONCE_LEN};
use crate::core::packet::{Packet, PacketHeader, PacketId};
use crate::error::ProtocolError;
use bytes::{Buf, BufMut, BytesMut};
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

/// Decoder/encoder for the packet wire format.
///
/// The decoder runs a two-phase state machine (header, then body) so it
/// tolerates arbitrary fragmentation of the underlying stream.
pub struct PacketCodec<Id: PacketId> {
    pending: Option<PacketHeader<Id>>,
    _marker: PhantomData<Id>,
}

impl<Id: PacketId> PacketCodec<Id> {
    pub fn new() -> Self {
        Self {
            pending: None,
            _marker: PhantomData,
        }
    }
}

impl<Id: PacketId> Default for PacketCodec<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: PacketId> Decoder for PacketCodec<Id> {
    type Item = Packet<Id>;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending.take() {
            Some(header) => header,
            None => {
                if src.len() < HEADER_LEN {
                    src.reserve(HEADER_LEN - src.len());
                    return Ok(None);
                }

                let raw_id = u32::from_ne_bytes([src[0], src[1], src[2], src[3]]);
                let size = u32::from_ne_bytes([src[4], src[5], src[6], src[7]]);
                let mut nonce = [0u8; NONCE_LEN];
                nonce.copy_from_slice(&src[8..HEADER_LEN]);

                let id = Id::from_wire(raw_id).ok_or(ProtocolError::InvalidHeader)?;
                if size as usize > MAX_BODY_SIZE {
                    return Err(ProtocolError::OversizedPacket(size as usize));
                }

                src.advance(HEADER_LEN);
                PacketHeader { id, size, nonce }
            }
        };

        let size = header.size as usize;
        if src.len() < size {
            src.reserve(size - src.len());
            self.pending = Some(header);
            return Ok(None);
        }

        let body = src.split_to(size).to_vec();
        Ok(Some(Packet { header, body }))
    }
}

impl<Id: PacketId> Encoder<Packet<Id>> for PacketCodec<Id> {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet<Id>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        debug_assert_eq!(packet.header.size as usize, packet.body.len());

        if packet.body.len() > MAX_BODY_SIZE {
            return Err(ProtocolError::OversizedPacket(packet.body.len()));
        }

        dst.reserve(HEADER_LEN + packet.body.len());
        dst.put_slice(&packet.header.id.to_wire().to_ne_bytes());
        dst.put_slice(&packet.header.size.to_ne_bytes());
        dst.put_slice(&packet.header.nonce);
        dst.put_slice(&packet.body);
        Ok(())
    }
}
