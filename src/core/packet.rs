//! # Packet Representation
//!
//! Binary message representation: a fixed header plus a variable byte body
//! with stack-like push/pop serialization helpers.
//!
//! The body behaves as a byte stack: values are appended to the tail with
//! [`Packet::push`] and removed from the tail with [`Packet::pop`], so reads
//! must happen in the exact reverse order of writes (LIFO). Only fixed-layout
//! value types (`bytemuck::Pod`) can be pushed, which rules out anything with
//! pointers or owned resources at compile time.
//!
//! The header nonce doubles as the encryption marker: all zeroes means the
//! body is plaintext, anything else means the body is ciphertext and the nonce
//! is the per-message IV.

use crate::config::NONCE_LEN;
use crate::error::{ProtocolError, Result};
use bytemuck::Pod;
use std::fmt;

/// Stable integer identity of a connection, assigned by the owning server
/// interface. Queued packets reference their producer through this key rather
/// than a pointer, so a consumer can never dereference a dead connection.
pub type ConnectionId = u32;

/// Application-defined packet identifier, carried on the wire as a `u32`.
///
/// The transport core treats the id as opaque beyond equality; the application
/// usually implements this for a `#[repr(u32)]` enum of message kinds.
pub trait PacketId: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Convert to the 4-byte wire representation.
    fn to_wire(self) -> u32;
    /// Recover from the wire representation. `None` marks an id the
    /// application does not recognize and fails the frame as malformed.
    fn from_wire(raw: u32) -> Option<Self>;
}

impl PacketId for u32 {
    fn to_wire(self) -> u32 {
        self
    }

    fn from_wire(raw: u32) -> Option<Self> {
        Some(raw)
    }
}

/// Header sent at the beginning of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader<Id: PacketId> {
    /// Application-chosen message identifier.
    pub id: Id,
    /// Body length in bytes. Invariant: equals `body.len()` at all times.
    pub size: u32,
    /// Per-message IV when the body is encrypted; all zeroes for plaintext.
    pub nonce: [u8; NONCE_LEN],
}

impl<Id: PacketId> PacketHeader<Id> {
    /// Whether the body is marked as ciphertext. Decryption zeroes the nonce,
    /// so this flag is one-way: it answers "needs decryption", not "was ever
    /// encrypted".
    pub fn is_encrypted(&self) -> bool {
        self.nonce != [0u8; NONCE_LEN]
    }
}

/// A framed message: header plus variable-length byte body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet<Id: PacketId> {
    pub header: PacketHeader<Id>,
    pub body: Vec<u8>,
}

impl<Id: PacketId> Packet<Id> {
    /// Create an empty packet with the given id.
    pub fn new(id: Id) -> Self {
        Self {
            header: PacketHeader {
                id,
                size: 0,
                nonce: [0u8; NONCE_LEN],
            },
            body: Vec::new(),
        }
    }

    /// Create a packet with the given id and a single pushed value.
    pub fn with<T: Pod>(id: Id, value: T) -> Self {
        let mut packet = Self::new(id);
        packet.push(value);
        packet
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Append the raw bytes of a fixed-layout value to the body tail and
    /// update `header.size`.
    pub fn push<T: Pod>(&mut self, value: T) {
        self.body.extend_from_slice(bytemuck::bytes_of(&value));
        self.header.size = self.body.len() as u32;
    }

    /// Remove the most recently pushed `size_of::<T>()` bytes from the body
    /// tail and reinterpret them as `T`.
    ///
    /// The caller must pop in the exact reverse order of pushing. Popping a
    /// different type of the same size silently yields garbage; only an
    /// underflow (body shorter than `T`) is detected.
    pub fn pop<T: Pod>(&mut self) -> Result<T> {
        let need = std::mem::size_of::<T>();
        let have = self.body.len();
        if have < need {
            return Err(ProtocolError::BufferUnderflow { need, have });
        }

        let at = have - need;
        let value = bytemuck::pod_read_unaligned(&self.body[at..]);
        self.body.truncate(at);
        self.header.size = self.body.len() as u32;
        Ok(value)
    }

    /// Atomically substitute the entire body, resetting `header.size`. Used to
    /// swap plaintext for ciphertext after encryption and vice versa.
    pub fn replace(&mut self, bytes: &[u8]) {
        self.body.clear();
        self.body.extend_from_slice(bytes);
        self.header.size = bytes.len() as u32;
    }

    /// Clear the body and reset `header.size` to zero.
    pub fn clear(&mut self) -> &mut Self {
        self.body.clear();
        self.header.size = 0;
        self
    }
}

/// A packet annotated with the connection that produced it.
///
/// On a server the remote is the client that sent the packet; on a client the
/// remote is `None` (there is only one peer). The id is advisory: it stays
/// valid as a lookup key even after the connection closes, but resolving it
/// through the server's connection table may then fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedPacket<Id: PacketId> {
    pub remote: Option<ConnectionId>,
    pub packet: Packet<Id>,
}
