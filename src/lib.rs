//! # GameWire
//!
//! An encrypted, message-oriented TCP transport for multiplayer games.
//!
//! GameWire frames application messages as typed packets, protects every body
//! with XChaCha20-Poly1305 under per-connection keys from an X25519 handshake,
//! and hands completed packets across to the game-loop thread through a
//! blocking queue. The async machinery (tokio) stays inside the crate: the
//! public [`Client`] and [`Server`] surfaces are synchronous.
//!
//! ## Features
//!
//! - **Typed packets**: application-defined ID enums with LIFO push/pop of
//!   plain-old-data payloads
//! - **Authenticated encryption**: XChaCha20-Poly1305, random nonce per packet
//! - **Challenge handshake**: proves the peer speaks the protocol before any
//!   traffic is accepted, with a deadline on the exchange
//! - **Bounded frames**: peer-supplied sizes are validated before allocation
//! - **Game-loop friendly**: one shared inbound queue, poll or block, handler
//!   callbacks on the caller's thread
//!
//! ## Quick Start
//!
//! ```no_run
//! use gamewire::{Client, Packet};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! #[repr(u32)]
//! enum Msg {
//!     Ping = 1,
//! }
//!
//! impl gamewire::PacketId for Msg {
//!     fn to_wire(self) -> u32 {
//!         self as u32
//!     }
//!     fn from_wire(raw: u32) -> Option<Self> {
//!         match raw {
//!             1 => Some(Msg::Ping),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let mut client = Client::<Msg>::new();
//! client.connect("127.0.0.1", 60000)?;
//! client.send(Packet::with(Msg::Ping, 42u32));
//! # Ok::<(), gamewire::ProtocolError>(())
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod utils;

pub use crate::config::{ClientConfig, LoggingConfig, NetworkConfig, SecurityMode, ServerConfig};
pub use crate::core::codec::PacketCodec;
pub use crate::core::packet::{ConnectionId, OwnedPacket, Packet, PacketHeader, PacketId};
pub use crate::error::{ProtocolError, Result};
pub use crate::service::{
    Client, ConnectionEvent, ConnectionState, Server, ServerHandler, ServerLink,
};
pub use crate::utils::queue::BlockingQueue;

/// Library version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
