//! # Protocol Logic
//!
//! The pre-framing handshake exchanged by every new connection.

pub mod handshake;
