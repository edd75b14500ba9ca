//! # Core Transport Components
//!
//! Low-level packet handling and framing.
//!
//! This module provides the foundation for the transport: the packet data
//! model with its stack-like serialization helpers, and the codec that frames
//! packets over a byte stream.
//!
//! ## Components
//! - **Packet**: Header + body representation with push/pop serialization
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [id: 4] [size: 4] [nonce: 24] [body: size]
//! ```
//!
//! ## Security
//! - Maximum body size enforced before allocation (prevents memory exhaustion)
//! - A non-zero header nonce marks the body as AEAD ciphertext

pub mod codec;
pub mod packet;
