//! # Utility Modules
//!
//! Supporting utilities for cryptography, cross-thread hand-off, logging, and
//! timing.
//!
//! ## Components
//! - **Crypto**: XChaCha20-Poly1305 AEAD packet encryption and X25519 key exchange
//! - **Queue**: Blocking MPMC hand-off queue between I/O and game threads
//! - **Logging**: Structured logging configuration
//! - **Timeout**: Async timeout wrappers
//!
//! ## Security
//! - Cryptographically secure RNG (OS-backed)
//! - Memory zeroing for key material (zeroize crate)

pub mod crypto;
pub mod logging;
pub mod queue;
pub mod timeout;

pub use queue::BlockingQueue;
