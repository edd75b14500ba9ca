//! # Error Types
//!
//! Comprehensive error handling for the packet transport core.
//!
//! This module defines all error variants that can occur during transport
//! operations, from low-level I/O errors to high-level protocol violations.
//!
//! ## Error Categories
//! - **I/O Errors**: Socket and file system failures
//! - **Protocol Errors**: Invalid headers, oversized frames, handshake failures
//! - **Cryptographic Errors**: Key exchange rejection, AEAD seal/open failures
//! - **Usage Errors**: Packet buffer underflow on `pop`
//!
//! All errors implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common error cases.
pub mod constants {
    /// Protocol validation errors
    pub const ERR_INVALID_HEADER: &str = "Invalid packet header";
    pub const ERR_OVERSIZED_PACKET: &str = "Packet body exceeds maximum size";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_ALREADY_STARTED: &str = "Interface already started";
    pub const ERR_RESOLVE_FAILED: &str = "Address resolution produced no candidates";

    /// Handshake errors
    pub const ERR_HANDSHAKE_TIMEOUT: &str = "Handshake deadline exceeded";
    pub const ERR_HANDSHAKE_SHORT_READ: &str = "Handshake blob truncated";
    pub const ERR_CHALLENGE_MISMATCH: &str = "Challenge verification failed";

    /// Cryptographic errors
    pub const ERR_WEAK_PEER_KEY: &str = "Peer public key rejected by key exchange";
    pub const ERR_RNG_UNAVAILABLE: &str = "OS random number generator unavailable";
}

/// ProtocolError is the primary error type for all transport operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid packet header")]
    InvalidHeader,

    #[error("Packet body too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Packet buffer underflow: need {need} bytes, body holds {have}")]
    BufferUnderflow { need: usize, have: usize },

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Key exchange failed: {0}")]
    KeyExchangeFailure(String),

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
