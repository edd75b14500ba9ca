//! # Challenge/Response Handshake
//!
//! The byte-level handshake exchanged before any framed traffic. It proves
//! that both peers run the same protocol and carries the public keys that
//! seed session-key derivation.
//!
//! Flow:
//! 1. The server generates a random challenge, scrambles it, and sends
//!    `{server_public_key, scrambled_challenge}` as a fixed 64-byte blob.
//! 2. The client unscrambles the challenge, substitutes its own public key,
//!    and returns `{client_public_key, challenge}`.
//! 3. The server checks the returned challenge equals the original value.
//!
//! The scramble is a liveness and compatibility check, not cryptographic
//! authentication: it proves the peer transformed the bytes correctly, nothing
//! more. Actual confidentiality comes from the key exchange the blob's public
//! keys feed into.

use crate::config::{CHALLENGE_LEN, HANDSHAKE_LEN, KEY_LEN};
use crate::error::{constants, ProtocolError, Result};
use rand_core::{OsRng, RngCore};
use tracing::debug;

/// Reversibly mix a challenge by reversing the byte order inside each 8-byte
/// block. Applying it twice reproduces the input.
pub fn scramble(data: &mut [u8; CHALLENGE_LEN]) {
    for block in data.chunks_exact_mut(8) {
        block.reverse();
    }
}

/// The fixed-size handshake blob: `[public_key: 32][challenge: 32]`, sent
/// without a length prefix before any packet framing begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeFrame {
    pub public_key: [u8; KEY_LEN],
    pub challenge: [u8; CHALLENGE_LEN],
}

impl HandshakeFrame {
    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut bytes = [0u8; HANDSHAKE_LEN];
        bytes[..KEY_LEN].copy_from_slice(&self.public_key);
        bytes[KEY_LEN..].copy_from_slice(&self.challenge);
        bytes
    }

    pub fn from_bytes(bytes: &[u8; HANDSHAKE_LEN]) -> Self {
        let mut public_key = [0u8; KEY_LEN];
        let mut challenge = [0u8; CHALLENGE_LEN];
        public_key.copy_from_slice(&bytes[..KEY_LEN]);
        challenge.copy_from_slice(&bytes[KEY_LEN..]);
        Self {
            public_key,
            challenge,
        }
    }
}

/// Server-side handshake state: the challenge value the client must return.
pub struct ServerChallenge {
    expected: [u8; CHALLENGE_LEN],
}

impl ServerChallenge {
    /// Generate a random challenge and build the frame to send: the server's
    /// public key plus the scrambled challenge.
    pub fn issue(server_public: [u8; KEY_LEN]) -> (Self, HandshakeFrame) {
        let mut expected = [0u8; CHALLENGE_LEN];
        OsRng.fill_bytes(&mut expected);

        let mut challenge = expected;
        scramble(&mut challenge);

        debug!("issued handshake challenge");
        (
            Self { expected },
            HandshakeFrame {
                public_key: server_public,
                challenge,
            },
        )
    }

    /// Verify the client's reply: the challenge must round-trip to the
    /// original value. On success yields the client's public key.
    pub fn verify(&self, reply: &HandshakeFrame) -> Result<[u8; KEY_LEN]> {
        if reply.challenge != self.expected {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_CHALLENGE_MISMATCH.into(),
            ));
        }
        Ok(reply.public_key)
    }
}

/// Client-side handshake step: unscramble the server's challenge and swap in
/// our own public key. Returns the server's public key and the reply frame.
pub fn answer(
    frame: &HandshakeFrame,
    client_public: [u8; KEY_LEN],
) -> ([u8; KEY_LEN], HandshakeFrame) {
    let mut challenge = frame.challenge;
    scramble(&mut challenge);

    (
        frame.public_key,
        HandshakeFrame {
            public_key: client_public,
            challenge,
        },
    )
}
