//! # Packet Cryptography
//!
//! Key generation, session-key derivation, and per-packet AEAD encryption.
//!
//! Two handlers protect packet bodies with XChaCha20-Poly1305:
//! - [`SessionCrypto`]: per-connection directional keys derived from an X25519
//!   key exchange seeded by the handshake's public-key swap
//! - [`PasswordCrypto`]: a single symmetric key derived from a shared
//!   password, for deployments that skip per-connection key exchange
//!
//! A fresh random 24-byte nonce is generated for every encrypted packet and
//! stored in the header; decryption zeroes it again, which is how downstream
//! code distinguishes ciphertext from plaintext bodies. Empty bodies pass
//! through both directions untouched.

use crate::config::{KEY_LEN, NONCE_LEN};
use crate::error::{constants, ProtocolError, Result};
use crate::core::packet::{Packet, PacketId};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

static INIT: OnceLock<bool> = OnceLock::new();

/// Process-wide cryptographic initialization. Probes the OS random number
/// generator once; subsequent calls are no-ops. Call at process start, before
/// constructing any client or server interface.
pub fn init() -> Result<()> {
    let ok = INIT.get_or_init(|| {
        let mut probe = [0u8; 16];
        OsRng.try_fill_bytes(&mut probe).is_ok()
    });

    if *ok {
        Ok(())
    } else {
        Err(ProtocolError::Custom(constants::ERR_RNG_UNAVAILABLE.into()))
    }
}

/// Which side of the key exchange this peer plays. Determines which derived
/// directional key encrypts and which decrypts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// An X25519 key pair. The private key never leaves this struct and is
/// zeroized on drop.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The 32-byte public key, safe to transmit.
    pub fn public_bytes(&self) -> [u8; KEY_LEN] {
        self.public.to_bytes()
    }
}

/// Derive one directional session key from the shared secret and both public
/// keys. The label separates the client-to-server and server-to-client
/// directions.
fn derive_directional_key(
    shared: &[u8; 32],
    client_public: &[u8; KEY_LEN],
    server_public: &[u8; KEY_LEN],
    label: &[u8],
) -> [u8; KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(label);
    hasher.update(shared);
    hasher.update(client_public);
    hasher.update(server_public);
    hasher.finalize().into()
}

/// Asymmetric packet crypto: per-connection directional keys from X25519.
///
/// The server's encrypt key equals the client's decrypt key and vice versa,
/// so the two sides agree without ever transmitting key material.
pub struct SessionCrypto {
    seal: XChaCha20Poly1305,
    open: XChaCha20Poly1305,
}

impl SessionCrypto {
    /// Derive both directional keys from our key pair and the peer's public
    /// key. Fails if the exchange produces a non-contributory shared secret
    /// (a malformed or low-order peer key).
    pub fn new(own: &KeyPair, peer_public: &[u8; KEY_LEN], role: Role) -> Result<Self> {
        let peer = PublicKey::from(*peer_public);
        let shared = own.secret.diffie_hellman(&peer);
        if !shared.was_contributory() {
            return Err(ProtocolError::KeyExchangeFailure(
                constants::ERR_WEAK_PEER_KEY.into(),
            ));
        }

        let (server_public, client_public) = match role {
            Role::Server => (own.public_bytes(), *peer_public),
            Role::Client => (*peer_public, own.public_bytes()),
        };

        let mut c2s =
            derive_directional_key(shared.as_bytes(), &client_public, &server_public, b"c2s");
        let mut s2c =
            derive_directional_key(shared.as_bytes(), &client_public, &server_public, b"s2c");

        let crypto = match role {
            Role::Server => Self {
                seal: XChaCha20Poly1305::new(Key::from_slice(&s2c)),
                open: XChaCha20Poly1305::new(Key::from_slice(&c2s)),
            },
            Role::Client => Self {
                seal: XChaCha20Poly1305::new(Key::from_slice(&c2s)),
                open: XChaCha20Poly1305::new(Key::from_slice(&s2c)),
            },
        };

        c2s.zeroize();
        s2c.zeroize();
        debug!(?role, "derived session keys");

        Ok(crypto)
    }

    /// Encrypt the packet body in place with a fresh nonce.
    pub fn encrypt<Id: PacketId>(&self, packet: &mut Packet<Id>) -> Result<()> {
        seal_body(&self.seal, packet)
    }

    /// Decrypt the packet body in place and zero the header nonce.
    pub fn decrypt<Id: PacketId>(&self, packet: &mut Packet<Id>) -> Result<()> {
        open_body(&self.open, packet)
    }
}

/// Symmetric packet crypto keyed by a password hash. Functionally identical
/// to [`SessionCrypto`] but both directions share one key, so any holder of
/// the password can read any packet.
pub struct PasswordCrypto {
    cipher: XChaCha20Poly1305,
}

impl PasswordCrypto {
    pub fn new(password: &str) -> Self {
        let mut key: [u8; KEY_LEN] = Sha256::digest(password.as_bytes()).into();
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        key.zeroize();
        Self { cipher }
    }

    /// Encrypt the packet body in place. A packet already marked encrypted is
    /// left alone.
    pub fn encrypt<Id: PacketId>(&self, packet: &mut Packet<Id>) -> Result<()> {
        if packet.header.is_encrypted() {
            return Ok(());
        }
        seal_body(&self.cipher, packet)
    }

    /// Decrypt the packet body in place. A plaintext packet is left alone.
    pub fn decrypt<Id: PacketId>(&self, packet: &mut Packet<Id>) -> Result<()> {
        if !packet.header.is_encrypted() {
            return Ok(());
        }
        open_body(&self.cipher, packet)
    }
}

/// The cipher a connection applies to its traffic, chosen by the configured
/// [`SecurityMode`](crate::config::SecurityMode).
pub enum PacketCipher {
    Session(SessionCrypto),
    Password(PasswordCrypto),
}

impl PacketCipher {
    pub fn encrypt<Id: PacketId>(&self, packet: &mut Packet<Id>) -> Result<()> {
        match self {
            Self::Session(crypto) => crypto.encrypt(packet),
            Self::Password(crypto) => crypto.encrypt(packet),
        }
    }

    pub fn decrypt<Id: PacketId>(&self, packet: &mut Packet<Id>) -> Result<()> {
        match self {
            Self::Session(crypto) => crypto.decrypt(packet),
            Self::Password(crypto) => crypto.decrypt(packet),
        }
    }
}

fn seal_body<Id: PacketId>(cipher: &XChaCha20Poly1305, packet: &mut Packet<Id>) -> Result<()> {
    // Nothing to protect and no tag to produce.
    if packet.is_empty() {
        return Ok(());
    }

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), packet.body.as_slice())
        .map_err(|_| ProtocolError::EncryptionFailure)?;

    packet.replace(&ciphertext);
    packet.header.nonce = nonce;
    Ok(())
}

fn open_body<Id: PacketId>(cipher: &XChaCha20Poly1305, packet: &mut Packet<Id>) -> Result<()> {
    if packet.is_empty() {
        return Ok(());
    }

    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(&packet.header.nonce),
            packet.body.as_slice(),
        )
        .map_err(|_| ProtocolError::DecryptionFailure)?;

    packet.replace(&plaintext);
    // Back to the plaintext marker; the packet is now indistinguishable from
    // one that was never encrypted.
    packet.header.nonce = [0u8; NONCE_LEN];
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TAG_LEN;

    fn session_pair() -> (SessionCrypto, SessionCrypto) {
        let server_keys = KeyPair::generate();
        let client_keys = KeyPair::generate();
        let server =
            SessionCrypto::new(&server_keys, &client_keys.public_bytes(), Role::Server)
                .expect("server keys");
        let client =
            SessionCrypto::new(&client_keys, &server_keys.public_bytes(), Role::Client)
                .expect("client keys");
        (server, client)
    }

    #[test]
    fn init_is_idempotent() {
        init().expect("first");
        init().expect("second");
    }

    #[test]
    fn session_encrypt_decrypt_roundtrip() {
        let (server, client) = session_pair();

        let mut packet = Packet::with(1u32, [0xAB_u8; 48]);
        let original = packet.clone();

        server.encrypt(&mut packet).expect("encrypt");
        assert!(packet.header.is_encrypted());
        assert_eq!(packet.len(), original.len() + TAG_LEN);
        assert_ne!(packet.body, original.body);

        client.decrypt(&mut packet).expect("decrypt");
        assert!(!packet.header.is_encrypted());
        assert_eq!(packet, original);
    }

    #[test]
    fn both_directions_work() {
        let (server, client) = session_pair();

        let mut up = Packet::with(2u32, 99u64);
        let expected = up.clone();
        client.encrypt(&mut up).expect("encrypt");
        server.decrypt(&mut up).expect("decrypt");
        assert_eq!(up, expected);
    }

    #[test]
    fn unrelated_session_cannot_decrypt() {
        let (server, _client) = session_pair();
        let (_other_server, other_client) = session_pair();

        let mut packet = Packet::with(3u32, 1234u32);
        server.encrypt(&mut packet).expect("encrypt");
        assert!(matches!(
            other_client.decrypt(&mut packet),
            Err(ProtocolError::DecryptionFailure)
        ));
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let (server, client) = session_pair();

        let mut packet = Packet::with(4u32, 5678u32);
        server.encrypt(&mut packet).expect("encrypt");
        packet.body[0] ^= 0xFF;
        packet.header.size = packet.body.len() as u32;

        assert!(matches!(
            client.decrypt(&mut packet),
            Err(ProtocolError::DecryptionFailure)
        ));
    }

    #[test]
    fn empty_body_passes_through() {
        let (server, client) = session_pair();

        let mut packet = Packet::new(5u32);
        server.encrypt(&mut packet).expect("encrypt");
        assert!(!packet.header.is_encrypted());
        assert!(packet.is_empty());

        client.decrypt(&mut packet).expect("decrypt");
        assert!(packet.is_empty());
    }

    #[test]
    fn low_order_peer_key_rejected() {
        let keys = KeyPair::generate();
        // The all-zero point is low order; the exchange must refuse it.
        let result = SessionCrypto::new(&keys, &[0u8; KEY_LEN], Role::Server);
        assert!(matches!(
            result,
            Err(ProtocolError::KeyExchangeFailure(_))
        ));
    }

    #[test]
    fn password_crypto_roundtrip() {
        let sender = PasswordCrypto::new("correct horse battery staple");
        let receiver = PasswordCrypto::new("correct horse battery staple");

        let mut packet = Packet::with(6u32, [7u8; 20]);
        let original = packet.clone();

        sender.encrypt(&mut packet).expect("encrypt");
        assert!(packet.header.is_encrypted());
        receiver.decrypt(&mut packet).expect("decrypt");
        assert_eq!(packet, original);
    }

    #[test]
    fn password_encrypt_skips_already_encrypted() {
        let crypto = PasswordCrypto::new("a shared secret");

        let mut packet = Packet::with(7u32, 1u32);
        crypto.encrypt(&mut packet).expect("first");
        let sealed = packet.clone();
        crypto.encrypt(&mut packet).expect("second");
        assert_eq!(packet, sealed);
    }

    #[test]
    fn wrong_password_fails() {
        let sender = PasswordCrypto::new("password one");
        let receiver = PasswordCrypto::new("password two");

        let mut packet = Packet::with(8u32, 42u32);
        sender.encrypt(&mut packet).expect("encrypt");
        assert!(receiver.decrypt(&mut packet).is_err());
    }
}
