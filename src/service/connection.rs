//! # Connection State Machine and I/O Loops
//!
//! A connection owns one socket, runs the handshake, and then pumps two
//! loops: a reader that turns the byte stream into framed, decrypted packets
//! pushed into the shared inbound queue, and a writer that drains the
//! per-connection outbound channel, encrypts, and writes frames. The writer
//! sends one packet at a time, so outbound order always equals send order.
//!
//! The lifecycle is an explicit state machine (`ConnectionState` +
//! `StateEvent` + a pure transition function) independent of the socket type;
//! the handshake drivers and loops are generic over any `AsyncRead +
//! AsyncWrite` transport so they can be exercised with in-memory pipes.

use crate::config::{SecurityMode, HANDSHAKE_LEN};
use crate::core::codec::PacketCodec;
use crate::core::packet::{ConnectionId, OwnedPacket, Packet, PacketId};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::{answer, HandshakeFrame, ServerChallenge};
use crate::utils::crypto::{KeyPair, PacketCipher, PasswordCrypto, Role, SessionCrypto};
use crate::utils::queue::BlockingQueue;
use futures::{SinkExt, StreamExt};
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

/// Lifecycle of a single peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    HandshakePending = 2,
    Connected = 3,
    Disconnecting = 4,
}

/// Events that drive [`ConnectionState::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// Client began a TCP connect.
    ConnectInitiated,
    /// Transport established (connect completed, or socket accepted); the
    /// handshake exchange starts now.
    TransportReady,
    HandshakeComplete,
    HandshakeFailed,
    IoError,
    DisconnectRequested,
    /// Socket closed and loops abandoned; terminal.
    Closed,
}

impl ConnectionState {
    /// Pure transition function. Events that do not apply to the current
    /// state leave it unchanged; a racing task may observe and report a
    /// condition the connection already moved past.
    pub fn transition(self, event: StateEvent) -> ConnectionState {
        use ConnectionState::*;
        use StateEvent::*;

        match (self, event) {
            (Disconnected, ConnectInitiated) => Connecting,
            // Server connections are accepted straight into the handshake.
            (Disconnected, TransportReady) => HandshakePending,
            (Connecting, TransportReady) => HandshakePending,
            (Connecting, IoError | DisconnectRequested) => Disconnecting,
            (HandshakePending, HandshakeComplete) => Connected,
            (HandshakePending, HandshakeFailed | IoError | DisconnectRequested) => Disconnecting,
            (Connected, IoError | DisconnectRequested) => Disconnecting,
            (Disconnecting, Closed) => Disconnected,
            (state, _) => state,
        }
    }
}

/// Connection state shared between the I/O tasks and the owning interface.
pub struct SharedState(AtomicU8);

impl SharedState {
    pub fn new(initial: ConnectionState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::HandshakePending,
            3 => ConnectionState::Connected,
            _ => ConnectionState::Disconnecting,
        }
    }

    /// Apply an event atomically and return the resulting state.
    pub fn apply(&self, event: StateEvent) -> ConnectionState {
        loop {
            let current = self.get();
            let next = current.transition(event);
            if current == next {
                return next;
            }
            if self
                .0
                .compare_exchange(
                    current as u8,
                    next as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return next;
            }
        }
    }
}

async fn read_handshake<S>(stream: &mut S, deadline: Duration) -> Result<HandshakeFrame>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; HANDSHAKE_LEN];
    match tokio::time::timeout(deadline, stream.read_exact(&mut buf)).await {
        Ok(Ok(_)) => Ok(HandshakeFrame::from_bytes(&buf)),
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(
            ProtocolError::HandshakeError(constants::ERR_HANDSHAKE_SHORT_READ.into()),
        ),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(ProtocolError::HandshakeError(
            constants::ERR_HANDSHAKE_TIMEOUT.into(),
        )),
    }
}

/// Responder side of the handshake: challenge the peer, verify its answer,
/// derive session keys.
pub(crate) async fn server_handshake<S>(
    stream: &mut S,
    keys: &KeyPair,
    deadline: Duration,
) -> Result<SessionCrypto>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (pending, frame) = ServerChallenge::issue(keys.public_bytes());
    stream.write_all(&frame.to_bytes()).await?;
    stream.flush().await?;

    let reply = read_handshake(stream, deadline).await?;
    let client_public = pending.verify(&reply)?;

    SessionCrypto::new(keys, &client_public, Role::Server)
}

/// Initiator side of the handshake: solve the challenge, send back our public
/// key, derive session keys.
pub(crate) async fn client_handshake<S>(
    stream: &mut S,
    keys: &KeyPair,
    deadline: Duration,
) -> Result<SessionCrypto>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = read_handshake(stream, deadline).await?;
    let (server_public, reply) = answer(&frame, keys.public_bytes());
    stream.write_all(&reply.to_bytes()).await?;
    stream.flush().await?;

    SessionCrypto::new(keys, &server_public, Role::Client)
}

/// Pick the packet cipher for the configured security mode. The handshake
/// always runs (it is the protocol liveness check); in password mode the
/// derived session keys are simply not used.
pub(crate) fn build_cipher(session: SessionCrypto, security: &SecurityMode) -> PacketCipher {
    match security {
        SecurityMode::KeyExchange => PacketCipher::Session(session),
        SecurityMode::Password { password } => {
            PacketCipher::Password(PasswordCrypto::new(password))
        }
    }
}

/// Everything a running connection needs besides its transport.
pub(crate) struct ConnectionParams<Id: PacketId> {
    /// Identity under which inbound packets are tagged; `None` on a client.
    pub id: Option<ConnectionId>,
    pub cipher: Arc<PacketCipher>,
    pub inbound: Arc<BlockingQueue<OwnedPacket<Id>>>,
    pub outbound: mpsc::UnboundedReceiver<Packet<Id>>,
    pub state: Arc<SharedState>,
}

/// Drive a validated connection until either direction ends.
///
/// Inbound: frame -> decrypt (a packet failing AEAD open is dropped, the
/// connection survives) -> shared queue. Outbound: channel -> encrypt ->
/// frame. Returns once the socket closes, the peer misbehaves at the framing
/// layer, or the outbound channel is dropped by the owning interface.
pub(crate) async fn run_connection<S, Id>(stream: S, params: ConnectionParams<Id>)
where
    S: AsyncRead + AsyncWrite + Unpin,
    Id: PacketId,
{
    let ConnectionParams {
        id,
        cipher,
        inbound,
        mut outbound,
        state,
    } = params;

    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, PacketCodec::<Id>::new());
    let mut writer = FramedWrite::new(write_half, PacketCodec::<Id>::new());

    let write_cipher = Arc::clone(&cipher);
    let writer_loop = async move {
        while let Some(mut packet) = outbound.recv().await {
            if let Err(e) = write_cipher.encrypt(&mut packet) {
                warn!(error = %e, "dropping outbound packet");
                continue;
            }
            writer.send(packet).await?;
        }
        // Channel closed: the owning interface requested disconnect.
        Ok::<_, ProtocolError>(())
    };

    let reader_loop = async {
        while let Some(item) = reader.next().await {
            let mut packet = item?;
            if packet.header.is_encrypted() {
                if let Err(e) = cipher.decrypt(&mut packet) {
                    warn!(?id, error = %e, "dropping undecryptable packet");
                    continue;
                }
            }
            inbound.push_back(OwnedPacket { remote: id, packet });
        }
        Err::<(), _>(ProtocolError::ConnectionClosed)
    };

    let result = tokio::select! {
        r = writer_loop => r,
        r = reader_loop => r,
    };

    match result {
        Ok(()) => {
            debug!(?id, "connection closed by local request");
            state.apply(StateEvent::DisconnectRequested);
        }
        Err(e) => {
            debug!(?id, error = %e, "connection ended");
            state.apply(StateEvent::IoError);
        }
    }
    state.apply(StateEvent::Closed);
}
