//! # Client Interface
//!
//! Single-connection consumer: connects, exposes an incoming-packet queue,
//! exposes send.
//!
//! The client owns a dedicated tokio runtime whose worker thread is the event
//! loop; the application (game-loop) thread never blocks on socket I/O, only
//! on the incoming queue if it chooses to. `connect` reports success for the
//! *initiation* of the connection: the handshake completes asynchronously and
//! "connected" becomes observable through [`Client::is_connected`].

use crate::config::ClientConfig;
use crate::core::packet::{OwnedPacket, Packet, PacketId};
use crate::error::{constants, ProtocolError, Result};
use crate::service::connection::{
    build_cipher, client_handshake, run_connection, ConnectionParams, ConnectionState,
    SharedState, StateEvent,
};
use crate::utils::crypto::{self, KeyPair};
use crate::utils::queue::BlockingQueue;
use crate::utils::timeout::{with_timeout_error, DEFAULT_TIMEOUT};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Client-side endpoint of the packet transport.
pub struct Client<Id: PacketId> {
    config: ClientConfig,
    runtime: Option<Runtime>,
    incoming: Arc<BlockingQueue<OwnedPacket<Id>>>,
    outbound: Option<mpsc::UnboundedSender<Packet<Id>>>,
    state: Arc<SharedState>,
}

impl<Id: PacketId> Client<Id> {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            runtime: None,
            incoming: Arc::new(BlockingQueue::new()),
            outbound: None,
            state: Arc::new(SharedState::new(ConnectionState::Disconnected)),
        }
    }

    /// Resolve the address and initiate a connection attempt.
    ///
    /// Returns `Ok` once the attempt is underway; the TCP connect and the
    /// handshake complete asynchronously on the client's event loop. Treat
    /// "connected" as "handshake completed", observable via
    /// [`Client::is_connected`].
    ///
    /// Connecting replaces the incoming queue and discards anything still
    /// queued from a previous session; re-fetch it via [`Client::incoming`].
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.runtime.is_some() {
            return Err(ProtocolError::Custom(constants::ERR_ALREADY_STARTED.into()));
        }

        crypto::init()?;

        // Synchronous resolution: a bad hostname fails here, not on the loop.
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(ProtocolError::Custom(constants::ERR_RESOLVE_FAILED.into()));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("gamewire-client")
            .enable_all()
            .build()?;

        let incoming = Arc::new(BlockingQueue::new());
        let state = Arc::new(SharedState::new(ConnectionState::Disconnected));
        let (tx, rx) = mpsc::unbounded_channel();

        state.apply(StateEvent::ConnectInitiated);
        runtime.spawn(connect_task(
            addrs,
            self.config.clone(),
            Arc::clone(&incoming),
            rx,
            Arc::clone(&state),
        ));

        self.incoming = incoming;
        self.state = state;
        self.outbound = Some(tx);
        self.runtime = Some(runtime);
        Ok(())
    }

    /// Tear down the connection and the event-loop thread. Idempotent: safe
    /// to call on an already-disconnected client.
    pub fn disconnect(&mut self) {
        self.state.apply(StateEvent::DisconnectRequested);

        // Dropping the sender ends the writer loop; stopping the runtime
        // abandons whatever is still in flight.
        self.outbound = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }

        self.state.apply(StateEvent::Closed);
        self.incoming.wake();
    }

    /// Whether the handshake has completed and the connection is live.
    pub fn is_connected(&self) -> bool {
        self.state.get() == ConnectionState::Connected
    }

    /// Queue a packet for transmission. A silent no-op when not connected:
    /// the packet is dropped, not buffered, and the caller owns retry policy.
    pub fn send(&self, packet: Packet<Id>) {
        if !self.is_connected() {
            return;
        }
        if let Some(tx) = &self.outbound {
            let _ = tx.send(packet);
        }
    }

    /// The queue of packets received from the server. `remote` is always
    /// `None` on the client side.
    pub fn incoming(&self) -> Arc<BlockingQueue<OwnedPacket<Id>>> {
        Arc::clone(&self.incoming)
    }
}

impl<Id: PacketId> Default for Client<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: PacketId> Drop for Client<Id> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn connect_task<Id: PacketId>(
    addrs: Vec<SocketAddr>,
    config: ClientConfig,
    incoming: Arc<BlockingQueue<OwnedPacket<Id>>>,
    outbound: mpsc::UnboundedReceiver<Packet<Id>>,
    state: Arc<SharedState>,
) {
    let connect = with_timeout_error(
        async { Ok(TcpStream::connect(addrs.as_slice()).await?) },
        DEFAULT_TIMEOUT,
    );
    let mut stream = match connect.await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "connect failed");
            state.apply(StateEvent::IoError);
            state.apply(StateEvent::Closed);
            incoming.wake();
            return;
        }
    };
    stream.set_nodelay(true).ok();
    state.apply(StateEvent::TransportReady);

    let keys = KeyPair::generate();
    let session = match client_handshake(&mut stream, &keys, config.handshake_timeout).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "handshake failed");
            state.apply(StateEvent::HandshakeFailed);
            state.apply(StateEvent::Closed);
            incoming.wake();
            return;
        }
    };
    state.apply(StateEvent::HandshakeComplete);
    debug!("connected to server");

    run_connection(
        stream,
        ConnectionParams {
            id: None,
            cipher: Arc::new(build_cipher(session, &config.security)),
            inbound: Arc::clone(&incoming),
            outbound,
            state,
        },
    )
    .await;

    incoming.wake();
}
