//! # Server Interface
//!
//! Accepts connections, runs the handshake on each, assigns connection IDs,
//! and funnels every validated peer's packets into one shared inbound queue.
//!
//! I/O runs on a dedicated tokio runtime; the application drives packet
//! delivery from its own thread by calling [`Server::update`], which invokes a
//! [`ServerHandler`]. Lifecycle changes (a peer validating or departing) are
//! observed through the same `update` call, so handler callbacks always run on
//! the application thread, never on the event loop.
//!
//! A departed peer is reported through `on_client_disconnect` once its reader
//! loop notices the closed socket. Events drain before packets in every
//! `update` cycle, so remaining clients hear the removal notice before any
//! traffic that postdates the departure.

use crate::config::{SecurityMode, ServerConfig};
use crate::core::packet::{ConnectionId, OwnedPacket, Packet, PacketId};
use crate::error::{constants, ProtocolError, Result};
use crate::service::connection::{
    build_cipher, run_connection, server_handshake, ConnectionParams, ConnectionState,
    SharedState, StateEvent,
};
use crate::utils::crypto::{self, KeyPair};
use crate::utils::queue::BlockingQueue;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Lifecycle notifications queued by the event loop and delivered to the
/// [`ServerHandler`] during [`Server::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A peer completed the handshake and was assigned an ID.
    Validated(ConnectionId),
    /// A validated peer's connection ended.
    Disconnected(ConnectionId),
}

/// Application hooks invoked from [`Server::update`] on the calling thread.
pub trait ServerHandler<Id: PacketId> {
    /// A peer passed the handshake. Use `link` to greet it.
    fn on_client_validated(&mut self, link: &ServerLink<Id>, client: ConnectionId) {
        let _ = (link, client);
    }

    /// A validated peer departed. Return a packet to broadcast as the removal
    /// notice to everyone still connected, or `None` to stay quiet.
    fn on_client_disconnect(&mut self, client: ConnectionId) -> Option<Packet<Id>> {
        let _ = client;
        None
    }

    /// A packet arrived from a validated peer.
    fn on_packet(&mut self, link: &ServerLink<Id>, client: ConnectionId, packet: Packet<Id>);
}

struct ConnectionHandle<Id: PacketId> {
    outbound: mpsc::UnboundedSender<Packet<Id>>,
    peer: SocketAddr,
}

type ConnectionMap<Id> = Arc<RwLock<HashMap<ConnectionId, ConnectionHandle<Id>>>>;

/// Cheap, cloneable sending handle over the server's connection table. Safe
/// to use from handler callbacks or any other thread.
pub struct ServerLink<Id: PacketId> {
    connections: ConnectionMap<Id>,
}

impl<Id: PacketId> Clone for ServerLink<Id> {
    fn clone(&self) -> Self {
        Self {
            connections: Arc::clone(&self.connections),
        }
    }
}

impl<Id: PacketId> ServerLink<Id> {
    /// Queue a packet for one client. Returns `false` if the client is
    /// unknown or already tearing down; the packet is dropped in that case.
    pub fn send(&self, client: ConnectionId, packet: Packet<Id>) -> bool {
        match self.connections.read().get(&client) {
            Some(handle) => handle.outbound.send(packet).is_ok(),
            None => false,
        }
    }

    /// Queue a packet for every validated client, optionally excluding one
    /// (typically the packet's originator).
    pub fn send_to_all(&self, packet: &Packet<Id>, exclude: Option<ConnectionId>) {
        for (id, handle) in self.connections.read().iter() {
            if Some(*id) == exclude {
                continue;
            }
            let _ = handle.outbound.send(packet.clone());
        }
    }

    /// Remote address of a validated client.
    pub fn peer_addr(&self, client: ConnectionId) -> Option<SocketAddr> {
        self.connections.read().get(&client).map(|h| h.peer)
    }

    /// Number of currently validated connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

type AcceptPolicy = Arc<dyn Fn(SocketAddr) -> bool + Send + Sync>;

/// How long a waiting [`Server::update`] parks on the packet queue before
/// re-checking the lifecycle event queue.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Server-side endpoint of the packet transport.
pub struct Server<Id: PacketId> {
    config: ServerConfig,
    link: ServerLink<Id>,
    inbound: Arc<BlockingQueue<OwnedPacket<Id>>>,
    events: Arc<BlockingQueue<ConnectionEvent>>,
    accept_policy: AcceptPolicy,
    runtime: Option<Runtime>,
    local_addr: Option<SocketAddr>,
}

impl<Id: PacketId> Server<Id> {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            link: ServerLink {
                connections: Arc::new(RwLock::new(HashMap::new())),
            },
            inbound: Arc::new(BlockingQueue::new()),
            events: Arc::new(BlockingQueue::new()),
            accept_policy: Arc::new(|_| true),
            runtime: None,
            local_addr: None,
        }
    }

    /// Install a pre-handshake veto over incoming connections. A rejected
    /// socket is dropped before any handshake bytes are exchanged.
    pub fn with_accept_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(SocketAddr) -> bool + Send + Sync + 'static,
    {
        self.accept_policy = Arc::new(policy);
        self
    }

    /// Bind the listener and start the event loop.
    pub fn start(&mut self) -> Result<()> {
        if self.runtime.is_some() {
            return Err(ProtocolError::Custom(constants::ERR_ALREADY_STARTED.into()));
        }

        crypto::init()?;

        let addr: SocketAddr = self.config.address.parse().map_err(|e| {
            ProtocolError::ConfigError(format!("Invalid listen address '{}': {e}", self.config.address))
        })?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("gamewire-server")
            .enable_all()
            .build()?;

        // Binding happens synchronously so `start` can report address errors.
        let listener = runtime.block_on(TcpListener::bind(addr))?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "server listening");

        runtime.spawn(accept_loop(AcceptContext {
            listener,
            connections: Arc::clone(&self.link.connections),
            inbound: Arc::clone(&self.inbound),
            events: Arc::clone(&self.events),
            policy: Arc::clone(&self.accept_policy),
            security: self.config.security.clone(),
            handshake_timeout: self.config.handshake_timeout,
            max_connections: self.config.max_connections,
            keys: Arc::new(KeyPair::generate()),
        }));

        self.local_addr = Some(local_addr);
        self.runtime = Some(runtime);
        Ok(())
    }

    /// Stop accepting, drop every connection, and shut the event loop down.
    /// Idempotent.
    pub fn stop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            info!("server stopped");
        }
        self.link.connections.write().clear();
        self.inbound.wake();
        self.events.wake();
        self.local_addr = None;
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    /// The bound listen address, useful when the configured port was 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Sending handle usable from any thread.
    pub fn link(&self) -> &ServerLink<Id> {
        &self.link
    }

    /// Queue a packet for one client. See [`ServerLink::send`].
    pub fn send(&self, client: ConnectionId, packet: Packet<Id>) -> bool {
        self.link.send(client, packet)
    }

    /// Queue a packet for every client. See [`ServerLink::send_to_all`].
    pub fn send_to_all(&self, packet: &Packet<Id>, exclude: Option<ConnectionId>) {
        self.link.send_to_all(packet, exclude)
    }

    pub fn connection_count(&self) -> usize {
        self.link.connection_count()
    }

    /// Deliver pending lifecycle events and up to `max_packets` inbound
    /// packets to `handler`. With `wait` set, the call blocks until it makes
    /// progress of either kind instead of returning zero work.
    ///
    /// Events always drain before packets, so a removal notice for a departed
    /// client is broadcast before any traffic that postdates the departure.
    /// Returns the number of packets delivered to `handler`.
    pub fn update<H>(&mut self, handler: &mut H, max_packets: usize, wait: bool) -> usize
    where
        H: ServerHandler<Id>,
    {
        let mut progressed = self.pump_events(handler);

        let mut handled = 0;
        loop {
            while handled < max_packets {
                let Some(owned) = self.inbound.try_pop() else { break };
                if let Some(remote) = owned.remote {
                    handler.on_packet(&self.link, remote, owned.packet);
                }
                handled += 1;
                progressed = true;
            }

            if !wait || progressed || handled >= max_packets {
                break;
            }

            // Park briefly, then re-check lifecycle events; a client
            // validating while we wait must not sit unnoticed until its
            // first packet arrives.
            if let Some(owned) = self.inbound.pop_front_timeout(EVENT_POLL_INTERVAL) {
                if let Some(remote) = owned.remote {
                    handler.on_packet(&self.link, remote, owned.packet);
                }
                handled += 1;
                progressed = true;
            }
            progressed |= self.pump_events(handler);
        }
        handled
    }

    fn pump_events<H>(&mut self, handler: &mut H) -> bool
    where
        H: ServerHandler<Id>,
    {
        let mut progressed = false;
        while let Some(event) = self.events.try_pop() {
            progressed = true;
            match event {
                ConnectionEvent::Validated(id) => handler.on_client_validated(&self.link, id),
                ConnectionEvent::Disconnected(id) => {
                    if let Some(notice) = handler.on_client_disconnect(id) {
                        self.link.send_to_all(&notice, None);
                    }
                }
            }
        }
        progressed
    }
}

impl<Id: PacketId> Drop for Server<Id> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct AcceptContext<Id: PacketId> {
    listener: TcpListener,
    connections: ConnectionMap<Id>,
    inbound: Arc<BlockingQueue<OwnedPacket<Id>>>,
    events: Arc<BlockingQueue<ConnectionEvent>>,
    policy: AcceptPolicy,
    security: SecurityMode,
    handshake_timeout: Duration,
    max_connections: usize,
    keys: Arc<KeyPair>,
}

async fn accept_loop<Id: PacketId>(ctx: AcceptContext<Id>) {
    let mut next_id: ConnectionId = 1;
    loop {
        let (stream, peer) = match ctx.listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "accept failed");
                continue;
            }
        };

        if !(ctx.policy)(peer) {
            debug!(%peer, "connection denied by accept policy");
            continue;
        }
        if ctx.connections.read().len() >= ctx.max_connections {
            warn!(%peer, limit = ctx.max_connections, "connection limit reached");
            continue;
        }

        let id = next_id;
        next_id = next_id.wrapping_add(1);

        tokio::spawn(handle_connection(
            stream,
            peer,
            id,
            Arc::clone(&ctx.connections),
            Arc::clone(&ctx.inbound),
            Arc::clone(&ctx.events),
            ctx.security.clone(),
            ctx.handshake_timeout,
            Arc::clone(&ctx.keys),
        ));
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_connection<Id: PacketId>(
    mut stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    connections: ConnectionMap<Id>,
    inbound: Arc<BlockingQueue<OwnedPacket<Id>>>,
    events: Arc<BlockingQueue<ConnectionEvent>>,
    security: SecurityMode,
    handshake_timeout: Duration,
    keys: Arc<KeyPair>,
) {
    stream.set_nodelay(true).ok();

    let state = Arc::new(SharedState::new(ConnectionState::Disconnected));
    state.apply(StateEvent::TransportReady);

    let session = match server_handshake(&mut stream, &keys, handshake_timeout).await {
        Ok(session) => session,
        Err(e) => {
            debug!(%peer, error = %e, "handshake failed");
            state.apply(StateEvent::HandshakeFailed);
            state.apply(StateEvent::Closed);
            return;
        }
    };
    state.apply(StateEvent::HandshakeComplete);

    // Registration before the Validated event: by the time the handler runs,
    // the link can already reach this client.
    let (tx, rx) = mpsc::unbounded_channel();
    connections
        .write()
        .insert(id, ConnectionHandle { outbound: tx, peer });
    events.push_back(ConnectionEvent::Validated(id));
    info!(%peer, client = id, "client validated");

    run_connection(
        stream,
        ConnectionParams {
            id: Some(id),
            cipher: Arc::new(build_cipher(session, &security)),
            inbound,
            outbound: rx,
            state,
        },
    )
    .await;

    connections.write().remove(&id);
    events.push_back(ConnectionEvent::Disconnected(id));
    info!(client = id, "client disconnected");
}
