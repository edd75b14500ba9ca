#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end tests over loopback TCP: handshake, validation, echo traffic,
//! removal notices, accept policy, connection caps, and password mode

use gamewire::{
    Client, ClientConfig, ConnectionId, Packet, PacketId, SecurityMode, Server, ServerConfig,
    ServerHandler, ServerLink,
};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum Msg {
    Accepted = 1,
    Ping = 2,
    Pong = 3,
    PlayerLeft = 4,
    Heartbeat = 5,
}

impl PacketId for Msg {
    fn to_wire(self) -> u32 {
        self as u32
    }
    fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Msg::Accepted),
            2 => Some(Msg::Ping),
            3 => Some(Msg::Pong),
            4 => Some(Msg::PlayerLeft),
            5 => Some(Msg::Heartbeat),
            _ => None,
        }
    }
}

/// Records lifecycle callbacks, greets validated clients, echoes pings, and
/// broadcasts a removal notice for departed clients.
#[derive(Default)]
struct GameHandler {
    validated: Vec<ConnectionId>,
    departed: Vec<ConnectionId>,
    heartbeats: Vec<ConnectionId>,
    pings: Vec<(ConnectionId, u32)>,
}

impl ServerHandler<Msg> for GameHandler {
    fn on_client_validated(&mut self, link: &ServerLink<Msg>, client: ConnectionId) {
        self.validated.push(client);
        link.send(client, Packet::with(Msg::Accepted, client));
    }

    fn on_client_disconnect(&mut self, client: ConnectionId) -> Option<Packet<Msg>> {
        self.departed.push(client);
        Some(Packet::with(Msg::PlayerLeft, client))
    }

    fn on_packet(&mut self, link: &ServerLink<Msg>, client: ConnectionId, mut packet: Packet<Msg>) {
        match packet.header.id {
            Msg::Ping => {
                let value = packet.pop::<u32>().expect("ping payload");
                self.pings.push((client, value));
                link.send(client, Packet::with(Msg::Pong, value));
            }
            Msg::Heartbeat => self.heartbeats.push(client),
            other => panic!("unexpected packet from client: {other:?}"),
        }
    }
}

fn start_server(configure: impl FnOnce(&mut ServerConfig)) -> (Server<Msg>, String, u16) {
    let mut config = ServerConfig::default();
    config.address = "127.0.0.1:0".into();
    configure(&mut config);

    let mut server = Server::new(config);
    server.start().expect("server start");
    let addr = server.local_addr().expect("bound address");
    (server, addr.ip().to_string(), addr.port())
}

/// Drive `server.update` until `cond` holds or the deadline passes.
fn pump_until<F>(
    server: &mut Server<Msg>,
    handler: &mut GameHandler,
    timeout: Duration,
    mut cond: F,
) -> bool
where
    F: FnMut(&GameHandler) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        server.update(handler, 32, false);
        if cond(handler) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

const LONG: Duration = Duration::from_secs(10);

#[test]
fn test_validate_greet_and_echo() {
    let (mut server, host, port) = start_server(|_| {});
    let mut handler = GameHandler::default();

    let mut client = Client::<Msg>::new();
    client.connect(&host, port).expect("connect");

    assert!(pump_until(&mut server, &mut handler, LONG, |h| {
        h.validated.len() == 1
    }));
    assert!(wait_until(LONG, || client.is_connected()));
    let id = handler.validated[0];

    // The greeting queued from on_client_validated reaches the client.
    let incoming = client.incoming();
    let mut greeting = incoming.pop_front_timeout(LONG).expect("greeting");
    assert_eq!(greeting.remote, None);
    assert_eq!(greeting.packet.header.id, Msg::Accepted);
    assert_eq!(greeting.packet.pop::<u32>().expect("pop"), id);

    // Ping round-trip.
    client.send(Packet::with(Msg::Ping, 7u32));
    assert!(pump_until(&mut server, &mut handler, LONG, |h| {
        h.pings.contains(&(id, 7))
    }));
    let mut pong = incoming.pop_front_timeout(LONG).expect("pong");
    assert_eq!(pong.packet.header.id, Msg::Pong);
    assert_eq!(pong.packet.pop::<u32>().expect("pop"), 7);

    // Empty-body packets pass through untouched.
    client.send(Packet::new(Msg::Heartbeat));
    assert!(pump_until(&mut server, &mut handler, LONG, |h| {
        h.heartbeats.contains(&id)
    }));

    client.disconnect();
    server.stop();
}

#[test]
fn test_departure_notice_reaches_remaining_clients() {
    let (mut server, host, port) = start_server(|_| {});
    let mut handler = GameHandler::default();

    let mut clients: Vec<Client<Msg>> = Vec::new();
    for _ in 0..3 {
        let mut client = Client::new();
        client.connect(&host, port).expect("connect");
        clients.push(client);
    }

    assert!(pump_until(&mut server, &mut handler, LONG, |h| {
        h.validated.len() == 3
    }));

    // Each client learns its assigned ID from the greeting.
    let mut ids = Vec::new();
    for client in &clients {
        let mut greeting = client
            .incoming()
            .pop_front_timeout(LONG)
            .expect("greeting");
        assert_eq!(greeting.packet.header.id, Msg::Accepted);
        ids.push(greeting.packet.pop::<u32>().expect("pop"));
    }

    let mut leaver = clients.pop().expect("third client");
    let leaver_id = ids.pop().expect("third id");
    leaver.disconnect();

    assert!(pump_until(&mut server, &mut handler, LONG, |h| {
        h.departed.contains(&leaver_id)
    }));

    // Both survivors receive the broadcast removal notice.
    for client in &clients {
        let mut notice = client.incoming().pop_front_timeout(LONG).expect("notice");
        assert_eq!(notice.packet.header.id, Msg::PlayerLeft);
        assert_eq!(notice.packet.pop::<u32>().expect("pop"), leaver_id);
    }

    assert!(wait_until(LONG, || server.connection_count() == 2));
    server.stop();
}

#[test]
fn test_accept_policy_vetoes_before_handshake() {
    let config = ServerConfig {
        address: "127.0.0.1:0".into(),
        ..ServerConfig::default()
    };
    let mut server = Server::<Msg>::new(config).with_accept_policy(|_| false);
    server.start().expect("server start");
    let addr = server.local_addr().expect("bound address");
    let mut handler = GameHandler::default();

    let mut client = Client::<Msg>::new();
    client
        .connect(&addr.ip().to_string(), addr.port())
        .expect("connect");

    assert!(!pump_until(
        &mut server,
        &mut handler,
        Duration::from_millis(500),
        |h| !h.validated.is_empty(),
    ));
    assert!(!client.is_connected());
    assert_eq!(server.connection_count(), 0);
    server.stop();
}

#[test]
fn test_connection_cap_rejects_excess_clients() {
    let (mut server, host, port) = start_server(|c| c.max_connections = 1);
    let mut handler = GameHandler::default();

    let mut first = Client::<Msg>::new();
    first.connect(&host, port).expect("connect");
    assert!(pump_until(&mut server, &mut handler, LONG, |h| {
        h.validated.len() == 1
    }));

    let mut second = Client::<Msg>::new();
    second.connect(&host, port).expect("connect");

    assert!(!pump_until(
        &mut server,
        &mut handler,
        Duration::from_millis(500),
        |h| h.validated.len() > 1,
    ));
    assert!(!second.is_connected());
    assert_eq!(server.connection_count(), 1);

    first.disconnect();
    second.disconnect();
    server.stop();
}

#[test]
fn test_password_mode_end_to_end() {
    let security = SecurityMode::Password {
        password: "correct horse battery".into(),
    };
    let (mut server, host, port) = {
        let security = security.clone();
        start_server(move |c| c.security = security)
    };
    let mut handler = GameHandler::default();

    let mut client = Client::<Msg>::with_config(ClientConfig {
        security,
        ..ClientConfig::default()
    });
    client.connect(&host, port).expect("connect");

    assert!(pump_until(&mut server, &mut handler, LONG, |h| {
        h.validated.len() == 1
    }));
    let id = handler.validated[0];

    client.send(Packet::with(Msg::Ping, 99u32));
    assert!(pump_until(&mut server, &mut handler, LONG, |h| {
        h.pings.contains(&(id, 99))
    }));

    client.disconnect();
    server.stop();
}

#[test]
fn test_wrong_password_traffic_is_dropped() {
    let (mut server, host, port) = start_server(|c| {
        c.security = SecurityMode::Password {
            password: "server secret".into(),
        }
    });
    let mut handler = GameHandler::default();

    let mut client = Client::<Msg>::with_config(ClientConfig {
        security: SecurityMode::Password {
            password: "client secret".into(),
        },
        ..ClientConfig::default()
    });
    client.connect(&host, port).expect("connect");

    // The handshake does not involve the password, so validation succeeds.
    assert!(pump_until(&mut server, &mut handler, LONG, |h| {
        h.validated.len() == 1
    }));

    // Traffic sealed under the wrong key fails AEAD open and is dropped
    // without killing the connection.
    client.send(Packet::with(Msg::Ping, 1u32));
    assert!(!pump_until(
        &mut server,
        &mut handler,
        Duration::from_millis(500),
        |h| !h.pings.is_empty(),
    ));
    assert!(client.is_connected());
    assert_eq!(server.connection_count(), 1);

    client.disconnect();
    server.stop();
}
