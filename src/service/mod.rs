//! # Service Interfaces
//!
//! The user-facing halves of the transport. [`client::Client`] and
//! [`server::Server`] each own a tokio runtime and hide the async machinery
//! behind a synchronous surface suited to a game-loop thread; the shared
//! per-connection plumbing lives in [`connection`].

pub mod client;
pub(crate) mod connection;
pub mod server;

pub use client::Client;
pub use connection::ConnectionState;
pub use server::{ConnectionEvent, Server, ServerHandler, ServerLink};
