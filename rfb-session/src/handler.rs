//! Protocol handler interface used by the connection router.
//!
//! A [`ProtocolHandler`] recognises a protocol from the buffered prefix of
//! either direction of a connection and, once it does, binds the connection
//! to a [`Session`] that consumes both directions from then on.

use std::fmt;

use rfb_common::FlowPair;
use rfb_protocol::io::{ByteStream, PeekStream};

/// Position of a half-stream within a routed connection.
///
/// The initiator is the direction whose first segment created the connection;
/// the responder is its reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Initiator,
    Responder,
}

impl Side {
    pub const fn other(self) -> Self {
        match self {
            Side::Initiator => Side::Responder,
            Side::Responder => Side::Initiator,
        }
    }
}

/// Protocol role of a half-stream once a handler has bound the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

/// A protocol recognised and decoded by the router.
///
/// Matching only peeks; several handlers may inspect the same prefix.
pub trait ProtocolHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Recognise the initiator direction. `flows` is oriented from the
    /// initiator towards the responder.
    fn matches_initiator(&self, flows: &FlowPair, stream: &dyn PeekStream) -> bool;

    /// Recognise the responder direction. `flows` is oriented from the
    /// responder towards the initiator.
    fn matches_responder(&self, flows: &FlowPair, stream: &dyn PeekStream) -> bool;

    /// Create the session for a recognised connection. `flows` is oriented
    /// like the client's traffic; `client` and `server` say which half-stream
    /// carries each role.
    fn bind(&self, flows: FlowPair, client: Side, server: Side) -> Binding;
}

/// A session bound to the two half-streams of a connection.
pub struct Binding {
    pub client: Side,
    pub server: Side,
    pub session: Box<dyn Session>,
}

impl Binding {
    pub fn new(client: Side, server: Side, session: Box<dyn Session>) -> Self {
        Self {
            client,
            server,
            session,
        }
    }

    /// Role carried by `side`.
    pub fn role(&self, side: Side) -> Role {
        if side == self.client {
            Role::Client
        } else {
            Role::Server
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("client", &self.client)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

/// Per-connection protocol state machine.
///
/// Each method runs against whatever is currently buffered and returns once
/// it needs more bytes; it is invoked again on the next delivery to that
/// direction, and once more when the direction completes.
pub trait Session: Send {
    fn on_client(&mut self, stream: &mut ByteStream);

    fn on_server(&mut self, stream: &mut ByteStream);

    /// Both directions have ended. Finalise outputs.
    fn close(&mut self) {}
}
