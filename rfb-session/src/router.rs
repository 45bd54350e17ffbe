//! Connection pairing and protocol sniffing.
//!
//! The segment producer reports every newly observed TCP direction through
//! [`ConnectionRouter::on_new_flow`]. The first direction of a connection
//! creates a [`Connection`] holding both half-streams and parks it in the
//! cache under the symmetric flow key; the reverse direction takes it back
//! out, so both directions feed one connection whichever is seen first.
//!
//! Each half-stream carries a [`Continuation`] naming the logic run when
//! bytes arrive:
//!
//! ```text
//!            handler matched               no match (strict)
//!   Sniff ─────────────────────▶ Handler    Sniff ─────────▶ Discard
//!     │ no match (loose): clear, keep sniffing
//!     └──▶ Sniff
//! ```
//!
//! A match switches both half-streams to the handler's session and replays
//! the matching side so bytes buffered while sniffing reach the session.
//!
//! Cache entries are removed only when the reverse direction arrives. A
//! direction whose reverse never shows up stays cached for the lifetime of
//! the router, so memory grows with the number of one-sided flows.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rfb_common::{Flow, FlowKey, FlowPair, Timestamp};
use rfb_protocol::io::{ByteStream, PeekStream};
use tracing::{debug, trace};

use crate::handler::{Binding, ProtocolHandler, Role, Side};

/// Logic run when a half-stream receives bytes or completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Offer the buffered prefix to the registered handlers.
    Sniff,
    /// Drop everything; the direction was abandoned.
    Discard,
    /// Feed the bound session.
    Handler,
}

/// One direction of a connection.
#[derive(Debug)]
struct HalfStream {
    stream: ByteStream,
    continuation: Continuation,
}

impl HalfStream {
    fn new() -> Self {
        Self {
            stream: ByteStream::new(),
            continuation: Continuation::Sniff,
        }
    }

    /// Install `next`, returning the continuation it replaces.
    fn set_continuation(&mut self, next: Continuation) -> Continuation {
        std::mem::replace(&mut self.continuation, next)
    }
}

/// Both half-streams of one TCP connection and the session bound to them.
pub struct Connection {
    flows: FlowPair,
    handlers: Arc<[Arc<dyn ProtocolHandler>]>,
    strict: bool,
    initiator: HalfStream,
    responder: HalfStream,
    binding: Option<Binding>,
    closed: bool,
}

impl Connection {
    fn new(flows: FlowPair, handlers: Arc<[Arc<dyn ProtocolHandler>]>, strict: bool) -> Self {
        Self {
            flows,
            handlers,
            strict,
            initiator: HalfStream::new(),
            responder: HalfStream::new(),
            binding: None,
            closed: false,
        }
    }

    fn half(&self, side: Side) -> &HalfStream {
        match side {
            Side::Initiator => &self.initiator,
            Side::Responder => &self.responder,
        }
    }

    fn half_mut(&mut self, side: Side) -> &mut HalfStream {
        match side {
            Side::Initiator => &mut self.initiator,
            Side::Responder => &mut self.responder,
        }
    }

    /// Run the continuation installed on `side`.
    fn resume(&mut self, side: Side) {
        match self.half(side).continuation {
            Continuation::Sniff => self.sniff(side),
            Continuation::Discard => self.half_mut(side).stream.clear(),
            Continuation::Handler => self.dispatch(side),
        }
    }

    fn sniff(&mut self, side: Side) {
        let flows = match side {
            Side::Initiator => self.flows,
            Side::Responder => self.flows.reverse(),
        };
        let stream: &dyn PeekStream = &self.half(side).stream;
        let matched = self
            .handlers
            .iter()
            .find(|handler| match side {
                Side::Initiator => handler.matches_initiator(&flows, stream),
                Side::Responder => handler.matches_responder(&flows, stream),
            })
            .cloned();

        match matched {
            Some(handler) => {
                debug!(
                    handler = handler.name(),
                    flows = %self.flows,
                    ?side,
                    "Protocol recognised"
                );
                self.binding = Some(handler.bind(self.flows, Side::Initiator, Side::Responder));
                self.initiator.set_continuation(Continuation::Handler);
                self.responder.set_continuation(Continuation::Handler);
                // Bytes buffered while sniffing belong to the session now.
                self.resume(side);
            }
            None => {
                let strict = self.strict;
                let half = self.half_mut(side);
                trace!(?side, discarded = half.stream.length(), "No protocol recognised");
                if strict {
                    half.set_continuation(Continuation::Discard);
                }
                half.stream.clear();
            }
        }
    }

    fn dispatch(&mut self, side: Side) {
        let Self {
            binding,
            initiator,
            responder,
            ..
        } = self;
        let Some(binding) = binding.as_mut() else {
            return;
        };
        let stream = match side {
            Side::Initiator => &mut initiator.stream,
            Side::Responder => &mut responder.stream,
        };
        match binding.role(side) {
            Role::Client => binding.session.on_client(stream),
            Role::Server => binding.session.on_server(stream),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(binding) = self.binding.as_mut() {
            debug!(flows = %self.flows, "Closing session");
            binding.session.close();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle on one half-stream of a routed connection.
#[derive(Clone)]
pub struct StreamHandle {
    connection: Arc<Mutex<Connection>>,
    side: Side,
}

impl StreamHandle {
    pub fn side(&self) -> Side {
        self.side
    }

    /// Whether both handles drive the same connection.
    pub fn same_connection(&self, other: &StreamHandle) -> bool {
        Arc::ptr_eq(&self.connection, &other.connection)
    }

    /// Flows of the connection, oriented from the initiator.
    pub fn flows(&self) -> FlowPair {
        self.connection.lock().flows
    }

    /// Bytes buffered on this side and not yet consumed.
    pub fn buffered(&self) -> usize {
        self.connection.lock().half(self.side).stream.length()
    }

    pub fn continuation(&self) -> Continuation {
        self.connection.lock().half(self.side).continuation
    }

    pub fn is_complete(&self) -> bool {
        self.connection.lock().half(self.side).stream.is_complete()
    }

    /// Append reassembled bytes observed at `seen` and run this side's
    /// continuation.
    pub fn deliver(&self, bytes: impl Into<Bytes>, seen: Timestamp) {
        let mut connection = self.connection.lock();
        connection.half_mut(self.side).stream.push(bytes, seen);
        connection.resume(self.side);
    }

    /// Mark this side complete and run its continuation a final time. The
    /// session is closed once both sides are complete.
    pub fn complete(&self) {
        let mut connection = self.connection.lock();
        let half = connection.half_mut(self.side);
        if half.stream.is_complete() {
            return;
        }
        half.stream.mark_complete();
        connection.resume(self.side);

        let other = connection.half(self.side.other());
        if other.stream.is_complete() {
            connection.close();
        }
    }
}

/// Both half-stream handles of a connection.
#[derive(Clone)]
pub struct StreamPair {
    pub initiator: StreamHandle,
    pub responder: StreamHandle,
}

impl StreamPair {
    fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self {
            initiator: StreamHandle {
                connection: Arc::clone(&connection),
                side: Side::Initiator,
            },
            responder: StreamHandle {
                connection,
                side: Side::Responder,
            },
        }
    }

    pub fn same_connection(&self, other: &StreamPair) -> bool {
        self.initiator.same_connection(&other.initiator)
    }
}

/// Pairs half-streams into connections and routes them to protocol handlers.
pub struct ConnectionRouter {
    handlers: Arc<[Arc<dyn ProtocolHandler>]>,
    strict: bool,
    cache: Mutex<HashMap<FlowKey, Arc<Mutex<Connection>>>>,
}

impl ConnectionRouter {
    /// Create a router trying `handlers` in order. The first matching
    /// handler wins.
    pub fn new(handlers: Vec<Arc<dyn ProtocolHandler>>, strict: bool) -> Self {
        Self {
            handlers: handlers.into(),
            strict,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Connections whose reverse direction has not been seen yet.
    pub fn pending(&self) -> usize {
        self.cache.lock().len()
    }

    /// Stream pair for the connection `network`/`transport` belongs to.
    ///
    /// The first call for a connection creates the pair; a call with the
    /// reversed flows returns the same pair and forgets it.
    pub fn on_new_flow(&self, network: Flow<IpAddr>, transport: Flow<u16>) -> StreamPair {
        self.pair(FlowPair::new(network, transport)).0
    }

    /// Half-stream a newly observed direction should feed: the initiator
    /// for the first direction of a connection, the responder for its
    /// reverse.
    pub fn on_new_direction(&self, network: Flow<IpAddr>, transport: Flow<u16>) -> StreamHandle {
        let (pair, created) = self.pair(FlowPair::new(network, transport));
        if created {
            pair.initiator
        } else {
            pair.responder
        }
    }

    fn pair(&self, flows: FlowPair) -> (StreamPair, bool) {
        let key = flows.key();
        let mut cache = self.cache.lock();
        match cache.remove(&key) {
            Some(connection) => {
                trace!(%flows, "Paired with cached connection");
                (StreamPair::new(connection), false)
            }
            None => {
                trace!(%flows, "New connection");
                let connection = Arc::new(Mutex::new(Connection::new(
                    flows,
                    Arc::clone(&self.handlers),
                    self.strict,
                )));
                cache.insert(key, Arc::clone(&connection));
                (StreamPair::new(connection), true)
            }
        }
    }
}
