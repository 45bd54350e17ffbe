//! Direction-reversing handler adapter.

use std::sync::Arc;

use rfb_common::FlowPair;
use rfb_protocol::io::PeekStream;

use crate::handler::{Binding, ProtocolHandler, Side};

/// Runs a handler on connections whose roles are inverted: the protocol's
/// server is the side that opened the connection.
///
/// The initiator is matched as the wrapped handler's responder and vice
/// versa, flows are reversed, and the half-streams are swapped on bind.
pub struct ReverseHandler {
    inner: Arc<dyn ProtocolHandler>,
    name: String,
}

impl ReverseHandler {
    pub fn new(inner: Arc<dyn ProtocolHandler>) -> Self {
        let name = format!("reverse-{}", inner.name());
        Self { inner, name }
    }
}

impl ProtocolHandler for ReverseHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches_initiator(&self, flows: &FlowPair, stream: &dyn PeekStream) -> bool {
        self.inner.matches_responder(&flows.reverse(), stream)
    }

    fn matches_responder(&self, flows: &FlowPair, stream: &dyn PeekStream) -> bool {
        self.inner.matches_initiator(&flows.reverse(), stream)
    }

    fn bind(&self, flows: FlowPair, client: Side, server: Side) -> Binding {
        self.inner.bind(flows.reverse(), server, client)
    }
}
