//! RFB protocol handler.
//!
//! Recognition relies on the server's ServerInit alone: client handshakes
//! (ProtocolVersion, security, ClientInit) are assumed to be absent, as in
//! implant traffic that skips them.

mod session;

pub use session::{ClientState, RfbSession, ServerState};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rfb_common::FlowPair;
use rfb_protocol::decode;
use rfb_protocol::io::PeekStream;
use rfb_protocol::messages::ServerInit;
use tracing::trace;

use crate::config::SessionConfig;
use crate::handler::{Binding, ProtocolHandler, Side};
use crate::sink::{FileSinkFactory, ImageSinkFactory};

/// Creates one [`RfbSession`] per recognised connection.
pub struct RfbHandler {
    next_id: AtomicU64,
    config: SessionConfig,
    images: Arc<dyn ImageSinkFactory>,
    files: Arc<dyn FileSinkFactory>,
}

impl RfbHandler {
    pub fn new(images: Arc<dyn ImageSinkFactory>, files: Arc<dyn FileSinkFactory>) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            config: SessionConfig::default(),
            images,
            files,
        }
    }

    pub fn with_config(
        config: &SessionConfig,
        images: Arc<dyn ImageSinkFactory>,
        files: Arc<dyn FileSinkFactory>,
    ) -> Self {
        Self {
            config: config.clone(),
            ..Self::new(images, files)
        }
    }

    /// Let client SetPixelFormat messages replace the server's format.
    #[must_use]
    pub fn negotiate_pixel_format(mut self, negotiate: bool) -> Self {
        self.config.negotiate_pixel_format = negotiate;
        self
    }

    /// Number of sessions bound so far.
    pub fn sessions(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}

impl ProtocolHandler for RfbHandler {
    fn name(&self) -> &str {
        "rfb"
    }

    fn matches_initiator(&self, _flows: &FlowPair, _stream: &dyn PeekStream) -> bool {
        // A ClientInit is a single byte, too little to recognise anything.
        false
    }

    fn matches_responder(&self, flows: &FlowPair, stream: &dyn PeekStream) -> bool {
        // Landscape desktops with a UTF-8 name only. Neither is required by
        // the protocol.
        match decode::peek::<ServerInit>(stream) {
            Ok(init) => {
                let init = init.value;
                let matched = init.framebuffer_width > init.framebuffer_height
                    && init.name().is_some();
                trace!(
                    %flows,
                    width = init.framebuffer_width,
                    height = init.framebuffer_height,
                    matched,
                    "ServerInit candidate"
                );
                matched
            }
            Err(_) => false,
        }
    }

    fn bind(&self, flows: FlowPair, client: Side, server: Side) -> Binding {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = RfbSession::new(
            id,
            flows,
            &self.config,
            Arc::clone(&self.images),
            Arc::clone(&self.files),
        );
        Binding::new(client, server, Box::new(session))
    }
}
