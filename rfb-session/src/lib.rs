//! RFB session reconstruction from reassembled TCP traffic.
//!
//! This crate turns the two byte streams of each captured TCP connection into
//! a decoded RFB session, built on top of the low-level `rfb-protocol` and
//! `rfb-encodings` crates. Frames are handed to image sinks and clipboard
//! payloads to file sinks.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use rfb_session::{build_router, Config, NullSink};
//!
//! let config = Config::default();
//! let router = build_router(&config, Arc::new(NullSink), Arc::new(NullSink));
//! assert_eq!(router.pending(), 0);
//! ```
//!
//! A segment producer then reports every new TCP direction with
//! [`ConnectionRouter::on_new_direction`] and feeds reassembled bytes to the
//! returned [`StreamHandle`].
//!
//! # Architecture
//!
//! - **Router** ([`router`]): pairs the two directions of a connection and
//!   sniffs them against the registered [`ProtocolHandler`]s.
//! - **RFB engine** ([`rfb`]): per-connection state machine decoding
//!   ServerInit, framebuffer updates and clipboard messages.
//! - **Reverse adapter** ([`reverse`]): runs a handler with client and server
//!   roles swapped, for reverse connections.
//! - **Sinks** ([`sink`]): output interfaces and fan-out.
//!
//! Nothing blocks: every decode runs against what is buffered and resumes on
//! the next delivery.
//!
//! # Error Handling
//!
//! Per-message errors stop at the direction that raised them. An unsupported
//! message or encoding abandons that direction only; the other direction and
//! every other connection keep going.

#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod handler;
pub mod reverse;
pub mod rfb;
pub mod router;
pub mod sink;

pub use config::Config;
pub use errors::SessionError;
pub use handler::{Binding, ProtocolHandler, Role, Session, Side};
pub use reverse::ReverseHandler;
pub use rfb::{RfbHandler, RfbSession};
pub use router::{Connection, ConnectionRouter, Continuation, StreamHandle, StreamPair};
pub use sink::{
    FileSink, FileSinkFactory, ForkFileFactory, ForkImageFactory, ImageSink, ImageSinkFactory,
    NullSink,
};

use std::sync::Arc;

/// Build the router for `config` with the RFB handler registered, wrapped
/// in the reverse adapter when `router.reverse_roles` is set.
pub fn build_router(
    config: &Config,
    images: Arc<dyn ImageSinkFactory>,
    files: Arc<dyn FileSinkFactory>,
) -> ConnectionRouter {
    let rfb: Arc<dyn ProtocolHandler> =
        Arc::new(RfbHandler::with_config(&config.session, images, files));
    let handler: Arc<dyn ProtocolHandler> = if config.router.reverse_roles {
        Arc::new(ReverseHandler::new(rfb))
    } else {
        rfb
    };
    ConnectionRouter::new(vec![handler], config.router.strict)
}
