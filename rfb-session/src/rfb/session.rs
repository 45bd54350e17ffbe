//! Per-connection RFB state machine.
//!
//! Each direction owns a state; every delivery runs the direction's state
//! function in a loop until it needs more bytes. State functions return the
//! next state, or an error that either waits for more data or abandons the
//! direction.
//!
//! ```text
//! server: AwaitServerInit ──▶ Established ◀──▶ Rectangles { pending }
//! client: Pending ──▶ Discarding       Established
//!            └─────────────┴── ServerInit ──▶┘
//! ```
//!
//! An abandoned direction clears every byte it receives from then on. The
//! other direction keeps running.

use std::sync::Arc;

use rfb_common::{FlowPair, Timestamp};
use rfb_encodings::{Decoder, Decoders, Framebuffer};
use rfb_protocol::decode::{self, DecodeError};
use rfb_protocol::io::{ByteStream, PeekStream};
use rfb_protocol::messages::{
    encoding_name, ClientMessageType, CutText, CutTextHeader, ExtendedCutText,
    FramebufferUpdate, FramebufferUpdateRequest, KeyEvent, PixelFormat, PointerEvent,
    Rectangle, ServerInit, ServerMessageType, SetEncodings, SetPixelFormat,
    PSEUDO_ENCODING_EXTENDED_CLIPBOARD,
};
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::handler::{Role, Session};
use crate::sink::{FileSinkFactory, ImageSink, ImageSinkFactory};

const FRAMING: &str = "rfb_session::framing";

/// State of the client-to-server direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing received yet. The first delivery is kept for later.
    Pending,
    /// Waiting for the ServerInit; bytes are dropped.
    Discarding,
    Established,
    Abandoned,
}

/// State of the server-to-client direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    AwaitServerInit,
    Established,
    /// Inside a FramebufferUpdate with `pending` rectangles left.
    Rectangles { pending: u16 },
    Abandoned,
}

/// Decode state of one reconstructed RFB connection.
pub struct RfbSession {
    id: u64,
    flows: FlowPair,
    negotiate_pixel_format: bool,
    max_framebuffer_pixels: u64,
    client: ClientState,
    server: ServerState,
    pixel_format: PixelFormat,
    encodings: Vec<i32>,
    framebuffer: Framebuffer,
    decoders: Decoders,
    update_time: Option<Timestamp>,
    images: Arc<dyn ImageSinkFactory>,
    image_sink: Option<Box<dyn ImageSink>>,
    files: Arc<dyn FileSinkFactory>,
    frames: u64,
}

impl RfbSession {
    pub fn new(
        id: u64,
        flows: FlowPair,
        config: &SessionConfig,
        images: Arc<dyn ImageSinkFactory>,
        files: Arc<dyn FileSinkFactory>,
    ) -> Self {
        Self {
            id,
            flows,
            negotiate_pixel_format: config.negotiate_pixel_format,
            max_framebuffer_pixels: config.max_framebuffer_pixels,
            client: ClientState::Pending,
            server: ServerState::AwaitServerInit,
            pixel_format: PixelFormat::rgb888(),
            encodings: Vec::new(),
            framebuffer: Framebuffer::new(0, 0),
            decoders: Decoders::new(),
            update_time: None,
            images,
            image_sink: None,
            files,
            frames: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client_state(&self) -> ClientState {
        self.client
    }

    pub fn server_state(&self) -> ServerState {
        self.server
    }

    pub fn pixel_format(&self) -> &PixelFormat {
        &self.pixel_format
    }

    /// Encodings announced by the last SetEncodings.
    pub fn encodings(&self) -> &[i32] {
        &self.encodings
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Frames handed to the image sink so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn has_extended_clipboard(&self) -> bool {
        self.encodings.contains(&PSEUDO_ENCODING_EXTENDED_CLIPBOARD)
    }

    /// Decide what an error means for `role`. Returns true if the direction
    /// must be abandoned.
    fn settle(&self, role: Role, err: &SessionError) -> bool {
        if err.is_incomplete() {
            trace!(target: FRAMING, session = self.id, side = %role, error = %err, "Awaiting more data");
            false
        } else if err.is_end_of_stream() {
            debug!(session = self.id, side = %role, error = %err, "Stream ended mid-message");
            false
        } else {
            warn!(
                session = self.id,
                flows = %self.flows,
                side = %role,
                error = %err,
                "Abandoning direction"
            );
            true
        }
    }

    /// Reject a ServerInit no framebuffer can be built from.
    fn check_server_init(&self, init: &ServerInit) -> Result<(), SessionError> {
        if let Err(DecodeError::Malformed(reason)) = init.pixel_format.validate() {
            return Err(SessionError::DecodeFailure(format!("ServerInit: {reason}")));
        }
        let pixels = u64::from(init.framebuffer_width) * u64::from(init.framebuffer_height);
        if pixels > self.max_framebuffer_pixels {
            return Err(SessionError::DecodeFailure(format!(
                "ServerInit: {}x{} framebuffer exceeds {} pixels",
                init.framebuffer_width, init.framebuffer_height, self.max_framebuffer_pixels
            )));
        }
        Ok(())
    }

    fn server_init(&mut self, stream: &mut ByteStream) -> Result<ServerState, SessionError> {
        let decoded = decode::commit::<ServerInit>(stream)?;
        let init = decoded.value;
        self.check_server_init(&init)?;

        self.pixel_format = init.pixel_format;
        self.framebuffer = Framebuffer::new(
            u32::from(init.framebuffer_width),
            u32::from(init.framebuffer_height),
        );
        self.image_sink = Some(self.images.create());

        info!(
            session = self.id,
            at = %decoded.span.first,
            server = %self.flows.dst_endpoint(),
            client = %self.flows.src_endpoint(),
            name = %String::from_utf8_lossy(&init.name),
            width = init.framebuffer_width,
            height = init.framebuffer_height,
            "Got ServerInit"
        );

        self.client = ClientState::Established;
        Ok(ServerState::Established)
    }

    fn server_message(&mut self, stream: &mut ByteStream) -> Result<ServerState, SessionError> {
        let tag = decode::peek::<u8>(&*stream)?.value;
        match ServerMessageType::from_u8(tag) {
            Some(ServerMessageType::FramebufferUpdate) => {
                let update = decode::commit::<FramebufferUpdate>(stream)?;
                let pending = update.value.number_of_rectangles;
                trace!(target: FRAMING, session = self.id, rectangles = pending, "FramebufferUpdate");
                self.update_time = Some(update.span.first);
                Ok(ServerState::Rectangles { pending })
            }
            Some(ServerMessageType::ServerCutText) => {
                self.clipboard(stream, Role::Server)?;
                Ok(ServerState::Established)
            }
            _ => Err(SessionError::UnhandledMessage {
                side: Role::Server,
                message_type: tag,
            }),
        }
    }

    fn rectangle(
        &mut self,
        stream: &mut ByteStream,
        pending: u16,
    ) -> Result<ServerState, SessionError> {
        if pending == 0 {
            self.flush_frame();
            return Ok(ServerState::Established);
        }

        let header = decode::peek::<Rectangle>(&*stream)?.value;
        let decoder = self
            .decoders
            .get(header.encoding)
            .ok_or(SessionError::UnhandledEncoding(header.encoding))?;
        decoder.decode(stream, &self.pixel_format, &mut self.framebuffer)?;

        trace!(
            target: FRAMING,
            session = self.id,
            x = header.x,
            y = header.y,
            width = header.width,
            height = header.height,
            encoding = encoding_name(header.encoding),
            "Rectangle"
        );
        Ok(ServerState::Rectangles {
            pending: pending - 1,
        })
    }

    fn flush_frame(&mut self) {
        let (Some(sink), Some(at)) = (self.image_sink.as_mut(), self.update_time) else {
            return;
        };
        match sink.write(self.framebuffer.image(), at) {
            Ok(()) => self.frames += 1,
            Err(e) => warn!(session = self.id, error = %e, "Failed to write frame"),
        }
    }

    fn client_message(&mut self, stream: &mut ByteStream) -> Result<ClientState, SessionError> {
        let tag = decode::peek::<u8>(&*stream)?.value;
        match ClientMessageType::from_u8(tag) {
            Some(ClientMessageType::SetPixelFormat) => {
                let message = decode::commit::<SetPixelFormat>(stream)?.value;
                if self.negotiate_pixel_format {
                    debug!(session = self.id, format = ?message.pixel_format, "Pixel format negotiated");
                    self.pixel_format = message.pixel_format;
                }
            }
            Some(ClientMessageType::FixColourMapEntries) if stream.length() == 1 => {
                // A lone byte is the ClientInit shared flag seen out of order.
                stream.clear();
            }
            Some(ClientMessageType::SetEncodings) => {
                let message = decode::commit::<SetEncodings>(stream)?.value;
                let names: Vec<&str> = message.encodings.iter().map(|&e| encoding_name(e)).collect();
                debug!(session = self.id, encodings = ?names, "SetEncodings");
                self.encodings = message.encodings;
            }
            Some(ClientMessageType::FramebufferUpdateRequest) => {
                decode::commit::<FramebufferUpdateRequest>(stream)?;
            }
            Some(ClientMessageType::KeyEvent) => {
                decode::commit::<KeyEvent>(stream)?;
            }
            Some(ClientMessageType::PointerEvent) => {
                decode::commit::<PointerEvent>(stream)?;
            }
            Some(ClientMessageType::ClientCutText) => {
                self.clipboard(stream, Role::Client)?;
            }
            Some(ClientMessageType::FixColourMapEntries) | None => {
                return Err(SessionError::UnhandledMessage {
                    side: Role::Client,
                    message_type: tag,
                })
            }
        }
        Ok(ClientState::Established)
    }

    /// Decode a cut-text message in either direction and hand its payload
    /// to a new file sink.
    fn clipboard(&mut self, stream: &mut ByteStream, role: Role) -> Result<(), SessionError> {
        let extended = self.has_extended_clipboard()
            && decode::peek::<CutTextHeader>(&*stream)?.value.is_extended();
        let (payload, at) = if extended {
            let decoded = decode::commit::<ExtendedCutText>(stream)?;
            (decoded.value.payload, decoded.span.first)
        } else {
            let decoded = decode::commit::<CutText>(stream)?;
            (decoded.value.text, decoded.span.first)
        };
        debug!(
            session = self.id,
            side = %role,
            extended,
            bytes = payload.len(),
            "Clipboard payload"
        );

        let mut sink = self.files.create();
        let written = sink
            .write(&mut payload.as_slice(), at)
            .map_err(SessionError::Sink);
        if let Err(e) = sink.close() {
            warn!(session = self.id, error = %e, "Failed to close clipboard file");
        }
        written
    }
}

impl Session for RfbSession {
    fn on_client(&mut self, stream: &mut ByteStream) {
        loop {
            let step = match self.client {
                ClientState::Pending => {
                    self.client = ClientState::Discarding;
                    return;
                }
                ClientState::Discarding | ClientState::Abandoned => {
                    stream.clear();
                    return;
                }
                ClientState::Established => self.client_message(stream),
            };
            match step {
                Ok(next) => self.client = next,
                Err(err) => {
                    if self.settle(Role::Client, &err) {
                        self.client = ClientState::Abandoned;
                        stream.clear();
                    }
                    return;
                }
            }
        }
    }

    fn on_server(&mut self, stream: &mut ByteStream) {
        loop {
            let step = match self.server {
                ServerState::AwaitServerInit => self.server_init(stream),
                ServerState::Established => self.server_message(stream),
                ServerState::Rectangles { pending } => self.rectangle(stream, pending),
                ServerState::Abandoned => {
                    stream.clear();
                    return;
                }
            };
            match step {
                Ok(next) => self.server = next,
                Err(err) => {
                    if self.settle(Role::Server, &err) {
                        self.server = ServerState::Abandoned;
                        stream.clear();
                    }
                    return;
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut sink) = self.image_sink.take() {
            if let Err(e) = sink.close() {
                warn!(session = self.id, error = %e, "Failed to close image sink");
            }
        }
        debug!(session = self.id, frames = self.frames, "Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;
    use bytes::BytesMut;
    use chrono::{Duration, TimeZone, Utc};
    use rfb_common::Flow;
    use rfb_protocol::messages::{ENCODING_ZLIB, PSEUDO_ENCODING_CURSOR};
    use std::net::{IpAddr, Ipv4Addr};

    fn session() -> RfbSession {
        RfbSession::new(
            7,
            FlowPair::new(
                Flow::new(
                    IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                    IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                ),
                Flow::new(40000, 5900),
            ),
            &SessionConfig::default(),
            Arc::new(NullSink),
            Arc::new(NullSink),
        )
    }

    fn at(ms: i64) -> Timestamp {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + Duration::milliseconds(ms)
    }

    fn server_init_bytes(width: u16, height: u16) -> BytesMut {
        let mut buf = BytesMut::new();
        ServerInit {
            framebuffer_width: width,
            framebuffer_height: height,
            pixel_format: PixelFormat::rgb888(),
            name: b"desktop".to_vec(),
        }
        .encode(&mut buf);
        buf
    }

    fn established() -> (RfbSession, ByteStream, ByteStream) {
        let mut session = session();
        let client = ByteStream::new();
        let mut server = ByteStream::new();
        server.push(server_init_bytes(16, 8).freeze(), at(0));
        session.on_server(&mut server);
        assert_eq!(session.server_state(), ServerState::Established);
        (session, client, server)
    }

    #[test]
    fn test_server_init_establishes_both_sides() {
        let (session, _, server) = established();
        assert_eq!(session.client_state(), ClientState::Established);
        assert_eq!(session.framebuffer().dimensions(), (16, 8));
        assert_eq!(server.length(), 0);
    }

    #[test]
    fn test_partial_server_init_waits() {
        let mut session = session();
        let bytes = server_init_bytes(16, 8);
        let mut server = ByteStream::new();
        server.push(bytes[..10].to_vec(), at(0));
        session.on_server(&mut server);
        assert_eq!(session.server_state(), ServerState::AwaitServerInit);
        assert_eq!(server.length(), 10);

        server.push(bytes[10..].to_vec(), at(1));
        session.on_server(&mut server);
        assert_eq!(session.server_state(), ServerState::Established);
    }

    #[test]
    fn test_client_waits_for_server_init() {
        let mut session = session();
        let mut client = ByteStream::new();

        client.push(vec![0x01], at(0));
        session.on_client(&mut client);
        assert_eq!(session.client_state(), ClientState::Discarding);
        assert_eq!(client.length(), 1);

        client.push(vec![0x03, 0x00], at(1));
        session.on_client(&mut client);
        assert_eq!(client.length(), 0);
    }

    #[test]
    fn test_lone_fix_colour_map_byte_is_cleared() {
        let (mut session, mut client, _) = established();
        client.push(vec![0x01], at(1));
        session.on_client(&mut client);
        assert_eq!(client.length(), 0);
        assert_eq!(session.client_state(), ClientState::Established);
    }

    #[test]
    fn test_fix_colour_map_entries_is_unhandled() {
        let (mut session, mut client, _) = established();
        client.push(vec![0x01, 0x00, 0x00, 0x00, 0x00, 0x00], at(1));
        session.on_client(&mut client);
        assert_eq!(session.client_state(), ClientState::Abandoned);
        assert_eq!(client.length(), 0);

        client.push(vec![0x02], at(2));
        session.on_client(&mut client);
        assert_eq!(client.length(), 0);
    }

    #[test]
    fn test_set_encodings_are_recorded() {
        let (mut session, mut client, _) = established();
        let mut buf = BytesMut::new();
        SetEncodings {
            encodings: vec![ENCODING_ZLIB, PSEUDO_ENCODING_CURSOR],
        }
        .encode(&mut buf);
        FramebufferUpdateRequest {
            incremental: 1,
            x: 0,
            y: 0,
            width: 16,
            height: 8,
        }
        .encode(&mut buf);
        client.push(buf.freeze(), at(1));
        session.on_client(&mut client);

        assert_eq!(session.encodings(), &[ENCODING_ZLIB, PSEUDO_ENCODING_CURSOR]);
        assert_eq!(client.length(), 0);
    }

    #[test]
    fn test_set_pixel_format_only_applies_when_negotiating() {
        let requested = PixelFormat {
            big_endian: 1,
            ..PixelFormat::rgb888()
        };
        let mut buf = BytesMut::new();
        SetPixelFormat {
            pixel_format: requested.clone(),
        }
        .encode(&mut buf);
        let bytes = buf.freeze();

        let (mut session, mut client, _) = established();
        client.push(bytes.clone(), at(1));
        session.on_client(&mut client);
        assert_eq!(session.pixel_format(), &PixelFormat::rgb888());

        let (mut session, mut client, _) = established();
        session.negotiate_pixel_format = true;
        client.push(bytes, at(1));
        session.on_client(&mut client);
        assert_eq!(session.pixel_format(), &requested);
    }

    #[test]
    fn test_empty_update_flushes_immediately() {
        let (mut session, _, mut server) = established();
        let mut buf = BytesMut::new();
        FramebufferUpdate {
            number_of_rectangles: 0,
        }
        .encode(&mut buf);
        server.push(buf.freeze(), at(5));
        session.on_server(&mut server);

        assert_eq!(session.server_state(), ServerState::Established);
        assert_eq!(session.frames(), 1);
    }

    #[test]
    fn test_unknown_server_message_abandons_server_only() {
        let (mut session, mut client, mut server) = established();
        server.push(vec![0x02], at(1));
        session.on_server(&mut server);
        assert_eq!(session.server_state(), ServerState::Abandoned);

        let mut buf = BytesMut::new();
        KeyEvent { down: 1, key: 0x61 }.encode(&mut buf);
        client.push(buf.freeze(), at(2));
        session.on_client(&mut client);
        assert_eq!(session.client_state(), ClientState::Established);
        assert_eq!(client.length(), 0);
    }

    #[test]
    fn test_end_of_stream_mid_message_is_not_fatal() {
        let (mut session, mut client, _) = established();
        client.push(vec![0x04, 0x01], at(1));
        client.mark_complete();
        session.on_client(&mut client);
        assert_eq!(session.client_state(), ClientState::Established);
    }
}
