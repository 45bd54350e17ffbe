//! RFB protocol message types.
//!
//! This module provides the wire shapes of the RFB messages that appear after
//! the handshake, in both directions:
//!
//! - **Core types** ([`types`]) - PixelFormat, Rectangle, clipboard records and encoding constants
//! - **Server messages** ([`server`]) - ServerInit, FramebufferUpdate and rectangle payloads
//! - **Client messages** ([`client`]) - SetPixelFormat, SetEncodings, input events
//!
//! # Wire Format Rules
//!
//! 1. **Big-endian byte order** - All multi-byte integers use network byte order
//! 2. **Lenient flags and padding** - Captured bytes are accepted as they are;
//!    flag bytes are non-zero-is-true and padding is skipped
//! 3. **Leading tags** - Message records consume their type byte; rectangle
//!    payload records start at the rectangle header
//!
//! # Examples
//!
//! ```
//! use rfb_protocol::decode::{Decode, Reader};
//! use rfb_protocol::messages::{PointerEvent, ClientMessageType};
//!
//! let bytes = [5u8, 1, 0, 10, 0, 20];
//! assert_eq!(ClientMessageType::from_u8(bytes[0]), Some(ClientMessageType::PointerEvent));
//! let event = PointerEvent::decode(&mut Reader::new(&bytes)).unwrap();
//! assert_eq!((event.x, event.y), (10, 20));
//! ```

pub mod client;
pub mod server;
pub mod types;

mod proptest_framing;

// Re-export commonly used types
pub use types::{
    encoding_name, CutText, CutTextHeader, ExtendedCutText, PixelFormat, Rectangle,
    ENCODING_RAW, ENCODING_ZLIB, PSEUDO_ENCODING_CURSOR, PSEUDO_ENCODING_EXTENDED_CLIPBOARD,
    PSEUDO_ENCODING_XCURSOR,
};

pub use server::{
    CursorRectangle, FramebufferUpdate, ServerInit, ServerMessageType, XCursorRectangle,
    ZlibRectangle,
};

pub use client::{
    ClientMessageType, FramebufferUpdateRequest, KeyEvent, PointerEvent, SetEncodings,
    SetPixelFormat,
};
