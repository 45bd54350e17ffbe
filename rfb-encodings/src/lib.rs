//! Rectangle decoders for reconstructed RFB sessions.
//!
//! This crate defines the [`Decoder`] trait that encoding implementations
//! implement. A decoder consumes a single framebuffer update rectangle, header
//! included, from the head of the server's [`ByteStream`], transforms it into
//! RGBA and draws it into a [`Framebuffer`].
//!
//! # Key Concepts
//!
//! - **Non-blocking**: Decoders run against whatever is buffered. A rectangle
//!   that has not fully arrived yields [`DecoderError::Decode`] with an
//!   incomplete cause, and nothing is consumed
//! - **Rectangle-based**: Decoders operate on a single rectangle at a time
//! - **Stateful encodings**: Zlib keeps one inflater for the whole session, so
//!   decoders take `&mut self`
//!
//! # Example
//!
//! ```
//! use rfb_encodings::{Decoder, DecoderError, ENCODING_RAW};
//! use rfb_encodings::{ByteStream, Framebuffer, PixelFormat};
//!
//! struct NoopDecoder;
//!
//! impl Decoder for NoopDecoder {
//!     fn encoding_type(&self) -> i32 {
//!         ENCODING_RAW
//!     }
//!
//!     fn decode(
//!         &mut self,
//!         _stream: &mut ByteStream,
//!         _pixel_format: &PixelFormat,
//!         _buffer: &mut Framebuffer,
//!     ) -> Result<(), DecoderError> {
//!         Ok(())
//!     }
//! }
//! ```
//!
//! # Encoding Types
//!
//! - [`ENCODING_ZLIB`] (6): zlib-compressed raw pixels
//! - [`PSEUDO_ENCODING_CURSOR`] (-239): rich cursor shape, skipped
//! - [`PSEUDO_ENCODING_XCURSOR`] (-240): X cursor shape, skipped

use thiserror::Error;

// Re-export types from rfb-protocol and rfb-pixelbuffer used by decoders
pub use rfb_pixelbuffer::Framebuffer;
pub use rfb_protocol::io::ByteStream;
pub use rfb_protocol::messages::types::{
    encoding_name, PixelFormat, Rectangle, ENCODING_RAW, ENCODING_ZLIB, PSEUDO_ENCODING_CURSOR,
    PSEUDO_ENCODING_XCURSOR,
};

use rfb_protocol::decode::DecodeError;

// Encoding implementations
pub mod cursor;
pub use cursor::{CursorDecoder, XCursorDecoder};

pub mod zlib;
pub use zlib::{ZlibDecoder, ZlibStream};

/// Errors raised while decoding a rectangle.
#[derive(Debug, Error)]
pub enum DecoderError {
    /// The rectangle could not be framed from the stream.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Only 32 bits per pixel is drawn.
    #[error("unhandled bits per pixel value {0}")]
    UnhandledBitsPerPixel(u8),

    #[error("zlib decompression failed: {0}")]
    Zlib(#[from] flate2::DecompressError),

    /// The inflater has not produced enough bytes for the rectangle.
    #[error("zlib stream produced {available} bytes, rectangle needs {needed}")]
    ZlibUnderrun { needed: usize, available: usize },

    #[error(transparent)]
    Draw(#[from] anyhow::Error),
}

impl DecoderError {
    /// Whether the rectangle is simply not fully buffered yet.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecoderError::Decode(e) if e.is_incomplete())
    }
}

/// Trait for decoding one rectangle encoding.
pub trait Decoder {
    /// The encoding number this decoder handles.
    fn encoding_type(&self) -> i32;

    /// Consume one rectangle (header and payload) from `stream` and draw it
    /// into `buffer`.
    ///
    /// When the rectangle is not fully buffered the stream is left untouched
    /// and the returned error reports [`DecoderError::is_incomplete`].
    fn decode(
        &mut self,
        stream: &mut ByteStream,
        pixel_format: &PixelFormat,
        buffer: &mut Framebuffer,
    ) -> Result<(), DecoderError>;
}

/// Per-session set of decoders, keyed by encoding number.
///
/// The zlib decoder is created the first time a zlib rectangle is seen and then
/// kept, since its inflater state spans the whole session.
#[derive(Default)]
pub struct Decoders {
    zlib: Option<ZlibDecoder>,
    cursor: CursorDecoder,
    xcursor: XCursorDecoder,
}

impl Decoders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder for `encoding`, or `None` if the encoding is not handled.
    pub fn get(&mut self, encoding: i32) -> Option<&mut dyn Decoder> {
        match encoding {
            ENCODING_ZLIB => {
                Some(self.zlib.get_or_insert_with(ZlibDecoder::new) as &mut dyn Decoder)
            }
            PSEUDO_ENCODING_CURSOR => Some(&mut self.cursor as &mut dyn Decoder),
            PSEUDO_ENCODING_XCURSOR => Some(&mut self.xcursor as &mut dyn Decoder),
            _ => None,
        }
    }
}
