//! Cursor pseudo-encodings.
//!
//! Cursor shapes are not part of the reconstructed picture. These decoders
//! only frame the payload so that it is consumed and the next rectangle lines
//! up.
//!
//! # Wire Format
//!
//! Cursor (-239):
//!
//! ```text
//! | header | width*height*(bpp/8) pixel bytes | ceil(width/8)*height mask bytes |
//! ```
//!
//! XCursor (-240):
//!
//! ```text
//! | header | 3 bytes primary RGB | 3 bytes secondary RGB | bitmap | mask |
//! ```
//!
//! where bitmap and mask are each `ceil(width/8)*height` bytes.

use rfb_protocol::decode::{self, DecodeWith};
use rfb_protocol::messages::{CursorRectangle, XCursorRectangle};

use crate::{
    ByteStream, Decoder, DecoderError, Framebuffer, PixelFormat, PSEUDO_ENCODING_CURSOR,
    PSEUDO_ENCODING_XCURSOR,
};

/// Decoder for the rich cursor pseudo-encoding.
#[derive(Debug, Default)]
pub struct CursorDecoder;

impl Decoder for CursorDecoder {
    fn encoding_type(&self) -> i32 {
        PSEUDO_ENCODING_CURSOR
    }

    fn decode(
        &mut self,
        stream: &mut ByteStream,
        pixel_format: &PixelFormat,
        _buffer: &mut Framebuffer,
    ) -> Result<(), DecoderError> {
        let cursor =
            decode::commit_with(stream, |r| CursorRectangle::decode_with(r, pixel_format))?;
        tracing::trace!(
            "Cursor: skipped {}x{} shape ({} bytes)",
            cursor.value.header.width,
            cursor.value.header.height,
            cursor.consumed
        );
        Ok(())
    }
}

/// Decoder for the X cursor pseudo-encoding.
#[derive(Debug, Default)]
pub struct XCursorDecoder;

impl Decoder for XCursorDecoder {
    fn encoding_type(&self) -> i32 {
        PSEUDO_ENCODING_XCURSOR
    }

    fn decode(
        &mut self,
        stream: &mut ByteStream,
        _pixel_format: &PixelFormat,
        _buffer: &mut Framebuffer,
    ) -> Result<(), DecoderError> {
        let cursor = decode::commit::<XCursorRectangle>(stream)?;
        tracing::trace!(
            "XCursor: skipped {}x{} shape ({} bytes)",
            cursor.value.header.width,
            cursor.value.header.height,
            cursor.consumed
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rectangle;
    use rfb_protocol::io::PeekStream;

    fn header(width: u16, height: u16, encoding: i32) -> Vec<u8> {
        let mut out = Vec::new();
        Rectangle {
            x: 0,
            y: 0,
            width,
            height,
            encoding,
        }
        .encode(&mut out);
        out
    }

    #[test]
    fn test_cursor_payload_is_consumed() {
        let mut bytes = header(3, 2, PSEUDO_ENCODING_CURSOR);
        bytes.extend(vec![0xaa; 3 * 2 * 4]);
        bytes.extend(vec![0xff; 2]);
        bytes.push(0x00); // next message

        let mut stream = ByteStream::new();
        stream.push(bytes, chrono::Utc::now());
        let mut fb = Framebuffer::new(8, 8);
        let before = fb.image().clone();

        CursorDecoder
            .decode(&mut stream, &PixelFormat::rgb888(), &mut fb)
            .unwrap();
        assert_eq!(stream.length(), 1);
        assert_eq!(fb.image(), &before);
    }

    #[test]
    fn test_cursor_waits_for_mask() {
        let mut bytes = header(8, 1, PSEUDO_ENCODING_CURSOR);
        bytes.extend(vec![0; 8 * 4]);

        let mut stream = ByteStream::new();
        stream.push(bytes, chrono::Utc::now());
        let err = CursorDecoder
            .decode(&mut stream, &PixelFormat::rgb888(), &mut Framebuffer::new(1, 1))
            .unwrap_err();
        assert!(err.is_incomplete());
        assert_eq!(stream.length(), 12 + 32);
    }

    #[test]
    fn test_xcursor_payload_is_consumed() {
        let mut bytes = header(10, 2, PSEUDO_ENCODING_XCURSOR);
        bytes.extend([255, 255, 255, 0, 0, 0]);
        bytes.extend(vec![0x0f; 4]);
        bytes.extend(vec![0xf0; 4]);

        let mut stream = ByteStream::new();
        stream.push(bytes, chrono::Utc::now());
        XCursorDecoder
            .decode(&mut stream, &PixelFormat::rgb888(), &mut Framebuffer::new(1, 1))
            .unwrap();
        assert_eq!(stream.length(), 0);
    }
}
