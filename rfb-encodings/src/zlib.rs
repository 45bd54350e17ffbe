//! Zlib encoding decoder - zlib-compressed raw pixels.
//!
//! Zlib encoding (type 6) carries raw pixel data in the session pixel format,
//! compressed with a single zlib stream that spans every zlib rectangle of the
//! session.
//!
//! # Wire Format
//!
//! ```text
//! +------------------+
//! | rectangle header |  12 bytes (x, y, width, height, encoding)
//! +------------------+
//! | length           |  4 bytes (u32 big-endian) - length of zlib data
//! +------------------+
//! | zlib_data        |  'length' bytes
//! +------------------+
//! ```
//!
//! # Stream Continuity
//!
//! Only the first rectangle starts with a zlib header (0x78). Later rectangles
//! continue the same deflate stream, so the inflater lives for the session.
//! Decompressed bytes are kept in a backlog: a rectangle's compressed data does
//! not have to line up with its pixels, and the pixels are taken from the
//! backlog in order.

use flate2::{Decompress, DecompressError, FlushDecompress, Status};
use rfb_common::Rect;
use rfb_protocol::decode;
use rfb_protocol::messages::ZlibRectangle;

use crate::{ByteStream, Decoder, DecoderError, Framebuffer, PixelFormat, ENCODING_ZLIB};

/// Output chunk size for each inflate call.
const INFLATE_CHUNK: usize = 64 * 1024;

/// Persistent inflater with a backlog of decompressed bytes not yet drawn.
pub struct ZlibStream {
    inflater: Decompress,
    backlog: Vec<u8>,
}

impl Default for ZlibStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ZlibStream {
    pub fn new() -> Self {
        Self {
            inflater: Decompress::new(true), // true = zlib wrapper
            backlog: Vec::new(),
        }
    }

    /// Decompress `compressed` onto the backlog. Returns the number of bytes
    /// produced.
    pub fn feed(&mut self, compressed: &[u8]) -> Result<usize, DecompressError> {
        let mut out_buf = vec![0u8; INFLATE_CHUNK];
        let mut in_pos = 0;
        let mut produced_total = 0;

        loop {
            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();

            let status = self.inflater.decompress(
                &compressed[in_pos..],
                &mut out_buf,
                FlushDecompress::Sync,
            )?;

            let consumed = (self.inflater.total_in() - before_in) as usize;
            let produced = (self.inflater.total_out() - before_out) as usize;
            in_pos += consumed;
            produced_total += produced;
            self.backlog.extend_from_slice(&out_buf[..produced]);

            if matches!(status, Status::StreamEnd) {
                if in_pos < compressed.len() {
                    tracing::warn!(
                        "Zlib: stream ended early, consumed {}/{} bytes",
                        in_pos,
                        compressed.len()
                    );
                }
                break;
            }
            // A full output buffer may hide more pending output.
            if in_pos >= compressed.len() && produced < out_buf.len() {
                break;
            }
            if consumed == 0 && produced == 0 {
                break;
            }
        }

        tracing::trace!(
            "Zlib: decompressed {} -> {} bytes",
            compressed.len(),
            produced_total
        );
        Ok(produced_total)
    }

    /// Decompressed bytes waiting to be drawn.
    pub fn available(&self) -> usize {
        self.backlog.len()
    }

    /// Take exactly `n` bytes from the front of the backlog.
    pub fn take(&mut self, n: usize) -> Result<Vec<u8>, DecoderError> {
        if n > self.backlog.len() {
            return Err(DecoderError::ZlibUnderrun {
                needed: n,
                available: self.backlog.len(),
            });
        }
        Ok(self.backlog.drain(..n).collect())
    }
}

/// Decoder for Zlib encoding.
#[derive(Default)]
pub struct ZlibDecoder {
    stream: ZlibStream,
}

impl ZlibDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ZlibDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_ZLIB
    }

    fn decode(
        &mut self,
        stream: &mut ByteStream,
        pixel_format: &PixelFormat,
        buffer: &mut Framebuffer,
    ) -> Result<(), DecoderError> {
        let rect = decode::commit::<ZlibRectangle>(stream)?.value;
        self.stream.feed(&rect.data)?;

        let header = rect.header;
        let area = usize::from(header.width) * usize::from(header.height);
        if area == 0 {
            return Ok(());
        }
        if pixel_format.bits_per_pixel != 32 {
            return Err(DecoderError::UnhandledBitsPerPixel(
                pixel_format.bits_per_pixel,
            ));
        }

        let pixels = self.stream.take(area * 4)?;
        let dest = Rect::new(
            i32::from(header.x),
            i32::from(header.y),
            u32::from(header.width),
            u32::from(header.height),
        );
        let format = rfb_pixelbuffer::PixelFormat::from(pixel_format);
        buffer.image_rect(dest, &pixels, &format)?;
        Ok(())
    }
}
