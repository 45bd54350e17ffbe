//! Server-to-client RFB messages and rectangle payloads.
//!
//! Message type tags:
//! - 0: FramebufferUpdate
//! - 1: SetColorMapEntries
//! - 2: Bell
//! - 3: ServerCutText

use bytes::BufMut;

use super::types::{PixelFormat, Rectangle};
use crate::decode::{Decode, DecodeError, DecodeWith, Length, Reader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessageType {
    FramebufferUpdate,
    SetColorMapEntries,
    Bell,
    ServerCutText,
}

impl ServerMessageType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::FramebufferUpdate),
            1 => Some(Self::SetColorMapEntries),
            2 => Some(Self::Bell),
            3 => Some(Self::ServerCutText),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::FramebufferUpdate => 0,
            Self::SetColorMapEntries => 1,
            Self::Bell => 2,
            Self::ServerCutText => 3,
        }
    }
}

/// ServerInit message - the server's first message after security
/// negotiation completes.
///
/// # Wire Format
///
/// - 2 bytes: framebuffer width
/// - 2 bytes: framebuffer height
/// - 16 bytes: pixel format
/// - 4 bytes: name length
/// - N bytes: name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInit {
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub pixel_format: PixelFormat,
    pub name: Vec<u8>,
}

impl ServerInit {
    /// Desktop name, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }

    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u16(self.framebuffer_width);
        out.put_u16(self.framebuffer_height);
        self.pixel_format.encode(out);
        out.put_u32(self.name.len() as u32);
        out.put_slice(&self.name);
    }
}

impl Decode for ServerInit {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let framebuffer_width = r.u16()?;
        let framebuffer_height = r.u16()?;
        let pixel_format = r.field()?;
        let name_length = r.u32()?;
        let name = r.string(Length::field(name_length))?;
        Ok(Self {
            framebuffer_width,
            framebuffer_height,
            pixel_format,
            name,
        })
    }
}

/// FramebufferUpdate header.
///
/// - 1 byte: message type (0)
/// - 1 byte: padding
/// - 2 bytes: number of rectangles
///
/// The rectangles follow as separate records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdate {
    pub number_of_rectangles: u16,
}

impl FramebufferUpdate {
    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u8(ServerMessageType::FramebufferUpdate.as_u8());
        out.put_u8(0);
        out.put_u16(self.number_of_rectangles);
    }
}

impl Decode for FramebufferUpdate {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.u8()?;
        r.skip(1)?;
        Ok(Self {
            number_of_rectangles: r.u16()?,
        })
    }
}

/// Zlib-encoded rectangle: header, 4-byte length, compressed bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZlibRectangle {
    pub header: Rectangle,
    pub data: Vec<u8>,
}

impl ZlibRectangle {
    pub fn encode(&self, out: &mut impl BufMut) {
        self.header.encode(out);
        out.put_u32(self.data.len() as u32);
        out.put_slice(&self.data);
    }
}

impl Decode for ZlibRectangle {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let header = r.field()?;
        let length = r.u32()?;
        let data = r.string(Length::field(length))?;
        Ok(Self { header, data })
    }
}

/// Rich-cursor pseudo-rectangle: `width * height` pixels in the session
/// pixel format followed by a 1bpp mask with rows padded to whole bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorRectangle {
    pub header: Rectangle,
    pub pixels: Vec<u8>,
    pub bitmask: Vec<u8>,
}

/// Byte length of a 1bpp mask of `width * height`.
pub fn mask_len(width: u16, height: u16) -> usize {
    usize::from(width).div_ceil(8) * usize::from(height)
}

impl DecodeWith<&PixelFormat> for CursorRectangle {
    fn decode_with(r: &mut Reader<'_>, pf: &PixelFormat) -> Result<Self, DecodeError> {
        let header: Rectangle = r.field()?;
        let pixel_len = usize::from(header.width)
            * usize::from(header.height)
            * usize::from(pf.bits_per_pixel / 8);
        let pixels = r.string(Length::Literal(pixel_len))?;
        let bitmask = r.string(Length::Literal(mask_len(header.width, header.height)))?;
        Ok(Self {
            header,
            pixels,
            bitmask,
        })
    }
}

/// X-style cursor pseudo-rectangle: two RGB colours then a bitmap and a mask,
/// both 1bpp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XCursorRectangle {
    pub header: Rectangle,
    pub primary: [u8; 3],
    pub secondary: [u8; 3],
    pub bitmap: Vec<u8>,
    pub bitmask: Vec<u8>,
}

impl Decode for XCursorRectangle {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let header: Rectangle = r.field()?;
        let primary = r.array()?;
        let secondary = r.array()?;
        let len = mask_len(header.width, header.height);
        let bitmap = r.string(Length::Literal(len))?;
        let bitmask = r.string(Length::Literal(len))?;
        Ok(Self {
            header,
            primary,
            secondary,
            bitmap,
            bitmask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::types::ENCODING_ZLIB;
    use bytes::BytesMut;

    fn server_init() -> ServerInit {
        ServerInit {
            framebuffer_width: 1920,
            framebuffer_height: 1080,
            pixel_format: PixelFormat::rgb888(),
            name: b"Test Desktop".to_vec(),
        }
    }

    #[test]
    fn test_server_init_decode() {
        let mut buf = BytesMut::new();
        server_init().encode(&mut buf);
        assert_eq!(buf.len(), 24 + 12);

        let mut r = Reader::new(&buf);
        let decoded = ServerInit::decode(&mut r).unwrap();
        assert_eq!(decoded, server_init());
        assert_eq!(decoded.name(), Some("Test Desktop"));
    }

    #[test]
    fn test_server_init_truncated_name() {
        let mut buf = BytesMut::new();
        server_init().encode(&mut buf);
        let truncated = &buf[..buf.len() - 1];
        assert!(ServerInit::decode(&mut Reader::new(truncated))
            .unwrap_err()
            .is_incomplete());
    }

    #[test]
    fn test_server_init_invalid_name() {
        let init = ServerInit {
            name: vec![0xff, 0xfe],
            ..server_init()
        };
        assert_eq!(init.name(), None);
    }

    #[test]
    fn test_framebuffer_update_header() {
        let bytes = [0, 0xaa, 0, 2];
        let fbu = FramebufferUpdate::decode(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(fbu.number_of_rectangles, 2);
    }

    #[test]
    fn test_zlib_rectangle() {
        let rect = ZlibRectangle {
            header: Rectangle {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
                encoding: ENCODING_ZLIB,
            },
            data: vec![9, 8, 7],
        };
        let mut buf = BytesMut::new();
        rect.encode(&mut buf);
        let mut r = Reader::new(&buf);
        assert_eq!(ZlibRectangle::decode(&mut r).unwrap(), rect);
        assert_eq!(r.position(), 12 + 4 + 3);
    }

    #[test]
    fn test_cursor_rectangle_sizes() {
        // 9x2 cursor at 32bpp: 72 pixel bytes, mask rows of 2 bytes.
        let mut buf = BytesMut::new();
        Rectangle {
            x: 0,
            y: 0,
            width: 9,
            height: 2,
            encoding: -239,
        }
        .encode(&mut buf);
        buf.put_bytes(0x11, 72);
        buf.put_bytes(0xff, 4);
        buf.put_u8(0xee);

        let mut r = Reader::new(&buf);
        let cursor = CursorRectangle::decode_with(&mut r, &PixelFormat::rgb888()).unwrap();
        assert_eq!(cursor.pixels.len(), 72);
        assert_eq!(cursor.bitmask.len(), 4);
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn test_xcursor_rectangle_sizes() {
        let mut buf = BytesMut::new();
        Rectangle {
            x: 0,
            y: 0,
            width: 16,
            height: 3,
            encoding: -240,
        }
        .encode(&mut buf);
        buf.put_slice(&[1, 2, 3, 4, 5, 6]);
        buf.put_bytes(0xaa, 6);
        buf.put_bytes(0x55, 6);

        let mut r = Reader::new(&buf);
        let cursor = XCursorRectangle::decode(&mut r).unwrap();
        assert_eq!(cursor.primary, [1, 2, 3]);
        assert_eq!(cursor.secondary, [4, 5, 6]);
        assert_eq!(cursor.bitmap, vec![0xaa; 6]);
        assert_eq!(cursor.bitmask, vec![0x55; 6]);
        assert_eq!(r.remaining(), 0);
    }
}
