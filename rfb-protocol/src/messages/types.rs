//! Core RFB protocol types.
//!
//! This module defines fundamental types used throughout the RFB protocol:
//! - [`PixelFormat`] - Describes pixel format (bit depths, color channels, endianness)
//! - [`Rectangle`] - Rectangle header with encoding type
//! - [`CutText`] / [`ExtendedCutText`] - Clipboard transfers, shared by both directions
//! - Encoding constants for different compression/encoding schemes

use bytes::BufMut;

use crate::decode::{Decode, DecodeError, Length, Reader};

/// RFB pixel format: how a pixel word maps to red, green and blue.
///
/// # Wire Format
///
/// PixelFormat is 16 bytes on the wire:
/// - 1 byte: bits_per_pixel
/// - 1 byte: depth
/// - 1 byte: big_endian
/// - 1 byte: true_color
/// - 2 bytes: red_max
/// - 2 bytes: green_max
/// - 2 bytes: blue_max
/// - 1 byte: red_shift
/// - 1 byte: green_shift
/// - 1 byte: blue_shift
/// - 3 bytes: padding
///
/// Captured traffic is taken as-is: flag bytes are read as "non-zero is true"
/// and padding is skipped without inspection.
///
/// # Examples
///
/// ```
/// use rfb_protocol::messages::types::PixelFormat;
///
/// let pf = PixelFormat::rgb888();
/// assert_eq!(pf.bytes_per_pixel(), 4);
/// assert!(!pf.is_big_endian());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: u8,
    pub true_color: u8,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Size of the record on the wire.
    pub const WIRE_SIZE: usize = 16;

    /// 32bpp little-endian true colour with 8 bits per channel.
    pub const fn rgb888() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: 0,
            true_color: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// Calculate bytes per pixel (1, 2, 3, or 4).
    pub fn bytes_per_pixel(&self) -> u8 {
        self.bits_per_pixel.div_ceil(8)
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian != 0
    }

    pub fn is_true_color(&self) -> bool {
        self.true_color != 0
    }

    /// Reject formats whose pixels cannot be sized in whole bytes.
    pub fn validate(&self) -> Result<(), DecodeError> {
        match self.bits_per_pixel {
            8 | 16 | 24 | 32 => Ok(()),
            bpp => Err(DecodeError::Malformed(format!("{bpp} bits per pixel"))),
        }
    }

    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u8(self.bits_per_pixel);
        out.put_u8(self.depth);
        out.put_u8(self.big_endian);
        out.put_u8(self.true_color);
        out.put_u16(self.red_max);
        out.put_u16(self.green_max);
        out.put_u16(self.blue_max);
        out.put_u8(self.red_shift);
        out.put_u8(self.green_shift);
        out.put_u8(self.blue_shift);
        out.put_bytes(0, 3);
    }
}

impl Decode for PixelFormat {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let pf = Self {
            bits_per_pixel: r.u8()?,
            depth: r.u8()?,
            big_endian: r.u8()?,
            true_color: r.u8()?,
            red_max: r.u16()?,
            green_max: r.u16()?,
            blue_max: r.u16()?,
            red_shift: r.u8()?,
            green_shift: r.u8()?,
            blue_shift: r.u8()?,
        };
        r.skip(3)?;
        Ok(pf)
    }
}

/// Rectangle header in a FramebufferUpdate message.
///
/// # Wire Format
///
/// - 2 bytes: x
/// - 2 bytes: y
/// - 2 bytes: width
/// - 2 bytes: height
/// - 4 bytes: encoding type (signed)
///
/// The encoding-specific payload follows and is decoded separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: i32,
}

impl Rectangle {
    pub const WIRE_SIZE: usize = 12;

    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u16(self.x);
        out.put_u16(self.y);
        out.put_u16(self.width);
        out.put_u16(self.height);
        out.put_i32(self.encoding);
    }
}

impl Decode for Rectangle {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            x: r.u16()?,
            y: r.u16()?,
            width: r.u16()?,
            height: r.u16()?,
            encoding: r.i32()?,
        })
    }
}

/// Legacy clipboard transfer: ClientCutText (type 6) or ServerCutText (type 3).
///
/// - 1 byte: message type
/// - 3 bytes: padding
/// - 4 bytes: length
/// - `length` bytes: text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutText {
    pub text: Vec<u8>,
}

impl CutText {
    pub fn encode(&self, message_type: u8, out: &mut impl BufMut) {
        out.put_u8(message_type);
        out.put_bytes(0, 3);
        out.put_u32(self.text.len() as u32);
        out.put_slice(&self.text);
    }
}

impl Decode for CutText {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.u8()?;
        r.skip(3)?;
        let length = r.u32()?;
        let text = r.string(Length::field(length))?;
        Ok(Self { text })
    }
}

/// Common prefix of both clipboard forms. A negative length marks the
/// extended form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutTextHeader {
    pub length: i32,
}

impl CutTextHeader {
    pub fn is_extended(&self) -> bool {
        self.length < 0
    }
}

impl Decode for CutTextHeader {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.u8()?;
        r.skip(3)?;
        Ok(Self { length: r.i32()? })
    }
}

/// Extended clipboard message.
///
/// The header length is negative and its magnitude covers the 4-byte flags
/// word plus the payload, so the payload is `-length - 4` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedCutText {
    pub flags: u32,
    pub payload: Vec<u8>,
}

impl ExtendedCutText {
    pub fn encode(&self, message_type: u8, out: &mut impl BufMut) {
        out.put_u8(message_type);
        out.put_bytes(0, 3);
        out.put_i32(-((self.payload.len() + 4) as i32));
        out.put_u32(self.flags);
        out.put_slice(&self.payload);
    }
}

impl Decode for ExtendedCutText {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let header = CutTextHeader::decode(r)?;
        let size = -i64::from(header.length) - 4;
        if size < 0 {
            return Err(DecodeError::Malformed(format!(
                "extended clipboard length {}",
                header.length
            )));
        }
        let flags = r.u32()?;
        let payload = r.string(Length::Literal(size as usize))?;
        Ok(Self { flags, payload })
    }
}

// Encodings
pub const ENCODING_RAW: i32 = 0;
pub const ENCODING_COPYRECT: i32 = 1;
pub const ENCODING_RRE: i32 = 2;
pub const ENCODING_CORRE: i32 = 4;
pub const ENCODING_HEXTILE: i32 = 5;
pub const ENCODING_ZLIB: i32 = 6;
pub const ENCODING_TIGHT: i32 = 7;
pub const ENCODING_ZLIBHEX: i32 = 8;
pub const ENCODING_TRLE: i32 = 15;
pub const ENCODING_ZRLE: i32 = 16;
pub const ENCODING_JPEG: i32 = 21;
pub const ENCODING_OPENH264: i32 = 50;
pub const ENCODING_TIGHT_PNG: i32 = -260;

// Pseudo-encodings
pub const PSEUDO_ENCODING_DESKTOP_SIZE: i32 = -223;
pub const PSEUDO_ENCODING_LAST_RECT: i32 = -224;
pub const PSEUDO_ENCODING_POINTER_POSITION: i32 = -232;
pub const PSEUDO_ENCODING_CURSOR: i32 = -239;
pub const PSEUDO_ENCODING_XCURSOR: i32 = -240;
pub const PSEUDO_ENCODING_EXTENDED_DESKTOP_SIZE: i32 = -308;
pub const PSEUDO_ENCODING_CURSOR_WITH_ALPHA: i32 = -314;
pub const PSEUDO_ENCODING_EXTENDED_CLIPBOARD: i32 = -1_063_131_698; // 0xC0A1E5CE

/// JPEG quality levels 1..=10 occupy -32..=-23.
pub const PSEUDO_ENCODING_JPEG_QUALITY_RANGE: std::ops::RangeInclusive<i32> = -32..=-23;
/// Compression levels 1..=10 occupy -256..=-247.
pub const PSEUDO_ENCODING_COMPRESS_LEVEL_RANGE: std::ops::RangeInclusive<i32> = -256..=-247;

/// Human-readable name for an encoding number, for log output.
pub fn encoding_name(encoding: i32) -> &'static str {
    match encoding {
        ENCODING_RAW => "Raw",
        ENCODING_COPYRECT => "CopyRect",
        ENCODING_RRE => "RRE",
        ENCODING_CORRE => "CoRRE",
        ENCODING_HEXTILE => "Hextile",
        ENCODING_ZLIB => "Zlib",
        ENCODING_TIGHT => "Tight",
        ENCODING_ZLIBHEX => "ZlibHex",
        ENCODING_TRLE => "TRLE",
        ENCODING_ZRLE => "ZRLE",
        ENCODING_JPEG => "JPEG",
        ENCODING_OPENH264 => "OpenH264",
        ENCODING_TIGHT_PNG => "TightPNG",
        PSEUDO_ENCODING_DESKTOP_SIZE => "DesktopSize",
        PSEUDO_ENCODING_LAST_RECT => "LastRect",
        PSEUDO_ENCODING_POINTER_POSITION => "PointerPosition",
        PSEUDO_ENCODING_CURSOR => "Cursor",
        PSEUDO_ENCODING_XCURSOR => "XCursor",
        PSEUDO_ENCODING_EXTENDED_DESKTOP_SIZE => "ExtendedDesktopSize",
        PSEUDO_ENCODING_CURSOR_WITH_ALPHA => "CursorWithAlpha",
        PSEUDO_ENCODING_EXTENDED_CLIPBOARD => "ExtendedClipboard",
        e if PSEUDO_ENCODING_JPEG_QUALITY_RANGE.contains(&e) => "JPEGQuality",
        e if PSEUDO_ENCODING_COMPRESS_LEVEL_RANGE.contains(&e) => "CompressionLevel",
        _ => "Unknown",
    }
}
