//! Client-to-server RFB messages.
//!
//! Message type tags:
//! - 0: SetPixelFormat
//! - 1: FixColourMapEntries
//! - 2: SetEncodings
//! - 3: FramebufferUpdateRequest
//! - 4: KeyEvent
//! - 5: PointerEvent
//! - 6: ClientCutText

use bytes::BufMut;

use super::types::PixelFormat;
use crate::decode::{Decode, DecodeError, Length, Reader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessageType {
    SetPixelFormat,
    FixColourMapEntries,
    SetEncodings,
    FramebufferUpdateRequest,
    KeyEvent,
    PointerEvent,
    ClientCutText,
}

impl ClientMessageType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::SetPixelFormat),
            1 => Some(Self::FixColourMapEntries),
            2 => Some(Self::SetEncodings),
            3 => Some(Self::FramebufferUpdateRequest),
            4 => Some(Self::KeyEvent),
            5 => Some(Self::PointerEvent),
            6 => Some(Self::ClientCutText),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::SetPixelFormat => 0,
            Self::FixColourMapEntries => 1,
            Self::SetEncodings => 2,
            Self::FramebufferUpdateRequest => 3,
            Self::KeyEvent => 4,
            Self::PointerEvent => 5,
            Self::ClientCutText => 6,
        }
    }
}

/// SetPixelFormat - 1 byte type, 3 bytes padding, 16-byte pixel format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPixelFormat {
    pub pixel_format: PixelFormat,
}

impl SetPixelFormat {
    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u8(ClientMessageType::SetPixelFormat.as_u8());
        out.put_bytes(0, 3);
        self.pixel_format.encode(out);
    }
}

impl Decode for SetPixelFormat {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.u8()?;
        r.skip(3)?;
        Ok(Self {
            pixel_format: r.field()?,
        })
    }
}

/// SetEncodings - 1 byte type, 1 byte padding, 2 bytes count, then `count`
/// signed 4-byte encoding numbers in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEncodings {
    pub encodings: Vec<i32>,
}

impl SetEncodings {
    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u8(ClientMessageType::SetEncodings.as_u8());
        out.put_u8(0);
        out.put_u16(self.encodings.len() as u16);
        for encoding in &self.encodings {
            out.put_i32(*encoding);
        }
    }
}

impl Decode for SetEncodings {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.u8()?;
        r.skip(1)?;
        let count = r.u16()?;
        Ok(Self {
            encodings: r.sequence(Length::field(count))?,
        })
    }
}

/// FramebufferUpdateRequest - 10 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdateRequest {
    pub incremental: u8,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl FramebufferUpdateRequest {
    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u8(ClientMessageType::FramebufferUpdateRequest.as_u8());
        out.put_u8(self.incremental);
        out.put_u16(self.x);
        out.put_u16(self.y);
        out.put_u16(self.width);
        out.put_u16(self.height);
    }
}

impl Decode for FramebufferUpdateRequest {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.u8()?;
        Ok(Self {
            incremental: r.u8()?,
            x: r.u16()?,
            y: r.u16()?,
            width: r.u16()?,
            height: r.u16()?,
        })
    }
}

/// KeyEvent - 1 byte type, 1 byte down flag, 2 bytes padding, 4-byte keysym.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub down: u8,
    pub key: u32,
}

impl KeyEvent {
    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u8(ClientMessageType::KeyEvent.as_u8());
        out.put_u8(self.down);
        out.put_bytes(0, 2);
        out.put_u32(self.key);
    }
}

impl Decode for KeyEvent {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.u8()?;
        let down = r.u8()?;
        r.skip(2)?;
        Ok(Self {
            down,
            key: r.u32()?,
        })
    }
}

/// PointerEvent - 1 byte type, 1 byte button mask, 2 bytes x, 2 bytes y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub button_mask: u8,
    pub x: u16,
    pub y: u16,
}

impl PointerEvent {
    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u8(ClientMessageType::PointerEvent.as_u8());
        out.put_u8(self.button_mask);
        out.put_u16(self.x);
        out.put_u16(self.y);
    }
}

impl Decode for PointerEvent {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.u8()?;
        Ok(Self {
            button_mask: r.u8()?,
            x: r.u16()?,
            y: r.u16()?,
        })
    }
}
