//! RFB pixel format descriptions and conversions.
//!
//! This module defines the [`PixelFormat`] type which describes how pixels are
//! encoded on the wire, and converts true-colour pixels to RGBA.
//!
//! # Channel Extraction
//!
//! To extract a colour component from a pixel value:
//! 1. Assemble the pixel bytes into a word using the format's byte order
//! 2. Shift right by the channel's shift value
//! 3. Mask with the channel's max value
//!
//! Components are stored as-is in the 8-bit output channel; they are not
//! rescaled to 0-255. For the common 8-bit-per-channel formats this is exact.
//!
//! # Example
//!
//! ```
//! use rfb_pixelbuffer::PixelFormat;
//!
//! let pf = PixelFormat::rgb888();
//! let pixel = [0xCC, 0xBB, 0xAA, 0x00]; // Little-endian: 0x00AABBCC
//! assert_eq!(pf.to_rgba(&pixel), [0xAA, 0xBB, 0xCC, 0xFF]);
//! ```

/// Describes an RFB pixel format.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct PixelFormat {
    /// Bits used per pixel (bpp), e.g., 32 for RGB888 in 32-bit storage.
    pub bits_per_pixel: u8,

    /// Actual color depth (sum of significant bits), e.g., 24 for RGB888.
    pub depth: u8,

    /// Byte order for multi-byte pixels (`true` = big endian, `false` = little endian).
    pub big_endian: bool,

    /// True color (direct color) vs. color map (`false`).
    pub true_color: bool,

    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,

    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Returns bytes-per-pixel (storage width), rounded up to the nearest byte.
    pub fn bytes_per_pixel(&self) -> u8 {
        self.bits_per_pixel.div_ceil(8)
    }

    /// Returns a standard little-endian 32bpp RGB888 pixel format.
    ///
    /// - 32 bits per pixel (4 bytes)
    /// - 24-bit color depth (8 bits per channel)
    /// - Little-endian byte order
    /// - Red at bit 16, Green at bit 8, Blue at bit 0
    pub fn rgb888() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_color: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// Assemble up to four pixel bytes into a word according to the byte order.
    pub fn word(&self, pixel: &[u8]) -> u32 {
        if self.big_endian {
            pixel
                .iter()
                .take(4)
                .fold(0u32, |value, &byte| (value << 8) | u32::from(byte))
        } else {
            pixel
                .iter()
                .take(4)
                .enumerate()
                .fold(0u32, |value, (i, &byte)| value | (u32::from(byte) << (i * 8)))
        }
    }

    /// Split a pixel word into `[R, G, B, 255]`.
    pub fn channels(&self, word: u32) -> [u8; 4] {
        let channel = |shift: u8, max: u16| {
            (word.checked_shr(u32::from(shift)).unwrap_or(0) & u32::from(max)) as u8
        };
        [
            channel(self.red_shift, self.red_max),
            channel(self.green_shift, self.green_max),
            channel(self.blue_shift, self.blue_max),
            u8::MAX,
        ]
    }

    /// Convert one encoded pixel to `[R, G, B, 255]`.
    pub fn to_rgba(&self, pixel: &[u8]) -> [u8; 4] {
        self.channels(self.word(pixel))
    }
}

/// Convert from protocol PixelFormat to pixelbuffer PixelFormat.
impl From<&rfb_protocol::messages::types::PixelFormat> for PixelFormat {
    fn from(pf: &rfb_protocol::messages::types::PixelFormat) -> Self {
        Self {
            bits_per_pixel: pf.bits_per_pixel,
            depth: pf.depth,
            big_endian: pf.is_big_endian(),
            true_color: pf.is_true_color(),
            red_max: pf.red_max,
            green_max: pf.green_max,
            blue_max: pf.blue_max,
            red_shift: pf.red_shift,
            green_shift: pf.green_shift,
            blue_shift: pf.blue_shift,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        let pf = PixelFormat::rgb888();
        assert_eq!(pf.bytes_per_pixel(), 4);

        let pf_12bit = PixelFormat {
            bits_per_pixel: 12,
            ..PixelFormat::rgb888()
        };
        assert_eq!(pf_12bit.bytes_per_pixel(), 2); // 12 bits rounds up to 2 bytes
    }

    #[test]
    fn test_to_rgba_little_endian() {
        let pf = PixelFormat::rgb888();

        // 0x00112233 little-endian = [0x33, 0x22, 0x11, 0x00]
        let pixel = [0x33, 0x22, 0x11, 0x00];
        assert_eq!(pf.to_rgba(&pixel), [0x11, 0x22, 0x33, 0xFF]);
    }

    #[test]
    fn test_to_rgba_big_endian() {
        let pf = PixelFormat {
            big_endian: true,
            ..PixelFormat::rgb888()
        };

        // 0x00112233 big-endian = [0x00, 0x11, 0x22, 0x33]
        let pixel = [0x00, 0x11, 0x22, 0x33];
        assert_eq!(pf.to_rgba(&pixel), [0x11, 0x22, 0x33, 0xFF]);
    }

    #[test]
    fn test_channels_are_masked_not_scaled() {
        // 5-bit channels keep their raw values.
        let pf = PixelFormat {
            red_max: 31,
            green_max: 31,
            blue_max: 31,
            red_shift: 10,
            green_shift: 5,
            blue_shift: 0,
            ..PixelFormat::rgb888()
        };
        let word = (31 << 10) | (1 << 5) | 0xFFFF_0000;
        assert_eq!(pf.channels(word), [31, 1, 0, 255]);
    }

    #[test]
    fn test_from_protocol_format() {
        let wire = rfb_protocol::messages::types::PixelFormat {
            big_endian: 5,
            ..rfb_protocol::messages::types::PixelFormat::rgb888()
        };
        let pf = PixelFormat::from(&wire);
        assert!(pf.big_endian);
        assert!(pf.true_color);
        assert_eq!(pf.red_shift, 16);
    }
}
