//! Reconstructed framebuffer.
//!
//! [`Framebuffer`] holds the session's current picture as an RGBA image.
//! Decoded rectangles are drawn into it and snapshots are handed to image
//! sinks whenever an update completes.
//!
//! # Example
//!
//! ```
//! use rfb_pixelbuffer::{Framebuffer, PixelFormat};
//! use rfb_common::Rect;
//!
//! let mut fb = Framebuffer::new(4, 4);
//! let red = [0x00, 0x00, 0xFF, 0x00]; // 0x00FF0000 little-endian
//! let pixels: Vec<u8> = red.iter().copied().cycle().take(2 * 2 * 4).collect();
//! fb.image_rect(Rect::new(1, 1, 2, 2), &pixels, &PixelFormat::rgb888()).unwrap();
//!
//! assert_eq!(fb.image().get_pixel(1, 1).0, [0xFF, 0, 0, 0xFF]);
//! assert_eq!(fb.image().get_pixel(0, 0).0, [0, 0, 0, 0]);
//! ```

use anyhow::{anyhow, Result};
use image::{Rgba, RgbaImage};
use rfb_common::Rect;

use crate::PixelFormat;

/// RGBA canvas sized from the server's advertised desktop.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    image: RgbaImage,
}

impl Framebuffer {
    /// Create a fully transparent black framebuffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Current picture.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Set one pixel. Returns `false` when `(x, y)` lies outside the
    /// framebuffer, in which case nothing is written.
    pub fn put_pixel(&mut self, x: i64, y: i64, rgba: [u8; 4]) -> bool {
        let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
            return false;
        };
        if x >= self.image.width() || y >= self.image.height() {
            return false;
        }
        self.image.put_pixel(x, y, Rgba(rgba));
        true
    }

    /// Draw tightly packed pixels in `format` into `dest`.
    ///
    /// `pixels` must hold exactly `dest.area()` pixels. Pixels falling outside
    /// the framebuffer are skipped.
    pub fn image_rect(&mut self, dest: Rect, pixels: &[u8], format: &PixelFormat) -> Result<()> {
        let bytes_per_pixel = usize::from(format.bytes_per_pixel());
        if bytes_per_pixel == 0 {
            return Err(anyhow!("Invalid pixel format: zero bits per pixel"));
        }

        let required = dest.area() as usize * bytes_per_pixel;
        if pixels.len() != required {
            return Err(anyhow!(
                "Invalid source data: got {} bytes, need {}",
                pixels.len(),
                required
            ));
        }

        let mut offset = 0;
        for row in 0..i64::from(dest.height) {
            for col in 0..i64::from(dest.width) {
                let pixel = &pixels[offset..offset + bytes_per_pixel];
                offset += bytes_per_pixel;
                self.put_pixel(
                    i64::from(dest.x) + col,
                    i64::from(dest.y) + row,
                    format.to_rgba(pixel),
                );
            }
        }
        Ok(())
    }
}
