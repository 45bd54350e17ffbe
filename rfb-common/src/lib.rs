//! Common types shared across the RFB session reconstruction crates.
//!
//! This crate provides:
//! - [`Flow`] / [`FlowPair`] - invertible network and transport flow identities
//! - [`Timestamp`] / [`TimeSpan`] - capture timestamps attached to reassembled bytes
//! - [`Rect`] - destination of a decoded rectangle

pub mod flow;
pub mod time;

pub use flow::{Flow, FlowKey, FlowPair};
pub use time::{file_stamp, TimeSpan, Timestamp};

/// A rectangle defined by top-left position and dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Number of pixels covered.
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_area() {
        assert_eq!(Rect::new(10, 20, 100, 50).area(), 5000);
        assert_eq!(Rect::new(-3, 0, 0, 8).area(), 0);
    }
}
