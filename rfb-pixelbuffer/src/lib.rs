//! RFB pixel buffer types and utilities.
//!
//! This crate provides pixel format conversion and the reconstructed
//! framebuffer that decoded rectangles are drawn into.

pub mod format;
pub mod framebuffer;

pub use format::PixelFormat;
pub use framebuffer::Framebuffer;
