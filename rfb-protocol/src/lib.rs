//! RFB (Remote Framebuffer) protocol reconstruction primitives.
//!
//! This crate provides the passive, non-blocking layer used to rebuild RFB
//! message streams from captured traffic. Nothing here performs I/O: bytes are
//! pushed in by a reassembler and decoders either complete against what is
//! buffered or report that more data is needed.
//!
//! # Modules
//!
//! - [`io`] - Timestamped byte stream with peek/consume (ByteStream)
//! - [`decode`] - Declarative big-endian decoder over a stream snapshot
//! - [`messages`] - RFB message records and their wire shapes
//!
//! # Examples
//!
//! ```
//! use rfb_protocol::io::{ByteStream, PeekStream};
//! use rfb_protocol::decode;
//! use rfb_protocol::messages::FramebufferUpdate;
//!
//! let mut stream = ByteStream::new();
//! stream.push(vec![0u8, 0], chrono::Utc::now());
//!
//! // Only half of the header has arrived yet.
//! assert!(decode::peek::<FramebufferUpdate>(&stream).unwrap_err().is_incomplete());
//!
//! stream.push(vec![0u8, 3], chrono::Utc::now());
//! let update = decode::commit::<FramebufferUpdate>(&mut stream).unwrap();
//! assert_eq!(update.value.number_of_rectangles, 3);
//! assert_eq!(stream.length(), 0);
//! ```

pub mod decode;
pub mod io;
pub mod messages;

// Re-export commonly used types
pub use decode::{Decode, DecodeError, Decoded, Length, Reader};
pub use io::{ByteStream, Chunk, PeekStream, Snapshot, StreamError};
