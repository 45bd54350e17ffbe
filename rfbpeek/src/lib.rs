//! Offline RFB session extraction: capture reading, TCP reassembly and the
//! command line around the `rfb-session` engine.

pub mod args;
pub mod assembly;
pub mod capture;
pub mod filter;

pub use assembly::Assembler;
pub use capture::{replay, Capture, ReplayStats, Segment};
pub use filter::{Filter, FilterError};
