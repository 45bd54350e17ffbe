//! Error types for reconstructed sessions.

use rfb_encodings::DecoderError;
use rfb_protocol::decode::DecodeError;
use rfb_protocol::io::StreamError;
use thiserror::Error;

use crate::handler::Role;

/// Errors raised while driving one side of a reconstructed session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Message type outside what the engine handles.
    #[error("{side} message {message_type} not handled")]
    UnhandledMessage { side: Role, message_type: u8 },

    /// Rectangle encoding without a decoder.
    #[error("server message not handled due to unknown encoding {0}")]
    UnhandledEncoding(i32),

    /// Malformed fixed-format header.
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// Message framing error.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Byte stream error.
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Rectangle decoder error.
    #[error("Rectangle decode error: {0}")]
    Decoder(#[from] DecoderError),

    /// Image or file sink failure.
    #[error("Sink error: {0}")]
    Sink(anyhow::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Returns true if the message is not fully buffered yet.
    ///
    /// Incomplete errors are resolved by waiting for the next delivery and
    /// retrying the same decode.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        match self {
            Self::Decode(e) => e.is_incomplete(),
            Self::Stream(e) => matches!(e, StreamError::Incomplete { .. }),
            Self::Decoder(e) => e.is_incomplete(),
            _ => false,
        }
    }

    /// Returns true if the stream completed before the message did.
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        match self {
            Self::Decode(e) => is_decode_eos(e),
            Self::Stream(e) => matches!(e, StreamError::EndOfStream { .. }),
            Self::Decoder(DecoderError::Decode(e)) => is_decode_eos(e),
            _ => false,
        }
    }

    /// Returns true if the side reporting this error must be abandoned.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_incomplete() && !self.is_end_of_stream()
    }
}

fn is_decode_eos(e: &DecodeError) -> bool {
    matches!(
        e,
        DecodeError::EndOfStream { .. } | DecodeError::Stream(StreamError::EndOfStream { .. })
    )
}
