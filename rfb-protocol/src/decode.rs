//! Declarative big-endian decoding against a buffered stream.
//!
//! A record type describes its wire layout by implementing [`Decode`] on top
//! of a [`Reader`]. Decoding never blocks. It runs against a snapshot of what
//! is currently buffered and either completes, reporting how many bytes it
//! used, or fails with [`DecodeError::Incomplete`] so the caller can retry
//! after the next delivery.
//!
//! Two entry points are provided:
//!
//! - [`peek`] / [`peek_with`] decode without touching the stream
//! - [`commit`] / [`commit_with`] decode and then consume exactly the bytes
//!   that were used
//!
//! Variable-length fields take their size from a [`Length`]: a previously
//! decoded sibling field, a literal, or (for byte strings) whatever remains in
//! the window.
//!
//! # Examples
//!
//! ```
//! use rfb_protocol::decode::{self, Decode, DecodeError, Length, Reader};
//! use rfb_protocol::io::{ByteStream, PeekStream};
//!
//! struct Message {
//!     text: Vec<u8>,
//! }
//!
//! impl Decode for Message {
//!     fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
//!         let len = r.u16()?;
//!         let text = r.string(Length::field(len))?;
//!         Ok(Self { text })
//!     }
//! }
//!
//! let mut stream = ByteStream::new();
//! stream.push(&[0u8, 2, b'h', b'i', 0xff][..], chrono::Utc::now());
//! let decoded = decode::commit::<Message>(&mut stream).unwrap();
//! assert_eq!(decoded.value.text, b"hi");
//! assert_eq!(decoded.consumed, 4);
//! assert_eq!(stream.length(), 1);
//! ```

use rfb_common::TimeSpan;
use thiserror::Error;

use crate::io::{ByteStream, PeekStream, StreamError};

/// Size of the first snapshot taken for a decode. The window doubles until the
/// record fits or the whole buffer is visible.
const INITIAL_WINDOW: usize = 256;

/// Errors produced while decoding a record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// More bytes are needed and may still arrive.
    #[error("incomplete record: need {needed} bytes, {available} buffered")]
    Incomplete { needed: usize, available: usize },

    /// More bytes are needed but the stream is complete.
    #[error("end of stream inside record: need {needed} bytes, {available} remain")]
    EndOfStream { needed: usize, available: usize },

    /// The bytes can never form a valid record.
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl DecodeError {
    /// Whether retrying after more data arrives could succeed.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::Incomplete { .. })
    }
}

/// Declared size of a variable-length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    /// Taken from a sibling field decoded earlier in the same record.
    Field(u64),
    /// A fixed count known to the record or its context.
    Literal(usize),
    /// Everything left in the decode window. Byte strings only.
    Remaining,
}

impl Length {
    /// Length sourced from a previously decoded integer field.
    pub fn field(value: impl Into<u64>) -> Self {
        Length::Field(value.into())
    }
}

/// Cursor over a snapshot of buffered bytes.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    /// True when `buf` holds everything that is buffered, not just a window.
    whole: bool,
}

impl<'a> Reader<'a> {
    /// Reader over a complete buffer.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            whole: true,
        }
    }

    fn windowed(buf: &'a [u8], whole: bool) -> Self {
        Self { buf, pos: 0, whole }
    }

    /// Bytes read so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left in the window.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::Incomplete {
                needed: self.pos.saturating_add(n),
                available: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Skip padding.
    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    /// Decode a nested record.
    pub fn field<T: Decode>(&mut self) -> Result<T, DecodeError> {
        T::decode(self)
    }

    /// Fixed-size array of records.
    pub fn array<T: Decode, const N: usize>(&mut self) -> Result<[T; N], DecodeError> {
        <[T; N]>::decode(self)
    }

    fn resolve(&self, len: Length) -> Result<usize, DecodeError> {
        match len {
            Length::Field(value) => usize::try_from(value)
                .map_err(|_| DecodeError::Malformed(format!("length {value} out of range"))),
            Length::Literal(n) => Ok(n),
            Length::Remaining => {
                if !self.whole {
                    // The true remainder is only known once the whole buffer is visible.
                    return Err(DecodeError::Incomplete {
                        needed: self.buf.len() + 1,
                        available: self.buf.len(),
                    });
                }
                Ok(self.remaining())
            }
        }
    }

    /// Variable-length byte string.
    pub fn string(&mut self, len: Length) -> Result<Vec<u8>, DecodeError> {
        let n = self.resolve(len)?;
        // Size is checked against the window before anything is allocated.
        Ok(self.take(n)?.to_vec())
    }

    /// Variable-length sequence of records.
    pub fn sequence<T: Decode>(&mut self, len: Length) -> Result<Vec<T>, DecodeError> {
        if len == Length::Remaining {
            return Err(DecodeError::Malformed(
                "sequence requires an explicit length".into(),
            ));
        }
        let count = self.resolve(len)?;
        // Every element occupies at least one byte.
        if count > self.remaining() {
            return Err(DecodeError::Incomplete {
                needed: self.pos.saturating_add(count),
                available: self.buf.len(),
            });
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(T::decode(self)?);
        }
        Ok(out)
    }
}

/// A record with a fixed wire layout.
pub trait Decode: Sized {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;
}

/// A record whose layout depends on context outside the record itself, such as
/// the negotiated pixel size.
pub trait DecodeWith<C>: Sized {
    fn decode_with(r: &mut Reader<'_>, ctx: C) -> Result<Self, DecodeError>;
}

impl Decode for u8 {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.u8()
    }
}

impl Decode for u16 {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.u16()
    }
}

impl Decode for u32 {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.u32()
    }
}

impl Decode for i32 {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.i32()
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let items = (0..N)
            .map(|_| T::decode(r))
            .collect::<Result<Vec<T>, _>>()?;
        items
            .try_into()
            .map_err(|_| DecodeError::Malformed(format!("array of {N} elements")))
    }
}

/// A decoded record together with the bytes it occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    pub value: T,
    pub consumed: usize,
    /// Capture times of the chunks holding the record's bytes.
    pub span: TimeSpan,
}

/// Decode with a custom layout function without consuming anything.
pub fn peek_with<S, T, F>(stream: &S, mut decode: F) -> Result<Decoded<T>, DecodeError>
where
    S: PeekStream + ?Sized,
    F: FnMut(&mut Reader<'_>) -> Result<T, DecodeError>,
{
    let available = stream.length();
    let mut window = available.min(INITIAL_WINDOW);

    loop {
        let snapshot = stream.peek(window)?;
        let whole = window == available;
        let mut reader = Reader::windowed(&snapshot.bytes, whole);

        match decode(&mut reader) {
            Ok(value) => {
                let consumed = reader.position();
                let span = stream.span(consumed).or(snapshot.span).ok_or(
                    DecodeError::Incomplete {
                        needed: 1,
                        available: 0,
                    },
                )?;
                return Ok(Decoded {
                    value,
                    consumed,
                    span,
                });
            }
            Err(DecodeError::Incomplete { .. }) if !whole => {
                window = window.saturating_mul(2).min(available);
            }
            Err(DecodeError::Incomplete { needed, available }) if stream.is_complete() => {
                return Err(DecodeError::EndOfStream { needed, available });
            }
            Err(err) => return Err(err),
        }
    }
}

/// Decode a [`Decode`] record from the head of the stream without consuming it.
pub fn peek<T: Decode>(stream: &(impl PeekStream + ?Sized)) -> Result<Decoded<T>, DecodeError> {
    peek_with(stream, T::decode)
}

/// Decode with a custom layout function, then consume the bytes it used.
pub fn commit_with<T, F>(stream: &mut ByteStream, decode: F) -> Result<Decoded<T>, DecodeError>
where
    F: FnMut(&mut Reader<'_>) -> Result<T, DecodeError>,
{
    let record = std::any::type_name::<T>();
    if let Some(needed) = stream.pending(record) {
        return Err(DecodeError::Incomplete {
            needed,
            available: stream.length(),
        });
    }

    match peek_with(&*stream, decode) {
        Ok(decoded) => {
            stream.consume(decoded.consumed)?;
            Ok(decoded)
        }
        Err(DecodeError::Incomplete { needed, available }) => {
            stream.wait_for(record, needed);
            Err(DecodeError::Incomplete { needed, available })
        }
        Err(err) => Err(err),
    }
}

/// Decode a [`Decode`] record from the head of the stream and consume it.
pub fn commit<T: Decode>(stream: &mut ByteStream) -> Result<Decoded<T>, DecodeError> {
    commit_with(stream, T::decode)
}
