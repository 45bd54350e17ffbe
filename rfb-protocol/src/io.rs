//! Timestamped byte streams for reconstructed RFB traffic.
//!
//! A [`ByteStream`] holds the bytes one side of a connection has sent so far,
//! as a queue of chunks each stamped with the capture time at which it was
//! seen. Nothing blocks: a reader that asks for more than is buffered gets
//! [`StreamError::Incomplete`] and tries again after the next delivery.
//!
//! # Examples
//!
//! ```
//! use rfb_protocol::io::{ByteStream, PeekStream, StreamError};
//!
//! let mut stream = ByteStream::new();
//! stream.push(&b"RFB "[..], chrono::Utc::now());
//!
//! let snapshot = stream.peek(4).unwrap();
//! assert_eq!(&snapshot.bytes[..], b"RFB ");
//! assert!(matches!(stream.peek(12), Err(StreamError::Incomplete { .. })));
//!
//! stream.consume(4).unwrap();
//! assert_eq!(stream.length(), 0);
//! ```

use std::collections::VecDeque;

use bytes::{Buf, Bytes};
use rfb_common::{TimeSpan, Timestamp};
use thiserror::Error;

/// Errors returned by [`ByteStream`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Fewer bytes are buffered than requested, but more may still arrive.
    #[error("incomplete read: requested {requested} bytes, {available} buffered")]
    Incomplete { requested: usize, available: usize },

    /// The stream is complete and can never satisfy the request. The snapshot
    /// carries whatever was buffered.
    #[error("end of stream: requested {requested} bytes, only {} remain", .snapshot.bytes.len())]
    EndOfStream { requested: usize, snapshot: Snapshot },

    /// A consume asked for more bytes than are buffered.
    #[error("stream underrun: cannot consume {requested} bytes, {available} buffered")]
    Underrun { requested: usize, available: usize },
}

/// A contiguous copy of the head of a stream plus the capture times of the
/// chunks it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub bytes: Vec<u8>,
    /// `None` only when `bytes` is empty.
    pub span: Option<TimeSpan>,
}

/// One delivery of bytes from the reassembler.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub bytes: Bytes,
    pub seen: Timestamp,
}

/// Read-only view of a stream.
///
/// Handlers are handed this instead of the stream itself so that sniffing can
/// never consume anything.
pub trait PeekStream {
    /// Total bytes currently buffered.
    fn length(&self) -> usize;

    /// Whether the producer has signalled that no more bytes will arrive.
    fn is_complete(&self) -> bool;

    /// Copy the first `max_len` buffered bytes without consuming them.
    ///
    /// Returns [`StreamError::Incomplete`] if fewer are buffered and the
    /// stream is still open, or [`StreamError::EndOfStream`] with what is
    /// available once the stream is complete.
    fn peek(&self, max_len: usize) -> Result<Snapshot, StreamError>;

    /// Capture times of the chunks holding the first `n` bytes.
    fn span(&self, n: usize) -> Option<TimeSpan>;
}

/// Buffered, timestamped bytes for one direction of a connection.
#[derive(Debug, Default)]
pub struct ByteStream {
    chunks: VecDeque<Chunk>,
    buffered: usize,
    complete: bool,
    /// Record type whose last decode ran short, with the bytes it needs.
    wanted: Option<(&'static str, usize)>,
}

impl ByteStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delivery. Empty deliveries are dropped since they carry no
    /// bytes to time.
    pub fn push(&mut self, bytes: impl Into<Bytes>, seen: Timestamp) {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return;
        }
        self.buffered += bytes.len();
        self.chunks.push_back(Chunk { bytes, seen });
    }

    /// Drop exactly `n` bytes from the head.
    ///
    /// On [`StreamError::Underrun`] the stream is left untouched.
    pub fn consume(&mut self, n: usize) -> Result<(), StreamError> {
        if n > self.buffered {
            return Err(StreamError::Underrun {
                requested: n,
                available: self.buffered,
            });
        }

        let mut left = n;
        while left > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if front.bytes.len() <= left {
                left -= front.bytes.len();
                self.chunks.pop_front();
            } else {
                front.bytes.advance(left);
                left = 0;
            }
        }
        self.buffered -= n;
        if n > 0 {
            self.wanted = None;
        }
        Ok(())
    }

    /// Peek then consume whatever the peek actually returned.
    ///
    /// An `EndOfStream` read still drains the remaining bytes, which are
    /// handed back inside the error.
    pub fn read(&mut self, max_len: usize) -> Result<Snapshot, StreamError> {
        match self.peek(max_len) {
            Ok(snapshot) => {
                self.consume(snapshot.bytes.len())?;
                Ok(snapshot)
            }
            Err(StreamError::EndOfStream { requested, snapshot }) => {
                self.consume(snapshot.bytes.len())?;
                Err(StreamError::EndOfStream { requested, snapshot })
            }
            Err(err) => Err(err),
        }
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.buffered = 0;
        self.wanted = None;
    }

    /// Remember that decoding `record` at the head needs `needed` bytes.
    pub fn wait_for(&mut self, record: &'static str, needed: usize) {
        self.wanted = Some((record, needed));
    }

    /// Byte count the last failed decode of `record` is still waiting for.
    ///
    /// `None` once the head moved, enough bytes arrived or the stream completed.
    pub fn pending(&self, record: &'static str) -> Option<usize> {
        match self.wanted {
            Some((key, needed)) if key == record && !self.complete && self.buffered < needed => {
                Some(needed)
            }
            _ => None,
        }
    }

    /// Signal that the producer will deliver nothing more.
    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    fn snapshot(&self, len: usize) -> Snapshot {
        let mut bytes = Vec::with_capacity(len);
        let mut span: Option<TimeSpan> = None;
        for chunk in &self.chunks {
            if bytes.len() == len {
                break;
            }
            let take = (len - bytes.len()).min(chunk.bytes.len());
            bytes.extend_from_slice(&chunk.bytes[..take]);
            span = Some(match span {
                Some(s) => TimeSpan::new(s.first, chunk.seen),
                None => TimeSpan::at(chunk.seen),
            });
        }
        Snapshot { bytes, span }
    }
}

impl PeekStream for ByteStream {
    fn length(&self) -> usize {
        self.buffered
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn peek(&self, max_len: usize) -> Result<Snapshot, StreamError> {
        if max_len <= self.buffered {
            return Ok(self.snapshot(max_len));
        }
        if self.complete {
            return Err(StreamError::EndOfStream {
                requested: max_len,
                snapshot: self.snapshot(self.buffered),
            });
        }
        Err(StreamError::Incomplete {
            requested: max_len,
            available: self.buffered,
        })
    }

    fn span(&self, n: usize) -> Option<TimeSpan> {
        if n == 0 || n > self.buffered {
            return None;
        }
        let first = self.chunks.front()?.seen;
        let mut covered = 0;
        for chunk in &self.chunks {
            covered += chunk.bytes.len();
            if covered >= n {
                return Some(TimeSpan::new(first, chunk.seen));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(ms: i64) -> Timestamp {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn two_chunks() -> ByteStream {
        let mut stream = ByteStream::new();
        stream.push(vec![1u8, 2, 3], at(10));
        stream.push(vec![4u8, 5], at(20));
        stream
    }

    #[test]
    fn test_peek_spans_chunks() {
        let stream = two_chunks();
        let snap = stream.peek(4).unwrap();
        assert_eq!(snap.bytes, vec![1, 2, 3, 4]);
        assert_eq!(snap.span, Some(TimeSpan::new(at(10), at(20))));

        let snap = stream.peek(2).unwrap();
        assert_eq!(snap.span, Some(TimeSpan::at(at(10))));
        assert_eq!(stream.length(), 5);
    }

    #[test]
    fn test_peek_incomplete_then_end_of_stream() {
        let mut stream = two_chunks();
        assert_eq!(
            stream.peek(6),
            Err(StreamError::Incomplete {
                requested: 6,
                available: 5
            })
        );

        stream.mark_complete();
        match stream.peek(6) {
            Err(StreamError::EndOfStream { requested, snapshot }) => {
                assert_eq!(requested, 6);
                assert_eq!(snapshot.bytes, vec![1, 2, 3, 4, 5]);
            }
            other => panic!("expected end of stream, got {other:?}"),
        }
    }

    #[test]
    fn test_consume_partial_chunk() {
        let mut stream = two_chunks();
        stream.consume(2).unwrap();
        assert_eq!(stream.length(), 3);
        assert_eq!(stream.peek(3).unwrap().bytes, vec![3, 4, 5]);

        stream.consume(3).unwrap();
        assert_eq!(stream.length(), 0);
        assert_eq!(stream.peek(0).unwrap().span, None);
    }

    #[test]
    fn test_consume_underrun_leaves_stream() {
        let mut stream = two_chunks();
        assert_eq!(
            stream.consume(9),
            Err(StreamError::Underrun {
                requested: 9,
                available: 5
            })
        );
        assert_eq!(stream.length(), 5);
    }

    #[test]
    fn test_read_consumes_returned_bytes() {
        let mut stream = two_chunks();
        assert_eq!(stream.read(4).unwrap().bytes, vec![1, 2, 3, 4]);
        assert_eq!(stream.length(), 1);

        assert!(matches!(
            stream.read(2),
            Err(StreamError::Incomplete { .. })
        ));
        assert_eq!(stream.length(), 1);

        stream.mark_complete();
        assert!(matches!(
            stream.read(2),
            Err(StreamError::EndOfStream { .. })
        ));
        assert_eq!(stream.length(), 0);
    }

    #[test]
    fn test_span_covers_exact_prefix() {
        let stream = two_chunks();
        assert_eq!(stream.span(0), None);
        assert_eq!(stream.span(3), Some(TimeSpan::at(at(10))));
        assert_eq!(stream.span(4), Some(TimeSpan::new(at(10), at(20))));
        assert_eq!(stream.span(6), None);
    }

    #[test]
    fn test_clear_and_empty_push() {
        let mut stream = two_chunks();
        stream.push(Vec::new(), at(30));
        assert_eq!(stream.length(), 5);
        stream.clear();
        assert_eq!(stream.length(), 0);
        assert!(!stream.is_complete());
    }

    mod laws {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_consume_then_peek_skips_consumed(
                chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..8),
                cut in any::<usize>(),
            ) {
                let data: Vec<u8> = chunks.concat();
                let mut stream = ByteStream::new();
                for (i, chunk) in chunks.iter().enumerate() {
                    stream.push(chunk.clone(), at(i as i64));
                }
                prop_assert_eq!(stream.length(), data.len());

                let n = cut % (data.len() + 1);
                stream.consume(n).unwrap();
                prop_assert_eq!(stream.length(), data.len() - n);

                let rest = stream.peek(stream.length()).unwrap();
                prop_assert_eq!(&rest.bytes[..], &data[n..]);
                prop_assert!(stream.consume(stream.length() + 1).is_err());
                prop_assert_eq!(stream.length(), data.len() - n);
            }
        }
    }
}
