//! Per-direction TCP reassembly.
//!
//! Each direction is keyed by its exact flow pair and owns the router's
//! [`StreamHandle`] for that half of the connection. Payload at the expected
//! sequence number is delivered at once with the packet's timestamp; later
//! payload waits until the gap fills. Overlapping retransmissions are
//! trimmed to their unseen tail.
//!
//! When the out-of-order backlog of a direction exceeds its bound the
//! missing bytes are given up on and delivery resumes at the earliest
//! buffered segment. FIN completes a direction once everything before it
//! has been delivered, RST completes it immediately.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use bytes::Bytes;
use rfb_common::{FlowPair, Timestamp};
use rfb_session::{ConnectionRouter, StreamHandle};
use tracing::{debug, trace};

use crate::capture::Segment;

const ASSEMBLY: &str = "rfbpeek::assembly";

/// Default out-of-order backlog per direction.
pub const DEFAULT_MAX_BUFFERED: usize = 4 * 1024 * 1024;

#[derive(Debug)]
struct Pending {
    seq: u32,
    payload: Vec<u8>,
    seen: Timestamp,
}

struct Direction {
    handle: StreamHandle,
    next: u32,
    fin: Option<u32>,
    pending: Vec<Pending>,
    buffered: usize,
}

/// Serial-number comparison: `a` is at or before `b`.
fn at_or_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) <= 0
}

impl Direction {
    fn new(handle: StreamHandle, next: u32) -> Self {
        Self {
            handle,
            next,
            fin: None,
            pending: Vec::new(),
            buffered: 0,
        }
    }

    fn receive(&mut self, seq: u32, payload: Vec<u8>, seen: Timestamp, max_buffered: usize) {
        if !at_or_before(seq, self.next) {
            self.buffered += payload.len();
            self.pending.push(Pending { seq, payload, seen });
            while self.buffered > max_buffered && self.skip_gap() {}
            return;
        }
        self.accept(seq, payload, seen);
        self.drain();
    }

    /// Deliver a segment starting at or before `next`.
    fn accept(&mut self, seq: u32, payload: Vec<u8>, seen: Timestamp) {
        let overlap = self.next.wrapping_sub(seq) as usize;
        if overlap >= payload.len() {
            trace!(target: ASSEMBLY, seq, len = payload.len(), "retransmission dropped");
            return;
        }
        let fresh = Bytes::from(payload).slice(overlap..);
        self.next = self.next.wrapping_add(fresh.len() as u32);
        self.handle.deliver(fresh, seen);
    }

    /// Deliver buffered segments that have become contiguous.
    fn drain(&mut self) {
        while let Some(i) = self
            .pending
            .iter()
            .position(|p| at_or_before(p.seq, self.next))
        {
            let pending = self.pending.swap_remove(i);
            self.buffered -= pending.payload.len();
            self.accept(pending.seq, pending.payload, pending.seen);
        }
    }

    /// Give up on the bytes before the earliest buffered segment.
    fn skip_gap(&mut self) -> bool {
        let next = self.next;
        let Some(earliest) = self
            .pending
            .iter()
            .map(|p| p.seq)
            .min_by_key(|seq| seq.wrapping_sub(next))
        else {
            return false;
        };
        debug!(
            target: ASSEMBLY,
            flows = %self.handle.flows(),
            missing = earliest.wrapping_sub(next),
            "gap skipped"
        );
        self.next = earliest;
        self.drain();
        true
    }

    fn is_finished(&self) -> bool {
        self.fin.is_some_and(|fin| at_or_before(fin, self.next))
    }
}

/// Turns TCP segments into ordered byte deliveries on the router's streams.
pub struct Assembler {
    router: ConnectionRouter,
    directions: HashMap<FlowPair, Direction>,
    max_buffered: usize,
}

impl Assembler {
    pub fn new(router: ConnectionRouter) -> Self {
        Self {
            router,
            directions: HashMap::new(),
            max_buffered: DEFAULT_MAX_BUFFERED,
        }
    }

    /// Bound the out-of-order backlog of every direction to `bytes`.
    #[must_use]
    pub fn max_buffered(mut self, bytes: usize) -> Self {
        self.max_buffered = bytes;
        self
    }

    pub fn router(&self) -> &ConnectionRouter {
        &self.router
    }

    /// Directions currently open.
    pub fn open(&self) -> usize {
        self.directions.len()
    }

    pub fn process(&mut self, segment: Segment) {
        let Segment {
            flows,
            seq,
            syn,
            fin,
            rst,
            payload,
            seen,
        } = segment;
        let start = if syn { seq.wrapping_add(1) } else { seq };

        let direction = match self.directions.entry(flows) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                // Bare ACKs and teardown of unknown flows open nothing.
                if payload.is_empty() && !syn {
                    return;
                }
                let handle = self.router.on_new_direction(flows.network, flows.transport);
                debug!(target: ASSEMBLY, %flows, side = ?handle.side(), "new direction");
                entry.insert(Direction::new(handle, start))
            }
        };

        let end = start.wrapping_add(payload.len() as u32);
        if !payload.is_empty() {
            direction.receive(start, payload, seen, self.max_buffered);
        }
        if fin {
            direction.fin = Some(end);
        }

        if rst || direction.is_finished() {
            debug!(target: ASSEMBLY, %flows, rst, "direction complete");
            if let Some(direction) = self.directions.remove(&flows) {
                direction.handle.complete();
            }
        }
    }

    /// Complete every open direction, delivering what is still buffered
    /// across any remaining gaps.
    pub fn finish(&mut self) {
        for (flows, mut direction) in self.directions.drain() {
            while direction.skip_gap() {}
            trace!(target: ASSEMBLY, %flows, "direction flushed");
            direction.handle.complete();
        }
    }
}

impl Drop for Assembler {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use parking_lot::Mutex;
    use rfb_common::Flow;
    use rfb_protocol::io::{ByteStream, PeekStream};
    use rfb_session::{Binding, ProtocolHandler, Session, Side};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    #[derive(Default)]
    struct Log {
        client: Vec<u8>,
        server: Vec<u8>,
        stamps: Vec<Timestamp>,
    }

    struct Collect(Arc<Mutex<Log>>);

    impl Session for Collect {
        fn on_client(&mut self, stream: &mut ByteStream) {
            let n = stream.length();
            if n == 0 {
                return;
            }
            if let Ok(read) = stream.read(n) {
                let mut log = self.0.lock();
                log.stamps.extend(read.span.map(|span| span.first));
                log.client.extend(read.bytes);
            }
        }

        fn on_server(&mut self, stream: &mut ByteStream) {
            let n = stream.length();
            if n == 0 {
                return;
            }
            if let Ok(read) = stream.read(n) {
                self.0.lock().server.extend(read.bytes);
            }
        }
    }

    /// Claims every connection as soon as the initiator sends anything.
    struct Everything(Arc<Mutex<Log>>);

    impl ProtocolHandler for Everything {
        fn name(&self) -> &str {
            "everything"
        }

        fn matches_initiator(&self, _flows: &FlowPair, stream: &dyn PeekStream) -> bool {
            stream.length() > 0
        }

        fn matches_responder(&self, _flows: &FlowPair, _stream: &dyn PeekStream) -> bool {
            false
        }

        fn bind(&self, _flows: FlowPair, client: Side, server: Side) -> Binding {
            Binding::new(client, server, Box::new(Collect(Arc::clone(&self.0))))
        }
    }

    fn assembler() -> (Assembler, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let handler: Arc<dyn ProtocolHandler> = Arc::new(Everything(Arc::clone(&log)));
        let router = ConnectionRouter::new(vec![handler], false);
        (Assembler::new(router), log)
    }

    fn at(ms: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn flows() -> FlowPair {
        FlowPair::new(
            Flow::new(
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            ),
            Flow::new(50000, 5900),
        )
    }

    fn segment(seq: u32, payload: &[u8], ms: i64) -> Segment {
        Segment {
            flows: flows(),
            seq,
            syn: false,
            fin: false,
            rst: false,
            payload: payload.to_vec(),
            seen: at(ms),
        }
    }

    #[test]
    fn test_in_order_delivery() {
        let (mut asm, log) = assembler();
        asm.process(Segment {
            syn: true,
            ..segment(99, b"", 0)
        });
        asm.process(segment(100, b"hel", 1));
        asm.process(segment(103, b"lo", 2));
        assert_eq!(log.lock().client, b"hello");
        assert_eq!(log.lock().stamps, vec![at(1), at(2)]);
    }

    #[test]
    fn test_out_of_order_is_reordered() {
        let (mut asm, log) = assembler();
        asm.process(segment(1, b"ab", 0));
        asm.process(segment(5, b"ef", 1));
        assert_eq!(log.lock().client, b"ab");
        asm.process(segment(3, b"cd", 2));
        assert_eq!(log.lock().client, b"abcdef");
    }

    #[test]
    fn test_retransmission_is_trimmed() {
        let (mut asm, log) = assembler();
        asm.process(segment(1, b"abcd", 0));
        asm.process(segment(1, b"abcd", 1));
        asm.process(segment(3, b"cdef", 2));
        assert_eq!(log.lock().client, b"abcdef");
    }

    #[test]
    fn test_sequence_wraparound() {
        let (mut asm, log) = assembler();
        asm.process(segment(u32::MAX - 1, b"ab", 0));
        asm.process(segment(2, b"ef", 1));
        asm.process(segment(0, b"cd", 2));
        assert_eq!(log.lock().client, b"abcdef");
    }

    #[test]
    fn test_backlog_overflow_skips_gap() {
        let log = Arc::new(Mutex::new(Log::default()));
        let handler: Arc<dyn ProtocolHandler> = Arc::new(Everything(Arc::clone(&log)));
        let router = ConnectionRouter::new(vec![handler], false);
        let mut asm = Assembler::new(router).max_buffered(4);

        asm.process(segment(1, b"ab", 0));
        asm.process(segment(10, b"xyz", 1));
        assert_eq!(log.lock().client, b"ab");
        asm.process(segment(13, b"uv", 2));
        assert_eq!(log.lock().client, b"abxyzuv");
    }

    #[test]
    fn test_fin_completes_after_gap_fills() {
        let (mut asm, _log) = assembler();
        asm.process(segment(1, b"ab", 0));
        asm.process(Segment {
            fin: true,
            ..segment(5, b"ef", 1)
        });
        assert_eq!(asm.open(), 1);
        asm.process(segment(3, b"cd", 2));
        assert_eq!(asm.open(), 0);
    }

    #[test]
    fn test_bare_ack_opens_nothing() {
        let (mut asm, _log) = assembler();
        asm.process(segment(1, b"", 0));
        assert_eq!(asm.open(), 0);
        assert_eq!(asm.router().pending(), 0);
    }

    #[test]
    fn test_both_directions_reach_one_session() {
        let (mut asm, log) = assembler();
        asm.process(segment(1, b"req", 0));
        asm.process(Segment {
            flows: flows().reverse(),
            ..segment(7, b"resp", 1)
        });
        assert_eq!(asm.router().pending(), 0);
        assert_eq!(log.lock().server, b"resp");

        asm.process(Segment {
            rst: true,
            ..segment(4, b"", 2)
        });
        assert_eq!(asm.open(), 1);
        asm.finish();
        assert_eq!(asm.open(), 0);
    }
}
