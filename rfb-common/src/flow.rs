//! Invertible flow identities.
//!
//! A connection is identified by a network-layer flow (IP addresses) and a
//! transport-layer flow (TCP ports). Both directions of one connection must
//! map onto the same cache key, so [`Flow::fast_hash`] is symmetric: a flow
//! and its [`reverse`](Flow::reverse) hash identically.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use siphasher::sip::SipHasher13;

const HASH_KEY_0: u64 = 0x5246_425f_666c_6f77;
const HASH_KEY_1: u64 = 0x7265_706c_6179_2121;

/// One direction of traffic between two endpoints at a single protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flow<E> {
    src: E,
    dst: E,
}

impl<E: Copy + Ord + Hash> Flow<E> {
    pub const fn new(src: E, dst: E) -> Self {
        Self { src, dst }
    }

    pub const fn src(&self) -> E {
        self.src
    }

    pub const fn dst(&self) -> E {
        self.dst
    }

    /// The same flow seen from the other side.
    pub const fn reverse(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }

    /// Fast non-cryptographic hash, identical for a flow and its reverse.
    pub fn fast_hash(&self) -> u64 {
        let (low, high) = if self.src <= self.dst {
            (self.src, self.dst)
        } else {
            (self.dst, self.src)
        };
        let mut hasher = SipHasher13::new_with_keys(HASH_KEY_0, HASH_KEY_1);
        low.hash(&mut hasher);
        high.hash(&mut hasher);
        hasher.finish()
    }
}

/// Cache key of an unordered connection: (network hash, transport hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub network: u64,
    pub transport: u64,
}

/// Network and transport flow of one direction of a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowPair {
    pub network: Flow<IpAddr>,
    pub transport: Flow<u16>,
}

impl FlowPair {
    pub const fn new(network: Flow<IpAddr>, transport: Flow<u16>) -> Self {
        Self { network, transport }
    }

    pub const fn reverse(&self) -> Self {
        Self {
            network: self.network.reverse(),
            transport: self.transport.reverse(),
        }
    }

    pub fn key(&self) -> FlowKey {
        FlowKey {
            network: self.network.fast_hash(),
            transport: self.transport.fast_hash(),
        }
    }

    /// Source endpoint formatted as `ip:port`.
    pub fn src_endpoint(&self) -> String {
        endpoint(self.network.src(), self.transport.src())
    }

    /// Destination endpoint formatted as `ip:port`.
    pub fn dst_endpoint(&self) -> String {
        endpoint(self.network.dst(), self.transport.dst())
    }
}

fn endpoint(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{v4}:{port}"),
        IpAddr::V6(v6) => format!("[{v6}]:{port}"),
    }
}

impl fmt::Display for FlowPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src_endpoint(), self.dst_endpoint())
    }
}
