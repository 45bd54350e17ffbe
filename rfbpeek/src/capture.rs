//! Capture files and TCP segment extraction.
//!
//! Classic pcap and pcapng are told apart by their leading magic. Link layers
//! understood: Ethernet (with VLAN tags), raw IP, IPv4, IPv6 and Linux cooked
//! capture. Everything that is not TCP over IP is skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap_file::pcap::PcapReader;
use pcap_file::pcapng::{Block, PcapNgReader};
use pcap_file::DataLink;
use rfb_common::{Flow, FlowPair, Timestamp};
use tracing::{debug, warn};

use crate::assembly::Assembler;
use crate::filter::Filter;

const PCAPNG_MAGIC: [u8; 4] = [0x0A, 0x0D, 0x0D, 0x0A];

/// One TCP segment of a captured packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub flows: FlowPair,
    pub seq: u32,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload: Vec<u8>,
    pub seen: Timestamp,
}

/// A captured frame and the link layer it starts with.
#[derive(Debug, Clone)]
pub struct Packet {
    pub link: DataLink,
    pub seen: Timestamp,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn segment(&self) -> Option<Segment> {
        parse_segment(self.link, &self.data, self.seen)
    }
}

enum Source<R: BufRead> {
    Pcap(PcapReader<R>),
    PcapNg {
        reader: PcapNgReader<R>,
        links: Vec<DataLink>,
        last_seen: Timestamp,
    },
}

/// Sequential packet reader over a pcap or pcapng stream.
pub struct Capture<R: BufRead> {
    source: Source<R>,
}

impl Capture<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("reading {}", path.display()))
    }
}

impl<R: BufRead> Capture<R> {
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let magic = reader.fill_buf().context("reading capture magic")?;
        let source = if magic.starts_with(&PCAPNG_MAGIC) {
            Source::PcapNg {
                reader: PcapNgReader::new(reader).context("invalid pcapng header")?,
                links: Vec::new(),
                last_seen: Timestamp::default(),
            }
        } else {
            Source::Pcap(PcapReader::new(reader).context("invalid pcap header")?)
        };
        Ok(Self { source })
    }

    /// Next packet, `None` at the end of the capture.
    pub fn next_packet(&mut self) -> Option<Result<Packet>> {
        match &mut self.source {
            Source::Pcap(reader) => {
                let link = reader.header().datalink;
                let packet = reader.next_packet()?;
                Some(
                    packet
                        .map(|p| Packet {
                            link,
                            seen: timestamp(p.timestamp),
                            data: p.data.into_owned(),
                        })
                        .context("reading pcap packet"),
                )
            }
            Source::PcapNg {
                reader,
                links,
                last_seen,
            } => loop {
                let block = match reader.next_block()? {
                    Ok(block) => block,
                    Err(e) => return Some(Err(e).context("reading pcapng block")),
                };
                match block {
                    Block::SectionHeader(_) => links.clear(),
                    Block::InterfaceDescription(idb) => links.push(idb.linktype),
                    Block::EnhancedPacket(epb) => {
                        let link = links
                            .get(epb.interface_id as usize)
                            .copied()
                            .unwrap_or(DataLink::ETHERNET);
                        let seen = timestamp(epb.timestamp);
                        *last_seen = seen;
                        return Some(Ok(Packet {
                            link,
                            seen,
                            data: epb.data.into_owned(),
                        }));
                    }
                    Block::SimplePacket(spb) => {
                        // Simple packets carry no timestamp.
                        let link = links.first().copied().unwrap_or(DataLink::ETHERNET);
                        return Some(Ok(Packet {
                            link,
                            seen: *last_seen,
                            data: spb.data.into_owned(),
                        }));
                    }
                    _ => {}
                }
            },
        }
    }
}

/// Packets read and segments handed on by [`replay`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub packets: u64,
    pub segments: u64,
}

/// Feed every TCP segment of `capture` accepted by `filter` to `assembler`.
///
/// A read error part-way through ends the capture early, keeping what was
/// read so far.
pub fn replay<R: BufRead>(
    capture: &mut Capture<R>,
    filter: &Filter,
    assembler: &mut Assembler,
) -> ReplayStats {
    let mut stats = ReplayStats::default();
    while let Some(packet) = capture.next_packet() {
        let packet = match packet {
            Ok(packet) => packet,
            Err(error) => {
                warn!(packets = stats.packets, "capture truncated: {error:#}");
                break;
            }
        };
        stats.packets += 1;

        let Some(segment) = packet.segment() else {
            continue;
        };
        if !filter.matches(&segment) {
            continue;
        }
        stats.segments += 1;
        assembler.process(segment);
    }
    debug!(packets = stats.packets, segments = stats.segments, "capture replayed");
    stats
}

/// Extract the TCP segment of a `link`-framed packet.
pub fn parse_segment(link: DataLink, data: &[u8], seen: Timestamp) -> Option<Segment> {
    let sliced = match link {
        DataLink::ETHERNET => SlicedPacket::from_ethernet(data).ok()?,
        DataLink::RAW | DataLink::IPV4 | DataLink::IPV6 => SlicedPacket::from_ip(data).ok()?,
        DataLink::LINUX_SLL => SlicedPacket::from_linux_sll(data).ok()?,
        _ => return None,
    };

    let network = match &sliced.net {
        Some(NetSlice::Ipv4(ip)) => Flow::new(
            IpAddr::V4(ip.header().source_addr()),
            IpAddr::V4(ip.header().destination_addr()),
        ),
        Some(NetSlice::Ipv6(ip)) => Flow::new(
            IpAddr::V6(ip.header().source_addr()),
            IpAddr::V6(ip.header().destination_addr()),
        ),
        _ => return None,
    };
    let Some(TransportSlice::Tcp(tcp)) = &sliced.transport else {
        return None;
    };

    Some(Segment {
        flows: FlowPair::new(
            network,
            Flow::new(tcp.source_port(), tcp.destination_port()),
        ),
        seq: tcp.sequence_number(),
        syn: tcp.syn(),
        fin: tcp.fin(),
        rst: tcp.rst(),
        payload: tcp.payload().to_vec(),
        seen,
    })
}

fn timestamp(since_epoch: Duration) -> Timestamp {
    let secs = i64::try_from(since_epoch.as_secs()).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp(secs, since_epoch.subsec_nanos()).unwrap_or_default()
}
