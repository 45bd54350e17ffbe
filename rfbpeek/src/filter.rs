//! Packet filter expressions.
//!
//! A small subset of the pcap filter language: a conjunction of primitives,
//! with optional `and` between them.
//!
//! ```text
//! tcp
//! host 10.0.0.5
//! src host 10.0.0.5      dst host 10.0.0.5
//! port 5900
//! src port 5900          dst port 5900
//! ```
//!
//! An empty expression accepts every segment.

use std::fmt;
use std::net::IpAddr;

use thiserror::Error;

use crate::capture::Segment;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("unexpected token `{0}` in filter")]
    UnexpectedToken(String),

    #[error("`{0}` expects an argument")]
    MissingArgument(&'static str),

    #[error("invalid address `{0}` in filter")]
    InvalidAddress(String),

    #[error("invalid port `{0}` in filter")]
    InvalidPort(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Either,
    Src,
    Dst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    Tcp,
    Host(Direction, IpAddr),
    Port(Direction, u16),
}

impl Primitive {
    fn matches(&self, segment: &Segment) -> bool {
        let net = segment.flows.network;
        let transport = segment.flows.transport;
        match *self {
            Primitive::Tcp => true,
            Primitive::Host(Direction::Either, addr) => net.src() == addr || net.dst() == addr,
            Primitive::Host(Direction::Src, addr) => net.src() == addr,
            Primitive::Host(Direction::Dst, addr) => net.dst() == addr,
            Primitive::Port(Direction::Either, port) => {
                transport.src() == port || transport.dst() == port
            }
            Primitive::Port(Direction::Src, port) => transport.src() == port,
            Primitive::Port(Direction::Dst, port) => transport.dst() == port,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = |d: &Direction| match d {
            Direction::Either => "",
            Direction::Src => "src ",
            Direction::Dst => "dst ",
        };
        match self {
            Primitive::Tcp => write!(f, "tcp"),
            Primitive::Host(d, addr) => write!(f, "{}host {}", dir(d), addr),
            Primitive::Port(d, port) => write!(f, "{}port {}", dir(d), port),
        }
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    primitives: Vec<Primitive>,
}

impl Filter {
    pub fn parse(expression: &str) -> Result<Self, FilterError> {
        let mut tokens = expression.split_whitespace();
        let mut primitives = Vec::new();

        while let Some(token) = tokens.next() {
            let primitive = match token {
                "and" | "&&" => continue,
                "tcp" => Primitive::Tcp,
                "host" => Primitive::Host(Direction::Either, host(tokens.next())?),
                "port" => Primitive::Port(Direction::Either, port(tokens.next())?),
                "src" | "dst" => {
                    let direction = if token == "src" {
                        Direction::Src
                    } else {
                        Direction::Dst
                    };
                    match tokens.next() {
                        Some("host") => Primitive::Host(direction, host(tokens.next())?),
                        Some("port") => Primitive::Port(direction, port(tokens.next())?),
                        Some(other) => return Err(FilterError::UnexpectedToken(other.into())),
                        None => return Err(FilterError::MissingArgument("src/dst")),
                    }
                }
                other => return Err(FilterError::UnexpectedToken(other.into())),
            };
            primitives.push(primitive);
        }

        Ok(Self { primitives })
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn matches(&self, segment: &Segment) -> bool {
        self.primitives.iter().all(|p| p.matches(segment))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, primitive) in self.primitives.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{primitive}")?;
        }
        Ok(())
    }
}

fn host(token: Option<&str>) -> Result<IpAddr, FilterError> {
    let token = token.ok_or(FilterError::MissingArgument("host"))?;
    token
        .parse()
        .map_err(|_| FilterError::InvalidAddress(token.into()))
}

fn port(token: Option<&str>) -> Result<u16, FilterError> {
    let token = token.ok_or(FilterError::MissingArgument("port"))?;
    token
        .parse()
        .map_err(|_| FilterError::InvalidPort(token.into()))
}
