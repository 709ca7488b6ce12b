//! Resolved endpoints.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{Error, Result};

/// Address family of a [`Loc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpType {
  Ipv4,
  Ipv6,
}

impl fmt::Display for IpType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      IpType::Ipv4 => f.write_str("IPv4"),
      IpType::Ipv6 => f.write_str("IPv6"),
    }
  }
}

/// An already-resolved `(family, address, port)` triple.
///
/// A blank `ip` stands for the wildcard address of its family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Loc {
  ip_type: IpType,
  ip: String,
  port: u16,
}

impl Loc {
  pub fn new(ip_type: IpType, ip: impl Into<String>, port: u16) -> Self {
    Self { ip_type, ip: ip.into(), port }
  }

  pub fn ipv4(ip: impl Into<String>, port: u16) -> Self {
    Self::new(IpType::Ipv4, ip, port)
  }

  pub fn ipv6(ip: impl Into<String>, port: u16) -> Self {
    Self::new(IpType::Ipv6, ip, port)
  }

  pub fn ip_type(&self) -> IpType {
    self.ip_type
  }

  pub fn ip(&self) -> &str {
    &self.ip
  }

  pub fn port(&self) -> u16 {
    self.port
  }

  pub fn is_wildcard(&self) -> bool {
    self.ip.trim().is_empty()
  }

  /// Same address, different port.
  pub fn with_port(&self, port: u16) -> Self {
    Self { port, ..self.clone() }
  }

  pub fn to_socket_addr(&self) -> Result<SocketAddr> {
    let ip = match self.ip_type {
      IpType::Ipv4 if self.is_wildcard() => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
      IpType::Ipv6 if self.is_wildcard() => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
      IpType::Ipv4 => self.ip.parse::<Ipv4Addr>().map(IpAddr::V4).map_err(|_| {
        self.invalid()
      })?,
      IpType::Ipv6 => self.ip.parse::<Ipv6Addr>().map(IpAddr::V6).map_err(|_| {
        self.invalid()
      })?,
    };
    Ok(SocketAddr::new(ip, self.port))
  }

  pub(crate) fn invalid(&self) -> Error {
    Error::InvalidAddress { ip_type: self.ip_type, ip: self.ip.clone() }
  }
}

impl fmt::Display for Loc {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let ip = if self.is_wildcard() { "localhost" } else { self.ip.as_str() };
    write!(f, "[{ip}:{}]", self.port)
  }
}

impl From<SocketAddr> for Loc {
  fn from(addr: SocketAddr) -> Self {
    match addr {
      SocketAddr::V4(v4) => Loc::ipv4(v4.ip().to_string(), v4.port()),
      SocketAddr::V6(v6) => Loc::ipv6(v6.ip().to_string(), v6.port()),
    }
  }
}

impl TryFrom<&Loc> for SocketAddr {
  type Error = Error;

  fn try_from(loc: &Loc) -> Result<Self> {
    loc.to_socket_addr()
  }
}
