//! Socket and mux configuration.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::timeout::Timeout;

/// Options applied to sockets by
/// [`configure_client_socket`](crate::OsNetworkLibrary::configure_client_socket)
/// and [`configure_server_socket`](crate::OsNetworkLibrary::configure_server_socket).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig {
  pub reuse_addr: bool,
  pub keep_alive: bool,
  pub tcp_no_delay: bool,
  /// Only applied to IPv6 server sockets. `false` keeps them dual-stack.
  pub ipv6_only: bool,
}

impl Default for SocketConfig {
  fn default() -> Self {
    Self {
      reuse_addr: true,
      keep_alive: false,
      tcp_no_delay: true,
      ipv6_only: false,
    }
  }
}

impl SocketConfig {
  pub fn with_reuse_addr(mut self, value: bool) -> Self {
    self.reuse_addr = value;
    self
  }

  pub fn with_keep_alive(mut self, value: bool) -> Self {
    self.keep_alive = value;
    self
  }

  pub fn with_tcp_no_delay(mut self, value: bool) -> Self {
    self.tcp_no_delay = value;
    self
  }

  pub fn with_ipv6_only(mut self, value: bool) -> Self {
    self.ipv6_only = value;
    self
  }
}

/// Per-reactor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxConfig {
  /// `listen(2)` backlog.
  pub backlog: i32,
  /// Event buffer capacity handed to each `wait`.
  pub max_events: usize,
  /// How long one `wait` may block.
  pub mux_timeout: Duration,
}

impl MuxConfig {
  pub const MIN_BACKLOG: i32 = 16;
  pub const MIN_MAX_EVENTS: usize = 16;
  pub const MAX_TIMEOUT: Duration = Duration::from_millis(200);

  pub fn validate(&self) -> Result<()> {
    if self.backlog < Self::MIN_BACKLOG {
      return Err(Error::InvalidConfig("backlog must be at least 16"));
    }
    if self.max_events < Self::MIN_MAX_EVENTS {
      return Err(Error::InvalidConfig("max events must be at least 16"));
    }
    if self.mux_timeout > Self::MAX_TIMEOUT {
      return Err(Error::InvalidConfig("mux timeout must not exceed 200ms"));
    }
    Ok(())
  }

  pub fn timeout(&self) -> Timeout {
    Timeout::from_duration(self.mux_timeout)
  }
}

impl Default for MuxConfig {
  fn default() -> Self {
    Self {
      backlog: 64,
      max_events: 16,
      mux_timeout: Duration::from_millis(25),
    }
  }
}
