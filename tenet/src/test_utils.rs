//! Test utilities for integration tests.
//!
//! Helpers for standing up loopback listeners and peers through the
//! process-wide library, and for polling a mux until a readiness shows up.

use std::net::TcpStream;
use std::time::{Duration, Instant};
use std::{io, thread};

use crate::{
  Accepted, EventBuffer, IpType, Loc, Mux, MuxEvent, OsNetworkLibrary,
  Readiness, Result, Socket, SocketConfig, Timeout, library,
};

/// Loopback loc of `ip_type` with port `0`.
#[doc(hidden)]
pub fn loopback(ip_type: IpType) -> Loc {
  match ip_type {
    IpType::Ipv4 => Loc::ipv4("127.0.0.1", 0),
    IpType::Ipv6 => Loc::ipv6("::1", 0),
  }
}

/// Binds and listens on `loc` with the default server configuration.
///
/// Returns the listener and the loc it is actually bound to, so port `0`
/// resolves to the kernel's pick.
#[doc(hidden)]
pub fn listen_on(loc: &Loc, config: &SocketConfig) -> Result<(Socket, Loc)> {
  let lib = library();
  let socket = lib.create_socket(loc)?;
  lib.configure_server_socket(socket, loc, config)?;
  lib.bind_and_listen(socket, loc, 64)?;
  let bound = loc.with_port(lib.local_loc(socket)?.port());
  Ok((socket, bound))
}

/// A non-blocking loopback listener on an ephemeral port.
#[doc(hidden)]
pub fn listener(ip_type: IpType) -> Result<(Socket, Loc)> {
  listen_on(&loopback(ip_type), &SocketConfig::default())
}

/// A blocking std peer connected to `loc`.
#[doc(hidden)]
pub fn peer(loc: &Loc) -> io::Result<TcpStream> {
  let stream = TcpStream::connect(loc.to_socket_addr()?)?;
  stream.set_nodelay(true)?;
  Ok(stream)
}

/// Retries `accept_connection` until a connection arrives or `timeout`
/// elapses.
#[doc(hidden)]
pub fn accept_within(
  loc: &Loc,
  listener: Socket,
  timeout: Duration,
) -> Result<Option<Accepted>> {
  let lib = library();
  let deadline = Instant::now() + timeout;
  loop {
    if let Some(accepted) =
      lib.accept_connection(loc, listener, &SocketConfig::default())?
    {
      return Ok(Some(accepted));
    }
    if Instant::now() >= deadline {
      return Ok(None);
    }
    thread::sleep(Duration::from_millis(1));
  }
}

/// A reactor-side socket connected to a std peer.
#[doc(hidden)]
pub struct Pair {
  pub listener: Socket,
  pub socket: Socket,
  pub peer: TcpStream,
}

impl Pair {
  pub fn close(self) {
    let lib = library();
    lib.close_socket(self.socket);
    lib.close_socket(self.listener);
  }
}

/// Connects a std peer to a fresh IPv4 listener and accepts it.
#[doc(hidden)]
pub fn connected_pair() -> io::Result<Pair> {
  let (listener, loc) = self::listener(IpType::Ipv4)?;
  let peer = peer(&loc)?;
  match accept_within(&loc, listener, Duration::from_secs(5))? {
    Some(accepted) => Ok(Pair { listener, socket: accepted.socket, peer }),
    None => Err(io::Error::new(io::ErrorKind::TimedOut, "accept timed out")),
  }
}

/// Waits on `mux` until `socket` reports `readiness` or `timeout` elapses.
#[doc(hidden)]
pub fn wait_for(
  mux: Mux,
  events: &mut EventBuffer,
  socket: Socket,
  readiness: Readiness,
  timeout: Duration,
) -> Result<bool> {
  let lib = library();
  let deadline = Instant::now() + timeout;
  loop {
    let n = lib.wait(mux, events, Timeout::from_millis(10))?;
    if lib
      .ready_events(events, n)
      .any(|event| event == MuxEvent::new(socket, readiness))
    {
      return Ok(true);
    }
    if Instant::now() >= deadline {
      return Ok(false);
    }
  }
}

/// Every event one wait of at most `timeout` reports.
#[doc(hidden)]
pub fn poll_once(
  mux: Mux,
  events: &mut EventBuffer,
  timeout: Timeout,
) -> Result<Vec<MuxEvent>> {
  let lib = library();
  let n = lib.wait(mux, events, timeout)?;
  Ok(lib.ready_events(events, n).collect())
}
