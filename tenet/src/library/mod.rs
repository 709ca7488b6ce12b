//! The platform interface.
//!
//! [`OsNetworkLibrary`] has two halves. The required methods are thin
//! per-backend wrappers over `tenet-sys` and return raw OS statuses. The
//! provided methods hold the logic every backend shares: turning failures
//! into [`Error`]s, building socket addresses, configuring sockets and
//! accepting connections.
//!
//! | Platform      | Backend            |
//! |---------------|--------------------|
//! | Linux         | [`EpollLibrary`]   |
//! | macOS / BSD   | `KqueueLibrary`    |
//! | Windows       | `WepollLibrary`    |

use std::ffi::{CStr, CString};
use std::net::Ipv4Addr;

use tracing::{debug, trace, warn};

use crate::addr::SockAddr;
use crate::config::SocketConfig;
use crate::error::{Error, Result};
use crate::events::EventBuffer;
use crate::interest::{Interest, MuxEvent, Readiness};
use crate::layout::MemoryLayout;
use crate::loc::{IpType, Loc};
use crate::mux::Mux;
use crate::socket::Socket;
use crate::timeout::Timeout;

/// Implements the socket-level required methods, which are identical for
/// every backend because `tenet-sys` exposes one signature per call.
macro_rules! impl_socket_calls {
  () => {
    fn connect_block_code(&self) -> i32 {
      tenet_sys::connect_block_code()
    }

    fn send_block_code(&self) -> i32 {
      tenet_sys::send_block_code()
    }

    fn interrupt_code(&self) -> i32 {
      tenet_sys::interrupt_code()
    }

    fn ipv4_address_len(&self) -> usize {
      tenet_sys::ipv4_address_len()
    }

    fn ipv6_address_len(&self) -> usize {
      tenet_sys::ipv6_address_len()
    }

    fn ipv4_address_size(&self) -> usize {
      tenet_sys::ipv4_address_size()
    }

    fn ipv6_address_size(&self) -> usize {
      tenet_sys::ipv6_address_size()
    }

    fn ipv4_address_align(&self) -> usize {
      tenet_sys::ipv4_address_align()
    }

    fn ipv6_address_align(&self) -> usize {
      tenet_sys::ipv6_address_align()
    }

    fn set_ipv4_sock_addr(
      &self,
      addr: &mut $crate::SockAddr,
      ip: Option<&std::ffi::CStr>,
      port: u16,
    ) -> i32 {
      let ip = ip.map_or(std::ptr::null(), std::ffi::CStr::as_ptr);
      // SAFETY: the storage fits a sockaddr_in and `ip` is null or a
      // nul-terminated string.
      unsafe { tenet_sys::set_ipv4_sock_addr(addr.storage_mut_ptr(), ip, port) }
    }

    fn set_ipv6_sock_addr(
      &self,
      addr: &mut $crate::SockAddr,
      ip: Option<&std::ffi::CStr>,
      port: u16,
    ) -> i32 {
      let ip = ip.map_or(std::ptr::null(), std::ffi::CStr::as_ptr);
      // SAFETY: the storage fits a sockaddr_in6 and `ip` is null or a
      // nul-terminated string.
      unsafe { tenet_sys::set_ipv6_sock_addr(addr.storage_mut_ptr(), ip, port) }
    }

    fn create_ipv4_socket(&self) -> $crate::Result<$crate::Socket> {
      let socket =
        $crate::Socket::from_raw_socket(tenet_sys::ipv4_socket_create());
      self.check_socket(socket, "create ipv4 socket")
    }

    fn create_ipv6_socket(&self) -> $crate::Result<$crate::Socket> {
      let socket =
        $crate::Socket::from_raw_socket(tenet_sys::ipv6_socket_create());
      self.check_socket(socket, "create ipv6 socket")
    }

    fn set_reuse_addr(&self, socket: $crate::Socket, value: bool) -> i32 {
      tenet_sys::set_reuse_addr(socket.as_raw(), value as _)
    }

    fn set_keep_alive(&self, socket: $crate::Socket, value: bool) -> i32 {
      tenet_sys::set_keep_alive(socket.as_raw(), value as _)
    }

    fn set_tcp_no_delay(&self, socket: $crate::Socket, value: bool) -> i32 {
      tenet_sys::set_tcp_no_delay(socket.as_raw(), value as _)
    }

    fn set_ipv6_only(&self, socket: $crate::Socket, value: bool) -> i32 {
      tenet_sys::set_ipv6_only(socket.as_raw(), value as _)
    }

    fn set_non_blocking(&self, socket: $crate::Socket) -> i32 {
      tenet_sys::set_non_blocking(socket.as_raw())
    }

    fn ipv4_port(&self, addr: &$crate::SockAddr) -> u16 {
      // SAFETY: the storage is always large enough for a sockaddr_in.
      unsafe { tenet_sys::ipv4_port(addr.storage_ptr()) }
    }

    fn ipv6_port(&self, addr: &$crate::SockAddr) -> u16 {
      // SAFETY: the storage is always large enough for a sockaddr_in6.
      unsafe { tenet_sys::ipv6_port(addr.storage_ptr()) }
    }

    fn ipv4_address(&self, addr: &$crate::SockAddr, out: &mut [u8]) -> i32 {
      // SAFETY: `out` is valid for `out.len()` bytes.
      unsafe {
        tenet_sys::get_ipv4_address(
          addr.storage_ptr(),
          out.as_mut_ptr().cast(),
          out.len() as _,
        )
      }
    }

    fn ipv6_address(&self, addr: &$crate::SockAddr, out: &mut [u8]) -> i32 {
      // SAFETY: `out` is valid for `out.len()` bytes.
      unsafe {
        tenet_sys::get_ipv6_address(
          addr.storage_ptr(),
          out.as_mut_ptr().cast(),
          out.len() as _,
        )
      }
    }

    fn bind(&self, socket: $crate::Socket, addr: &$crate::SockAddr) -> i32 {
      // SAFETY: `addr` exposes `raw_len` initialised bytes.
      unsafe { tenet_sys::bind(socket.as_raw(), addr.as_ptr(), addr.raw_len()) }
    }

    fn listen(&self, socket: $crate::Socket, backlog: i32) -> i32 {
      tenet_sys::listen(socket.as_raw(), backlog)
    }

    fn connect(&self, socket: $crate::Socket, addr: &$crate::SockAddr) -> i32 {
      // SAFETY: `addr` exposes `raw_len` initialised bytes.
      unsafe {
        tenet_sys::connect(socket.as_raw(), addr.as_ptr(), addr.raw_len())
      }
    }

    fn accept(
      &self,
      socket: $crate::Socket,
      addr: &mut $crate::SockAddr,
    ) -> $crate::Socket {
      // SAFETY: the kernel writes at most `raw_len` bytes into the storage
      // and updates `raw_len` in place.
      let raw = unsafe {
        tenet_sys::accept(socket.as_raw(), addr.as_mut_ptr(), addr.raw_len_mut())
      };
      $crate::Socket::from_raw_socket(raw)
    }

    fn recv(&self, socket: $crate::Socket, buf: &mut [u8]) -> isize {
      // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
      unsafe {
        tenet_sys::recv(socket.as_raw(), buf.as_mut_ptr().cast(), buf.len())
      }
    }

    fn send(&self, socket: $crate::Socket, buf: &[u8]) -> isize {
      // SAFETY: `buf` is valid for reads of `buf.len()` bytes.
      unsafe { tenet_sys::send(socket.as_raw(), buf.as_ptr().cast(), buf.len()) }
    }

    fn errno(&self) -> i32 {
      tenet_sys::errno()
    }

    fn get_err_opt(&self, socket: $crate::Socket) -> $crate::Result<i32> {
      let mut err: std::ffi::c_int = -1;
      // SAFETY: `err` outlives the call.
      let r = unsafe { tenet_sys::get_err_opt(socket.as_raw(), &mut err) };
      self.check(r, "get SO_ERROR").map(|_| err)
    }

    fn local_addr(
      &self,
      socket: $crate::Socket,
      addr: &mut $crate::SockAddr,
    ) -> i32 {
      // SAFETY: as for `accept`.
      unsafe {
        tenet_sys::get_sock_name(
          socket.as_raw(),
          addr.as_mut_ptr(),
          addr.raw_len_mut(),
        )
      }
    }

    fn shutdown_write(&self, socket: $crate::Socket) -> i32 {
      tenet_sys::shutdown_write(socket.as_raw())
    }

    fn close_socket(&self, socket: $crate::Socket) -> i32 {
      tenet_sys::close(socket.as_raw())
    }
  };
}

#[cfg(linux)]
mod epoll;
#[cfg(linux)]
pub use epoll::EpollLibrary;

#[cfg(kqueue)]
mod kqueue;
#[cfg(kqueue)]
pub use kqueue::KqueueLibrary;

#[cfg(wepoll)]
mod wepoll;
#[cfg(wepoll)]
pub use wepoll::WepollLibrary;

/// The operating system family a backend serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
  /// epoll.
  Linux,
  /// kqueue, on macOS and the BSDs.
  MacOs,
  /// wepoll over Winsock.
  Windows,
}

impl Platform {
  /// The platform compiled into this build.
  pub const fn current() -> Self {
    if cfg!(windows) {
      Platform::Windows
    } else if cfg!(target_os = "linux") {
      Platform::Linux
    } else {
      Platform::MacOs
    }
  }
}

/// Outcome of one non-blocking `send` or `recv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
  /// Bytes moved. `Ready(0)` from `recv` means the peer shut down its write
  /// side.
  Ready(usize),
  /// Nothing moved; wait for readiness and retry. Interrupted calls land
  /// here too.
  WouldBlock,
  /// The connection is broken. Carries the platform error code.
  Fatal(i32),
}

impl Transfer {
  pub fn is_would_block(self) -> bool {
    matches!(self, Transfer::WouldBlock)
  }

  /// Bytes moved, if any call completed.
  pub fn ready(self) -> Option<usize> {
    match self {
      Transfer::Ready(n) => Some(n),
      _ => None,
    }
  }
}

/// Outcome of a non-blocking connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
  Connected,
  /// Wait for write readiness, then read `SO_ERROR` through
  /// [`get_err_opt`](OsNetworkLibrary::get_err_opt).
  InProgress,
}

/// A connection taken off a listener, with its peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
  pub socket: Socket,
  pub loc: Loc,
}

/// Native call an epoll-style `ctl` transition needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtlOp {
  Add,
  Modify,
  Delete,
}

/// The epoll-style operation moving a socket from `from` to `to`, `None` when
/// nothing changes.
pub const fn ctl_op(from: Interest, to: Interest) -> Option<CtlOp> {
  if from.is_readable() == to.is_readable()
    && from.is_writable() == to.is_writable()
  {
    None
  } else if from.is_none() {
    Some(CtlOp::Add)
  } else if to.is_none() {
    Some(CtlOp::Delete)
  } else {
    Some(CtlOp::Modify)
  }
}

/// One kqueue filter change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterChange {
  Add(Readiness),
  Delete(Readiness),
}

/// The per-filter changes moving a socket from `from` to `to`. The read
/// filter comes first; at most two changes are ever needed.
pub fn filter_changes(from: Interest, to: Interest) -> [Option<FilterChange>; 2] {
  let delta = |readiness: Readiness| {
    let bit = readiness.interest();
    match (from.contains(bit), to.contains(bit)) {
      (false, true) => Some(FilterChange::Add(readiness)),
      (true, false) => Some(FilterChange::Delete(readiness)),
      _ => None,
    }
  };
  [delta(Readiness::Read), delta(Readiness::Write)]
}

/// Strips the `::ffff:` prefix of an IPv4-mapped IPv6 address.
fn unmap_ipv4(ip: &str) -> Option<&str> {
  let tail = ip
    .get(..7)
    .filter(|prefix| prefix.eq_ignore_ascii_case("::ffff:"))
    .map(|_| &ip[7..])?;
  tail.parse::<Ipv4Addr>().is_ok().then_some(tail)
}

fn nul_terminated(buf: &[u8]) -> String {
  let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
  String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Platform independent socket and multiplexer operations.
///
/// One implementation exists per operating system and exactly one is
/// compiled in; reach it through [`library()`](crate::library).
pub trait OsNetworkLibrary: Send + Sync + 'static {
  fn platform(&self) -> Platform;

  /// Error code of a non-blocking connect still in progress.
  fn connect_block_code(&self) -> i32;
  /// Error code of a send, recv or accept that would block.
  fn send_block_code(&self) -> i32;
  /// Error code of an interrupted call.
  fn interrupt_code(&self) -> i32;

  fn ipv4_address_len(&self) -> usize;
  fn ipv6_address_len(&self) -> usize;
  fn ipv4_address_size(&self) -> usize;
  fn ipv6_address_size(&self) -> usize;
  fn ipv4_address_align(&self) -> usize;
  fn ipv6_address_align(&self) -> usize;

  /// The declared layout of one native event record.
  fn event_layout(&self) -> &'static MemoryLayout;

  fn create_mux(&self) -> Result<Mux>;

  /// Moves `socket` from interest `from` to `to`. Returns the raw status;
  /// `from == to` issues no native call and returns `0`.
  fn ctl(&self, mux: Mux, socket: Socket, from: Interest, to: Interest)
  -> i32;

  /// Fills up to `max_events` records of `events`. Returns the raw status.
  fn mux_wait(
    &self,
    mux: Mux,
    events: &mut EventBuffer,
    max_events: usize,
    timeout: Timeout,
  ) -> i32;

  /// The `(socket, readiness)` pair in record `index`.
  fn access(&self, events: &EventBuffer, index: usize) -> MuxEvent;

  fn close_mux(&self, mux: Mux) -> i32;

  /// Returns `1` on success, `0` for invalid address text, `-1` on error.
  fn set_ipv4_sock_addr(
    &self,
    addr: &mut SockAddr,
    ip: Option<&CStr>,
    port: u16,
  ) -> i32;
  /// Returns `1` on success, `0` for invalid address text, `-1` on error.
  fn set_ipv6_sock_addr(
    &self,
    addr: &mut SockAddr,
    ip: Option<&CStr>,
    port: u16,
  ) -> i32;

  fn create_ipv4_socket(&self) -> Result<Socket>;
  fn create_ipv6_socket(&self) -> Result<Socket>;

  fn set_reuse_addr(&self, socket: Socket, value: bool) -> i32;
  fn set_keep_alive(&self, socket: Socket, value: bool) -> i32;
  fn set_tcp_no_delay(&self, socket: Socket, value: bool) -> i32;
  fn set_ipv6_only(&self, socket: Socket, value: bool) -> i32;
  fn set_non_blocking(&self, socket: Socket) -> i32;

  fn ipv4_port(&self, addr: &SockAddr) -> u16;
  fn ipv6_port(&self, addr: &SockAddr) -> u16;
  /// Writes the nul-terminated address text into `out`.
  fn ipv4_address(&self, addr: &SockAddr, out: &mut [u8]) -> i32;
  fn ipv6_address(&self, addr: &SockAddr, out: &mut [u8]) -> i32;

  fn bind(&self, socket: Socket, addr: &SockAddr) -> i32;
  fn listen(&self, socket: Socket, backlog: i32) -> i32;
  fn connect(&self, socket: Socket, addr: &SockAddr) -> i32;
  /// Returns [`Socket::INVALID`] on failure; consult [`errno`](Self::errno).
  fn accept(&self, socket: Socket, addr: &mut SockAddr) -> Socket;
  fn recv(&self, socket: Socket, buf: &mut [u8]) -> isize;
  fn send(&self, socket: Socket, buf: &[u8]) -> isize;

  /// The calling thread's last error code.
  fn errno(&self) -> i32;
  /// The socket's pending error (`SO_ERROR`). `0` means none.
  fn get_err_opt(&self, socket: Socket) -> Result<i32>;
  fn local_addr(&self, socket: Socket, addr: &mut SockAddr) -> i32;
  fn shutdown_write(&self, socket: Socket) -> i32;
  fn close_socket(&self, socket: Socket) -> i32;

  /// Process-wide native cleanup.
  fn exit(&self);

  /// Turns a negative status into an [`Error`], reading the error code
  /// before anything else can overwrite it.
  fn check(&self, value: i32, op: &'static str) -> Result<i32> {
    if value < 0 {
      let code = self.errno();
      warn!(op, code, "native call failed");
      Err(Error::Os { op, code })
    } else {
      Ok(value)
    }
  }

  /// Like [`check`](Self::check) for calls returning a socket.
  fn check_socket(&self, socket: Socket, op: &'static str) -> Result<Socket> {
    if socket.is_invalid() {
      let code = self.errno();
      warn!(op, code, "native call failed");
      Err(Error::Os { op, code })
    } else {
      debug!(%socket, op, "socket created");
      Ok(socket)
    }
  }

  /// An event buffer shaped for this backend.
  fn new_event_buffer(&self, capacity: usize) -> EventBuffer {
    EventBuffer::for_layout(self.event_layout(), capacity)
  }

  fn ctl_mux(
    &self,
    mux: Mux,
    socket: Socket,
    from: Interest,
    to: Interest,
  ) -> Result<()> {
    if from == to {
      return Ok(());
    }
    trace!(%mux, %socket, %from, %to, "ctl");
    self.check(self.ctl(mux, socket, from, to), "ctl mux").map(drop)
  }

  /// Blocks until an event arrives or `timeout` elapses. Returns how many
  /// records were filled; an interrupted wait counts as `0`.
  fn wait(
    &self,
    mux: Mux,
    events: &mut EventBuffer,
    timeout: Timeout,
  ) -> Result<usize> {
    let capacity = events.capacity();
    let r = self.mux_wait(mux, events, capacity, timeout);
    if r < 0 {
      let code = self.errno();
      if code == self.interrupt_code() {
        trace!(%mux, "wait interrupted");
        return Ok(0);
      }
      warn!(%mux, code, "wait failed");
      return Err(Error::Os { op: "wait mux", code });
    }
    trace!(%mux, count = r, "wait returned");
    Ok(r as usize)
  }

  /// The first `count` events of `events`.
  fn ready_events<'a>(
    &'a self,
    events: &'a EventBuffer,
    count: usize,
  ) -> impl Iterator<Item = MuxEvent> + 'a {
    (0..count).map(move |index| self.access(events, index))
  }

  fn exit_mux(&self, mux: Mux) -> Result<()> {
    debug!(%mux, "closing mux");
    self.check(self.close_mux(mux), "close mux").map(drop)
  }

  /// A native address for `loc`. A blank ip selects the wildcard address.
  fn create_sock_addr(&self, loc: &Loc) -> Result<SockAddr> {
    let ip = if loc.is_wildcard() {
      None
    } else {
      Some(CString::new(loc.ip()).map_err(|_| loc.invalid())?)
    };
    let (addr, r) = match loc.ip_type() {
      IpType::Ipv4 => {
        let mut addr =
          SockAddr::zeroed(self.ipv4_address_size(), self.ipv4_address_align());
        let r = self.set_ipv4_sock_addr(&mut addr, ip.as_deref(), loc.port());
        (addr, r)
      }
      IpType::Ipv6 => {
        let mut addr =
          SockAddr::zeroed(self.ipv6_address_size(), self.ipv6_address_align());
        let r = self.set_ipv6_sock_addr(&mut addr, ip.as_deref(), loc.port());
        (addr, r)
      }
    };
    match self.check(r, "set sock addr")? {
      0 => Err(loc.invalid()),
      _ => Ok(addr),
    }
  }

  /// A socket of the family `loc` uses.
  fn create_socket(&self, loc: &Loc) -> Result<Socket> {
    match loc.ip_type() {
      IpType::Ipv4 => self.create_ipv4_socket(),
      IpType::Ipv6 => self.create_ipv6_socket(),
    }
  }

  fn configure_client_socket(
    &self,
    socket: Socket,
    config: &SocketConfig,
  ) -> Result<()> {
    self.check(
      self.set_keep_alive(socket, config.keep_alive),
      "set client SO_KEEPALIVE",
    )?;
    self.check(
      self.set_tcp_no_delay(socket, config.tcp_no_delay),
      "set client TCP_NODELAY",
    )?;
    self.check(self.set_non_blocking(socket), "set client non-blocking")?;
    Ok(())
  }

  fn configure_server_socket(
    &self,
    socket: Socket,
    loc: &Loc,
    config: &SocketConfig,
  ) -> Result<()> {
    self.check(
      self.set_reuse_addr(socket, config.reuse_addr),
      "set server SO_REUSEADDR",
    )?;
    self.check(
      self.set_keep_alive(socket, config.keep_alive),
      "set server SO_KEEPALIVE",
    )?;
    self.check(
      self.set_tcp_no_delay(socket, config.tcp_no_delay),
      "set server TCP_NODELAY",
    )?;
    if loc.ip_type() == IpType::Ipv6 {
      self.check(
        self.set_ipv6_only(socket, config.ipv6_only),
        "set server IPV6_V6ONLY",
      )?;
    }
    self.check(self.set_non_blocking(socket), "set server non-blocking")?;
    Ok(())
  }

  fn bind_and_listen(
    &self,
    socket: Socket,
    loc: &Loc,
    backlog: i32,
  ) -> Result<()> {
    let addr = self.create_sock_addr(loc)?;
    self.check(self.bind(socket, &addr), "bind")?;
    self.check(self.listen(socket, backlog), "listen")?;
    debug!(%socket, %loc, backlog, "listening");
    Ok(())
  }

  /// Accepts one pending connection on the listener `socket` bound to `loc`.
  ///
  /// Returns `None` when no connection is pending. A dual-stack IPv6
  /// listener reports IPv4 peers as plain IPv4 locs. The accepted socket is
  /// configured as a client socket; if that fails it is closed.
  fn accept_connection(
    &self,
    loc: &Loc,
    socket: Socket,
    config: &SocketConfig,
  ) -> Result<Option<Accepted>> {
    let mut addr = match loc.ip_type() {
      IpType::Ipv4 => {
        SockAddr::zeroed(self.ipv4_address_size(), self.ipv4_address_align())
      }
      IpType::Ipv6 => {
        SockAddr::zeroed(self.ipv6_address_size(), self.ipv6_address_align())
      }
    };
    let client = self.accept(socket, &mut addr);
    if client.is_invalid() {
      let code = self.errno();
      if code == self.send_block_code() || code == self.interrupt_code() {
        return Ok(None);
      }
      warn!(listener = %socket, code, "accept failed");
      return Err(Error::Os { op: "accept", code });
    }
    let peer = self
      .configure_client_socket(client, config)
      .and_then(|()| self.sock_addr_loc(&addr));
    match peer {
      Ok(peer) => {
        debug!(listener = %socket, socket = %client, %peer, "accepted");
        Ok(Some(Accepted { socket: client, loc: peer }))
      }
      Err(err) => {
        self.discard_socket(client);
        Err(err)
      }
    }
  }

  /// Closes a socket on an error path where the close status cannot be
  /// propagated. A failed close is logged since it leaks the handle.
  fn discard_socket(&self, socket: Socket) -> i32 {
    let r = self.close_socket(socket);
    if r != 0 {
      let code = self.errno();
      warn!(%socket, code, "close failed, handle may leak");
    }
    r
  }

  /// Reads a filled native address back into a [`Loc`].
  fn sock_addr_loc(&self, addr: &SockAddr) -> Result<Loc> {
    match addr.family() {
      tenet_sys::AF_INET => {
        let mut text = vec![0u8; self.ipv4_address_len()];
        self.check(self.ipv4_address(addr, &mut text), "get ipv4 address")?;
        Ok(Loc::ipv4(nul_terminated(&text), self.ipv4_port(addr)))
      }
      tenet_sys::AF_INET6 => {
        let mut text = vec![0u8; self.ipv6_address_len()];
        self.check(self.ipv6_address(addr, &mut text), "get ipv6 address")?;
        let ip = nul_terminated(&text);
        let port = self.ipv6_port(addr);
        Ok(match unmap_ipv4(&ip) {
          Some(v4) => Loc::ipv4(v4, port),
          None => Loc::ipv6(ip, port),
        })
      }
      family => Err(Error::AddressFamily(family)),
    }
  }

  /// Starts a non-blocking connect to `loc`.
  fn try_connect(&self, socket: Socket, loc: &Loc) -> Result<ConnectStatus> {
    let addr = self.create_sock_addr(loc)?;
    if self.connect(socket, &addr) == 0 {
      debug!(%socket, %loc, "connected");
      return Ok(ConnectStatus::Connected);
    }
    let code = self.errno();
    if code == self.connect_block_code() || code == self.interrupt_code() {
      trace!(%socket, %loc, "connect in progress");
      Ok(ConnectStatus::InProgress)
    } else {
      warn!(%socket, %loc, code, "connect failed");
      Err(Error::Os { op: "connect", code })
    }
  }

  fn try_send(&self, socket: Socket, buf: &[u8]) -> Transfer {
    let r = self.send(socket, buf);
    self.transfer(r)
  }

  fn try_recv(&self, socket: Socket, buf: &mut [u8]) -> Transfer {
    let r = self.recv(socket, buf);
    self.transfer(r)
  }

  /// Receives into the spare capacity of `buf`, growing it if full.
  #[cfg(feature = "bytes")]
  fn try_recv_buf(&self, socket: Socket, buf: &mut bytes::BytesMut) -> Transfer {
    const CHUNK: usize = 4096;
    let start = buf.len();
    if buf.capacity() == start {
      buf.reserve(CHUNK);
    }
    buf.resize(buf.capacity(), 0);
    let transfer = self.try_recv(socket, &mut buf[start..]);
    buf.truncate(start + transfer.ready().unwrap_or(0));
    transfer
  }

  /// Classifies a raw send/recv status.
  fn transfer(&self, r: isize) -> Transfer {
    if r >= 0 {
      return Transfer::Ready(r as usize);
    }
    let code = self.errno();
    if code == self.send_block_code() || code == self.interrupt_code() {
      Transfer::WouldBlock
    } else {
      Transfer::Fatal(code)
    }
  }

  /// The address `socket` is bound to.
  fn local_loc(&self, socket: Socket) -> Result<Loc> {
    let mut addr = SockAddr::any();
    self.check(self.local_addr(socket, &mut addr), "get sock name")?;
    self.sock_addr_loc(&addr)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  fn interest() -> impl Strategy<Value = Interest> {
    prop::sample::select(Interest::ALL.to_vec())
  }

  #[test]
  fn test_ctl_op_table() {
    use Interest as I;
    assert_eq!(ctl_op(I::NONE, I::READ), Some(CtlOp::Add));
    assert_eq!(ctl_op(I::NONE, I::READ_AND_WRITE), Some(CtlOp::Add));
    assert_eq!(ctl_op(I::WRITE, I::NONE), Some(CtlOp::Delete));
    assert_eq!(ctl_op(I::READ, I::WRITE), Some(CtlOp::Modify));
    assert_eq!(ctl_op(I::READ_AND_WRITE, I::READ), Some(CtlOp::Modify));
    assert_eq!(ctl_op(I::WRITE, I::WRITE), None);
  }

  #[test]
  fn test_filter_changes_swap() {
    let changes = filter_changes(Interest::READ, Interest::WRITE);
    assert_eq!(
      changes,
      [
        Some(FilterChange::Delete(Readiness::Read)),
        Some(FilterChange::Add(Readiness::Write))
      ]
    );
  }

  #[test]
  fn test_unmap_ipv4() {
    assert_eq!(unmap_ipv4("::ffff:127.0.0.1"), Some("127.0.0.1"));
    assert_eq!(unmap_ipv4("::FFFF:10.0.0.2"), Some("10.0.0.2"));
    assert_eq!(unmap_ipv4("::1"), None);
    assert_eq!(unmap_ipv4("::ffff:abcd"), None);
    assert_eq!(unmap_ipv4("fe80::1"), None);
  }

  #[test]
  fn test_nul_terminated() {
    assert_eq!(nul_terminated(b"10.0.0.1\0\0\0"), "10.0.0.1");
    assert_eq!(nul_terminated(b"::1"), "::1");
  }

  #[test]
  fn test_platform_current() {
    let expected = if cfg!(windows) {
      Platform::Windows
    } else if cfg!(target_os = "linux") {
      Platform::Linux
    } else {
      Platform::MacOs
    };
    assert_eq!(Platform::current(), expected);
    assert_eq!(crate::library().platform(), expected);
  }

  proptest! {
    #[test]
    fn ctl_op_is_none_only_for_noop(from in interest(), to in interest()) {
      prop_assert_eq!(ctl_op(from, to).is_none(), from == to);
    }

    #[test]
    fn ctl_op_add_and_delete_follow_none(from in interest(), to in interest()) {
      match ctl_op(from, to) {
        Some(CtlOp::Add) => prop_assert!(from.is_none() && !to.is_none()),
        Some(CtlOp::Delete) => prop_assert!(!from.is_none() && to.is_none()),
        Some(CtlOp::Modify) => prop_assert!(!from.is_none() && !to.is_none()),
        None => prop_assert_eq!(from, to),
      }
    }

    #[test]
    fn filter_changes_reach_target(from in interest(), to in interest()) {
      let mut state = from;
      for change in filter_changes(from, to).into_iter().flatten() {
        match change {
          FilterChange::Add(r) => {
            prop_assert!(!state.contains(r.interest()));
            state |= r.interest();
          }
          FilterChange::Delete(r) => {
            prop_assert!(state.contains(r.interest()));
            state = state.remove(r.interest());
          }
        }
      }
      prop_assert_eq!(state, to);
    }

    #[test]
    fn noop_needs_no_filter_change(m in interest()) {
      prop_assert_eq!(filter_changes(m, m), [None, None]);
    }
  }
}
