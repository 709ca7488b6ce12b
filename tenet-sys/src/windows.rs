//! Winsock sockets plus the wepoll epoll emulation.
//!
//! wepoll exposes an epoll-shaped API on top of AFD polling. Its opcodes
//! and flag bits match Linux for `EPOLLIN`/`EPOLLOUT`/`EPOLLERR`/`EPOLLHUP`
//! but `EPOLL_CTL_MOD` and `EPOLL_CTL_DEL` are swapped.

use std::ffi::{c_char, c_int, c_void};
use std::{mem, ptr};

use windows_sys::Win32::Networking::WinSock as ws;

pub type RawSocket = ws::SOCKET;
pub const INVALID_SOCKET: RawSocket = ws::INVALID_SOCKET;

pub const AF_INET: u16 = ws::AF_INET as u16;
pub const AF_INET6: u16 = ws::AF_INET6 as u16;

pub type sockaddr = ws::SOCKADDR;
pub type sockaddr_storage = ws::SOCKADDR_STORAGE;
pub type socklen_t = c_int;

/// wepoll port handle, null on failure.
pub type Handle = *mut c_void;

pub const EPOLLIN: u32 = 1 << 0;
pub const EPOLLOUT: u32 = 1 << 2;
pub const EPOLLERR: u32 = 1 << 3;
pub const EPOLLHUP: u32 = 1 << 4;
pub const EPOLLRDHUP: u32 = 1 << 13;

pub const EPOLL_CTL_ADD: c_int = 1;
pub const EPOLL_CTL_MOD: c_int = 2;
pub const EPOLL_CTL_DEL: c_int = 3;

/// Initialises Winsock 2.2. Returns `0` on success.
pub fn wsa_startup() -> c_int {
  // SAFETY: WSADATA is plain data, WSAStartup fills it.
  unsafe {
    let mut data: ws::WSADATA = mem::zeroed();
    ws::WSAStartup(0x0202, &mut data)
  }
}

pub fn wsa_cleanup() -> c_int {
  // SAFETY: no pointer arguments.
  unsafe { ws::WSACleanup() }
}

pub fn connect_block_code() -> i32 {
  ws::WSAEWOULDBLOCK
}

pub fn send_block_code() -> i32 {
  ws::WSAEWOULDBLOCK
}

pub fn interrupt_code() -> i32 {
  ws::WSAEINTR
}

pub fn ipv4_address_size() -> usize {
  mem::size_of::<ws::SOCKADDR_IN>()
}

pub fn ipv6_address_size() -> usize {
  mem::size_of::<ws::SOCKADDR_IN6>()
}

pub fn ipv4_address_align() -> usize {
  mem::align_of::<ws::SOCKADDR_IN>()
}

pub fn ipv6_address_align() -> usize {
  mem::align_of::<ws::SOCKADDR_IN6>()
}

/// Reads the calling thread's last Winsock error.
pub fn errno() -> i32 {
  // SAFETY: no pointer arguments.
  unsafe { ws::WSAGetLastError() }
}

pub fn epoll_create() -> Handle {
  // SAFETY: no pointer arguments.
  unsafe { wepoll_ffi::epoll_create1(0).cast() }
}

pub fn epoll_close(port: Handle) -> c_int {
  // SAFETY: wepoll validates the handle itself.
  unsafe { wepoll_ffi::epoll_close(port.cast()) }
}

/// # Safety
///
/// `event` must point to one readable `epoll_event` record, or be null for
/// `EPOLL_CTL_DEL`.
pub unsafe fn epoll_ctl(
  port: Handle,
  op: c_int,
  sock: RawSocket,
  event: *mut c_void,
) -> c_int {
  unsafe { wepoll_ffi::epoll_ctl(port.cast(), op, sock as _, event.cast()) }
}

/// # Safety
///
/// `events` must be valid for writes of `max_events` `epoll_event` records.
pub unsafe fn epoll_wait(
  port: Handle,
  events: *mut c_void,
  max_events: c_int,
  timeout: c_int,
) -> c_int {
  unsafe {
    wepoll_ffi::epoll_wait(port.cast(), events.cast(), max_events, timeout)
  }
}

pub fn ipv4_socket_create() -> RawSocket {
  // SAFETY: no pointer arguments.
  unsafe {
    ws::socket(ws::AF_INET as _, ws::SOCK_STREAM as _, ws::IPPROTO_TCP as _)
  }
}

pub fn ipv6_socket_create() -> RawSocket {
  // SAFETY: no pointer arguments.
  unsafe {
    ws::socket(ws::AF_INET6 as _, ws::SOCK_STREAM as _, ws::IPPROTO_TCP as _)
  }
}

fn set_int_opt(
  sock: RawSocket,
  level: c_int,
  name: c_int,
  value: c_int,
) -> c_int {
  // SAFETY: `value` outlives the call and the length matches its type.
  unsafe {
    ws::setsockopt(
      sock,
      level,
      name,
      (&value as *const c_int).cast(),
      mem::size_of::<c_int>() as c_int,
    )
  }
}

pub fn set_reuse_addr(sock: RawSocket, value: c_int) -> c_int {
  set_int_opt(sock, ws::SOL_SOCKET as _, ws::SO_REUSEADDR as _, value)
}

pub fn set_keep_alive(sock: RawSocket, value: c_int) -> c_int {
  set_int_opt(sock, ws::SOL_SOCKET as _, ws::SO_KEEPALIVE as _, value)
}

pub fn set_tcp_no_delay(sock: RawSocket, value: c_int) -> c_int {
  set_int_opt(sock, ws::IPPROTO_TCP as _, ws::TCP_NODELAY as _, value)
}

pub fn set_ipv6_only(sock: RawSocket, value: c_int) -> c_int {
  set_int_opt(sock, ws::IPPROTO_IPV6 as _, ws::IPV6_V6ONLY as _, value)
}

pub fn set_non_blocking(sock: RawSocket) -> c_int {
  let mut mode: u32 = 1;
  // SAFETY: `mode` outlives the call.
  unsafe { ws::ioctlsocket(sock, ws::FIONBIO as _, &mut mode) }
}

/// # Safety
///
/// `addr` must point to `len` readable bytes holding a socket address.
pub unsafe fn bind(
  sock: RawSocket,
  addr: *const sockaddr,
  len: socklen_t,
) -> c_int {
  unsafe { ws::bind(sock, addr, len) }
}

pub fn listen(sock: RawSocket, backlog: c_int) -> c_int {
  // SAFETY: no pointer arguments.
  unsafe { ws::listen(sock, backlog) }
}

/// # Safety
///
/// `addr` must point to `len` readable bytes holding a socket address.
pub unsafe fn connect(
  sock: RawSocket,
  addr: *const sockaddr,
  len: socklen_t,
) -> c_int {
  unsafe { ws::connect(sock, addr, len) }
}

/// # Safety
///
/// `addr` must be valid for writes of `*len` bytes and `len` must be valid
/// for reads and writes.
pub unsafe fn accept(
  sock: RawSocket,
  addr: *mut sockaddr,
  len: *mut socklen_t,
) -> RawSocket {
  unsafe { ws::accept(sock, addr, len) }
}

/// # Safety
///
/// `buf` must be valid for writes of `len` bytes.
pub unsafe fn recv(sock: RawSocket, buf: *mut c_void, len: usize) -> isize {
  let len = len.min(c_int::MAX as usize) as c_int;
  unsafe { ws::recv(sock, buf.cast(), len, 0) as isize }
}

/// # Safety
///
/// `buf` must be valid for reads of `len` bytes.
pub unsafe fn send(sock: RawSocket, buf: *const c_void, len: usize) -> isize {
  let len = len.min(c_int::MAX as usize) as c_int;
  unsafe { ws::send(sock, buf.cast(), len, 0) as isize }
}

/// Reads `SO_ERROR` into `out`.
///
/// # Safety
///
/// `out` must be valid for a write of one `c_int`.
pub unsafe fn get_err_opt(sock: RawSocket, out: *mut c_int) -> c_int {
  let mut len = mem::size_of::<c_int>() as c_int;
  unsafe {
    ws::getsockopt(
      sock,
      ws::SOL_SOCKET as _,
      ws::SO_ERROR as _,
      out.cast(),
      &mut len,
    )
  }
}

/// # Safety
///
/// `addr` must be valid for writes of `*len` bytes and `len` must be valid
/// for reads and writes.
pub unsafe fn get_sock_name(
  sock: RawSocket,
  addr: *mut sockaddr,
  len: *mut socklen_t,
) -> c_int {
  unsafe { ws::getsockname(sock, addr, len) }
}

pub fn shutdown_write(sock: RawSocket) -> c_int {
  // SAFETY: no pointer arguments.
  unsafe { ws::shutdown(sock, ws::SD_SEND as _) }
}

pub fn close(sock: RawSocket) -> c_int {
  // SAFETY: no pointer arguments.
  unsafe { ws::closesocket(sock) }
}

/// Fills `addr` as an IPv4 address. A null `ip` selects the wildcard
/// address. Returns `1` on success, `0` if `ip` is not a valid address and
/// `-1` on error.
///
/// # Safety
///
/// `addr` must be valid for writes of [`ipv4_address_size`] bytes and `ip`
/// must be null or a nul-terminated string.
pub unsafe fn set_ipv4_sock_addr(
  addr: *mut sockaddr_storage,
  ip: *const c_char,
  port: u16,
) -> c_int {
  let sin = addr.cast::<ws::SOCKADDR_IN>();
  unsafe {
    ptr::write_bytes(sin, 0, 1);
    (*sin).sin_family = ws::AF_INET as _;
    (*sin).sin_port = port.to_be();
    if ip.is_null() {
      return 1;
    }
    ws::inet_pton(
      ws::AF_INET as _,
      ip.cast(),
      (&raw mut (*sin).sin_addr).cast::<c_void>(),
    )
  }
}

/// Fills `addr` as an IPv6 address. A null `ip` selects the wildcard
/// address. Returns `1` on success, `0` if `ip` is not a valid address and
/// `-1` on error.
///
/// # Safety
///
/// `addr` must be valid for writes of [`ipv6_address_size`] bytes and `ip`
/// must be null or a nul-terminated string.
pub unsafe fn set_ipv6_sock_addr(
  addr: *mut sockaddr_storage,
  ip: *const c_char,
  port: u16,
) -> c_int {
  let sin6 = addr.cast::<ws::SOCKADDR_IN6>();
  unsafe {
    ptr::write_bytes(sin6, 0, 1);
    (*sin6).sin6_family = ws::AF_INET6 as _;
    (*sin6).sin6_port = port.to_be();
    if ip.is_null() {
      return 1;
    }
    ws::inet_pton(
      ws::AF_INET6 as _,
      ip.cast(),
      (&raw mut (*sin6).sin6_addr).cast::<c_void>(),
    )
  }
}

/// # Safety
///
/// `addr` must hold an initialised `SOCKADDR_IN`.
pub unsafe fn ipv4_port(addr: *const sockaddr_storage) -> u16 {
  u16::from_be(unsafe { (*addr.cast::<ws::SOCKADDR_IN>()).sin_port })
}

/// # Safety
///
/// `addr` must hold an initialised `SOCKADDR_IN6`.
pub unsafe fn ipv6_port(addr: *const sockaddr_storage) -> u16 {
  u16::from_be(unsafe { (*addr.cast::<ws::SOCKADDR_IN6>()).sin6_port })
}

/// Returns `0` on success and `-1` on error.
///
/// # Safety
///
/// `addr` must hold an initialised `SOCKADDR_IN` and `out` must be valid for
/// writes of `len` bytes.
pub unsafe fn get_ipv4_address(
  addr: *const sockaddr_storage,
  out: *mut c_char,
  len: socklen_t,
) -> c_int {
  let sin = addr.cast::<ws::SOCKADDR_IN>();
  let r = unsafe {
    ws::inet_ntop(
      ws::AF_INET as _,
      (&raw const (*sin).sin_addr).cast::<c_void>(),
      out.cast(),
      len as usize,
    )
  };
  if r.is_null() { -1 } else { 0 }
}

/// Returns `0` on success and `-1` on error.
///
/// # Safety
///
/// `addr` must hold an initialised `SOCKADDR_IN6` and `out` must be valid
/// for writes of `len` bytes.
pub unsafe fn get_ipv6_address(
  addr: *const sockaddr_storage,
  out: *mut c_char,
  len: socklen_t,
) -> c_int {
  let sin6 = addr.cast::<ws::SOCKADDR_IN6>();
  let r = unsafe {
    ws::inet_ntop(
      ws::AF_INET6 as _,
      (&raw const (*sin6).sin6_addr).cast::<c_void>(),
      out.cast(),
      len as usize,
    )
  };
  if r.is_null() { -1 } else { 0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_wepoll_opcodes_differ_from_linux() {
    assert_eq!(EPOLL_CTL_ADD, 1);
    assert_eq!(EPOLL_CTL_MOD, 2);
    assert_eq!(EPOLL_CTL_DEL, 3);
  }

  #[test]
  fn test_port_create_close() {
    assert_eq!(wsa_startup(), 0);
    let port = epoll_create();
    assert!(!port.is_null());
    assert_eq!(epoll_close(port), 0);
    wsa_cleanup();
  }

  #[test]
  fn test_port_ctl_add_and_delete() {
    assert_eq!(wsa_startup(), 0);
    let port = epoll_create();
    let sock = ipv4_socket_create();
    assert_ne!(sock, INVALID_SOCKET);

    // events, 4 bytes padding, then the data union.
    let mut record = [0u64; 2];
    record[0] = EPOLLIN as u64;
    record[1] = sock as u64;
    let r = unsafe {
      epoll_ctl(port, EPOLL_CTL_ADD, sock, record.as_mut_ptr().cast())
    };
    assert_eq!(r, 0);
    let r = unsafe { epoll_ctl(port, EPOLL_CTL_DEL, sock, ptr::null_mut()) };
    assert_eq!(r, 0);

    let mut events = [0u64; 4];
    let n = unsafe { epoll_wait(port, events.as_mut_ptr().cast(), 2, 0) };
    assert_eq!(n, 0);

    assert_eq!(close(sock), 0);
    assert_eq!(epoll_close(port), 0);
    wsa_cleanup();
  }
}
