//! Socket calls shared by every POSIX target.

use std::{io, mem, ptr};

use libc::{c_char, c_int, c_void};

pub use libc::{sockaddr, sockaddr_storage, socklen_t};

// The libc crate does not bind the arpa/inet.h conversions.
unsafe extern "C" {
  fn inet_pton(af: c_int, src: *const c_char, dst: *mut c_void) -> c_int;
  fn inet_ntop(
    af: c_int,
    src: *const c_void,
    dst: *mut c_char,
    size: socklen_t,
  ) -> *const c_char;
}

/// Native socket handle. POSIX sockets are plain file descriptors.
pub type RawSocket = c_int;

/// Value `socket(2)` and `accept(2)` return on failure.
pub const INVALID_SOCKET: RawSocket = -1;

pub const AF_INET: u16 = libc::AF_INET as u16;
pub const AF_INET6: u16 = libc::AF_INET6 as u16;

#[cfg(not(target_vendor = "apple"))]
const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;
// Apple has no MSG_NOSIGNAL, SO_NOSIGPIPE is set when the socket is created.
#[cfg(target_vendor = "apple")]
const SEND_FLAGS: c_int = 0;

/// Error code of a non-blocking `connect` that is still in progress.
pub fn connect_block_code() -> i32 {
  libc::EINPROGRESS
}

/// Error code of a `send`/`recv`/`accept` that would block.
pub fn send_block_code() -> i32 {
  libc::EAGAIN
}

/// Error code of a call interrupted by a signal.
pub fn interrupt_code() -> i32 {
  libc::EINTR
}

pub fn ipv4_address_size() -> usize {
  mem::size_of::<libc::sockaddr_in>()
}

pub fn ipv6_address_size() -> usize {
  mem::size_of::<libc::sockaddr_in6>()
}

pub fn ipv4_address_align() -> usize {
  mem::align_of::<libc::sockaddr_in>()
}

pub fn ipv6_address_align() -> usize {
  mem::align_of::<libc::sockaddr_in6>()
}

/// Reads the calling thread's `errno`.
pub fn errno() -> i32 {
  io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn set_int_opt(
  fd: RawSocket,
  level: c_int,
  name: c_int,
  value: c_int,
) -> c_int {
  // SAFETY: `value` lives on the stack for the duration of the call and the
  // length passed matches its type.
  unsafe {
    libc::setsockopt(
      fd,
      level,
      name,
      (&value as *const c_int).cast::<c_void>(),
      mem::size_of::<c_int>() as socklen_t,
    )
  }
}

pub fn set_reuse_addr(fd: RawSocket, value: c_int) -> c_int {
  set_int_opt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, value)
}

pub fn set_keep_alive(fd: RawSocket, value: c_int) -> c_int {
  set_int_opt(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, value)
}

pub fn set_tcp_no_delay(fd: RawSocket, value: c_int) -> c_int {
  set_int_opt(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, value)
}

pub fn set_ipv6_only(fd: RawSocket, value: c_int) -> c_int {
  set_int_opt(fd, libc::IPPROTO_IPV6, libc::IPV6_V6ONLY, value)
}

#[cfg(target_vendor = "apple")]
pub(crate) fn set_no_sigpipe(fd: RawSocket) -> c_int {
  set_int_opt(fd, libc::SOL_SOCKET, libc::SO_NOSIGPIPE, 1)
}

pub fn set_non_blocking(fd: RawSocket) -> c_int {
  // SAFETY: fcntl with F_GETFL/F_SETFL takes no pointer arguments.
  unsafe {
    let flags = libc::fcntl(fd, libc::F_GETFL);
    if flags == -1 {
      return -1;
    }
    libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK)
  }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_cloexec(fd: c_int) -> c_int {
  // SAFETY: fcntl with F_GETFD/F_SETFD takes no pointer arguments.
  unsafe {
    let flags = libc::fcntl(fd, libc::F_GETFD);
    if flags == -1 {
      return -1;
    }
    libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC)
  }
}

/// # Safety
///
/// `addr` must point to `len` readable bytes holding a socket address.
pub unsafe fn bind(
  fd: RawSocket,
  addr: *const sockaddr,
  len: socklen_t,
) -> c_int {
  unsafe { libc::bind(fd, addr, len) }
}

pub fn listen(fd: RawSocket, backlog: c_int) -> c_int {
  // SAFETY: no pointer arguments.
  unsafe { libc::listen(fd, backlog) }
}

/// # Safety
///
/// `addr` must point to `len` readable bytes holding a socket address.
pub unsafe fn connect(
  fd: RawSocket,
  addr: *const sockaddr,
  len: socklen_t,
) -> c_int {
  unsafe { libc::connect(fd, addr, len) }
}

/// # Safety
///
/// `buf` must be valid for writes of `len` bytes.
pub unsafe fn recv(fd: RawSocket, buf: *mut c_void, len: usize) -> isize {
  unsafe { libc::recv(fd, buf, len, 0) }
}

/// # Safety
///
/// `buf` must be valid for reads of `len` bytes.
pub unsafe fn send(fd: RawSocket, buf: *const c_void, len: usize) -> isize {
  unsafe { libc::send(fd, buf, len, SEND_FLAGS) }
}

/// Reads `SO_ERROR` into `out`.
///
/// # Safety
///
/// `out` must be valid for a write of one `c_int`.
pub unsafe fn get_err_opt(fd: RawSocket, out: *mut c_int) -> c_int {
  let mut len = mem::size_of::<c_int>() as socklen_t;
  unsafe {
    libc::getsockopt(
      fd,
      libc::SOL_SOCKET,
      libc::SO_ERROR,
      out.cast::<c_void>(),
      &mut len,
    )
  }
}

/// # Safety
///
/// `addr` must be valid for writes of `*len` bytes and `len` must be valid
/// for reads and writes.
pub unsafe fn get_sock_name(
  fd: RawSocket,
  addr: *mut sockaddr,
  len: *mut socklen_t,
) -> c_int {
  unsafe { libc::getsockname(fd, addr, len) }
}

pub fn shutdown_write(fd: RawSocket) -> c_int {
  // SAFETY: no pointer arguments.
  unsafe { libc::shutdown(fd, libc::SHUT_WR) }
}

pub fn close(fd: c_int) -> c_int {
  // SAFETY: no pointer arguments.
  unsafe { libc::close(fd) }
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
  let sin = addr.cast::<libc::sockaddr_in>();
  unsafe {
    ptr::write_bytes(sin, 0, 1);
    #[cfg(not(target_os = "linux"))]
    {
      (*sin).sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
    }
    (*sin).sin_family = libc::AF_INET as libc::sa_family_t;
    (*sin).sin_port = port.to_be();
    if ip.is_null() {
      (*sin).sin_addr.s_addr = libc::INADDR_ANY.to_be();
      return 1;
    }
    inet_pton(
      libc::AF_INET,
      ip,
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
  let sin6 = addr.cast::<libc::sockaddr_in6>();
  unsafe {
    ptr::write_bytes(sin6, 0, 1);
    #[cfg(not(target_os = "linux"))]
    {
      (*sin6).sin6_len = mem::size_of::<libc::sockaddr_in6>() as u8;
    }
    (*sin6).sin6_family = libc::AF_INET6 as libc::sa_family_t;
    (*sin6).sin6_port = port.to_be();
    if ip.is_null() {
      // in6addr_any is all zeroes, already written above.
      return 1;
    }
    inet_pton(
      libc::AF_INET6,
      ip,
      (&raw mut (*sin6).sin6_addr).cast::<c_void>(),
    )
  }
}

/// # Safety
///
/// `addr` must hold an initialised `sockaddr_in`.
pub unsafe fn ipv4_port(addr: *const sockaddr_storage) -> u16 {
  u16::from_be(unsafe { (*addr.cast::<libc::sockaddr_in>()).sin_port })
}

/// # Safety
///
/// `addr` must hold an initialised `sockaddr_in6`.
pub unsafe fn ipv6_port(addr: *const sockaddr_storage) -> u16 {
  u16::from_be(unsafe { (*addr.cast::<libc::sockaddr_in6>()).sin6_port })
}

/// Writes the textual form of an IPv4 address into `out`.
/// Returns `0` on success and `-1` on error.
///
/// # Safety
///
/// `addr` must hold an initialised `sockaddr_in` and `out` must be valid for
/// writes of `len` bytes.
pub unsafe fn get_ipv4_address(
  addr: *const sockaddr_storage,
  out: *mut c_char,
  len: socklen_t,
) -> c_int {
  let sin = addr.cast::<libc::sockaddr_in>();
  let r = unsafe {
    inet_ntop(
      libc::AF_INET,
      (&raw const (*sin).sin_addr).cast::<c_void>(),
      out,
      len,
    )
  };
  if r.is_null() { -1 } else { 0 }
}

/// Writes the textual form of an IPv6 address into `out`.
/// Returns `0` on success and `-1` on error.
///
/// # Safety
///
/// `addr` must hold an initialised `sockaddr_in6` and `out` must be valid
/// for writes of `len` bytes.
pub unsafe fn get_ipv6_address(
  addr: *const sockaddr_storage,
  out: *mut c_char,
  len: socklen_t,
) -> c_int {
  let sin6 = addr.cast::<libc::sockaddr_in6>();
  let r = unsafe {
    inet_ntop(
      libc::AF_INET6,
      (&raw const (*sin6).sin6_addr).cast::<c_void>(),
      out,
      len,
    )
  };
  if r.is_null() { -1 } else { 0 }
}
