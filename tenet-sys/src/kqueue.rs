//! kqueue and BSD-family socket creation.

use std::ptr;

use libc::{c_int, c_void};

pub use crate::unix::*;

pub const EVFILT_READ: i16 = libc::EVFILT_READ as i16;
pub const EVFILT_WRITE: i16 = libc::EVFILT_WRITE as i16;
pub const EV_ADD: u16 = libc::EV_ADD as u16;
pub const EV_DELETE: u16 = libc::EV_DELETE as u16;

pub use libc::timespec;

/// Creates a close-on-exec kqueue. Returns `-1` on error.
pub fn kqueue() -> c_int {
  // SAFETY: no pointer arguments.
  let kq = unsafe { libc::kqueue() };
  if kq >= 0 && set_cloexec(kq) == -1 {
    close(kq);
    return -1;
  }
  kq
}

/// Submits `nchanges` change records without collecting events.
///
/// # Safety
///
/// `changes` must point to `nchanges` readable `kevent` records.
pub unsafe fn kevent_ctl(
  kq: c_int,
  changes: *const c_void,
  nchanges: c_int,
) -> c_int {
  unsafe {
    libc::kevent(
      kq,
      changes.cast::<libc::kevent>(),
      nchanges,
      ptr::null_mut(),
      0,
      ptr::null(),
    )
  }
}

/// Collects up to `max_events` events. A null `timeout` blocks forever.
///
/// # Safety
///
/// `events` must be valid for writes of `max_events` `kevent` records and
/// `timeout` must be null or point to a readable `timespec`.
pub unsafe fn kevent_wait(
  kq: c_int,
  events: *mut c_void,
  max_events: c_int,
  timeout: *const timespec,
) -> c_int {
  unsafe {
    libc::kevent(
      kq,
      ptr::null(),
      0,
      events.cast::<libc::kevent>(),
      max_events,
      timeout,
    )
  }
}

fn prepare(fd: RawSocket) -> RawSocket {
  if fd == INVALID_SOCKET {
    return fd;
  }
  #[cfg(target_vendor = "apple")]
  let failed = set_cloexec(fd) == -1 || set_no_sigpipe(fd) == -1;
  #[cfg(not(target_vendor = "apple"))]
  let failed = set_cloexec(fd) == -1;
  if failed {
    close(fd);
    return INVALID_SOCKET;
  }
  fd
}

pub fn ipv4_socket_create() -> RawSocket {
  // SAFETY: no pointer arguments.
  prepare(unsafe {
    libc::socket(libc::AF_INET, libc::SOCK_STREAM, libc::IPPROTO_TCP)
  })
}

pub fn ipv6_socket_create() -> RawSocket {
  // SAFETY: no pointer arguments.
  prepare(unsafe {
    libc::socket(libc::AF_INET6, libc::SOCK_STREAM, libc::IPPROTO_TCP)
  })
}

/// Accepts a connection, the new socket is close-on-exec.
///
/// # Safety
///
/// `addr` must be valid for writes of `*len` bytes and `len` must be valid
/// for reads and writes.
pub unsafe fn accept(
  fd: RawSocket,
  addr: *mut sockaddr,
  len: *mut socklen_t,
) -> RawSocket {
  prepare(unsafe { libc::accept(fd, addr, len) })
}
