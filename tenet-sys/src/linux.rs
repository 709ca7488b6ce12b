//! epoll and Linux socket creation.

use libc::{c_int, c_void};

pub use crate::unix::*;

pub const EPOLL_CTL_ADD: c_int = libc::EPOLL_CTL_ADD;
pub const EPOLL_CTL_DEL: c_int = libc::EPOLL_CTL_DEL;
pub const EPOLL_CTL_MOD: c_int = libc::EPOLL_CTL_MOD;

pub const EPOLLIN: u32 = libc::EPOLLIN as u32;
pub const EPOLLOUT: u32 = libc::EPOLLOUT as u32;
pub const EPOLLERR: u32 = libc::EPOLLERR as u32;
pub const EPOLLHUP: u32 = libc::EPOLLHUP as u32;
pub const EPOLLRDHUP: u32 = libc::EPOLLRDHUP as u32;

/// Creates a close-on-exec epoll instance. Returns `-1` on error.
pub fn epoll_create() -> c_int {
  // SAFETY: no pointer arguments.
  unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) }
}

/// # Safety
///
/// `event` must point to one readable `epoll_event` record, or be null for
/// `EPOLL_CTL_DEL`.
pub unsafe fn epoll_ctl(
  epfd: c_int,
  op: c_int,
  fd: RawSocket,
  event: *mut c_void,
) -> c_int {
  unsafe { libc::epoll_ctl(epfd, op, fd, event.cast::<libc::epoll_event>()) }
}

/// # Safety
///
/// `events` must be valid for writes of `max_events` `epoll_event` records.
pub unsafe fn epoll_wait(
  epfd: c_int,
  events: *mut c_void,
  max_events: c_int,
  timeout: c_int,
) -> c_int {
  unsafe {
    libc::epoll_wait(
      epfd,
      events.cast::<libc::epoll_event>(),
      max_events,
      timeout,
    )
  }
}

pub fn ipv4_socket_create() -> RawSocket {
  // SAFETY: no pointer arguments.
  unsafe {
    libc::socket(
      libc::AF_INET,
      libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
      libc::IPPROTO_TCP,
    )
  }
}

pub fn ipv6_socket_create() -> RawSocket {
  // SAFETY: no pointer arguments.
  unsafe {
    libc::socket(
      libc::AF_INET6,
      libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
      libc::IPPROTO_TCP,
    )
  }
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
  unsafe { libc::accept4(fd, addr, len, libc::SOCK_CLOEXEC) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::mem;

  #[test]
  fn test_epoll_create_close() {
    let epfd = epoll_create();
    assert!(epfd >= 0);
    assert_eq!(close(epfd), 0);
  }

  #[test]
  fn test_epoll_opcodes() {
    assert_eq!(EPOLL_CTL_ADD, 1);
    assert_eq!(EPOLL_CTL_DEL, 2);
    assert_eq!(EPOLL_CTL_MOD, 3);
  }

  #[test]
  fn test_ctl_and_empty_wait() {
    let epfd = epoll_create();
    let fd = ipv4_socket_create();
    assert!(fd >= 0);

    let mut ev = libc::epoll_event { events: EPOLLIN, u64: fd as u64 };
    let r = unsafe {
      epoll_ctl(epfd, EPOLL_CTL_ADD, fd, (&raw mut ev).cast::<c_void>())
    };
    assert_eq!(r, 0);

    let mut out: [libc::epoll_event; 4] = unsafe { mem::zeroed() };
    let n = unsafe { epoll_wait(epfd, out.as_mut_ptr().cast(), 4, 0) };
    assert!(n >= 0);

    let r = unsafe {
      epoll_ctl(epfd, EPOLL_CTL_DEL, fd, std::ptr::null_mut())
    };
    assert_eq!(r, 0);
    close(fd);
    close(epfd);
  }
}
