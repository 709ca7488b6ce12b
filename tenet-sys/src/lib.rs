//! # tenet-sys
//!
//! Raw bindings to the socket and readiness-multiplexing calls of each
//! supported operating system. Exactly one backend is compiled in:
//!
//! | Platform          | Multiplexer | Module    |
//! |-------------------|-------------|-----------|
//! | Linux             | epoll       | `linux`   |
//! | macOS / BSD       | kqueue      | `kqueue`  |
//! | Windows           | wepoll      | `windows` |
//!
//! Every function returns the raw OS status (`-1`, `INVALID_SOCKET`, a null
//! handle, ...) and leaves interpretation to the caller. Error codes are read
//! through [`errno`] and the "would block" / "interrupted" codes are exposed
//! as functions ([`connect_block_code`], [`send_block_code`],
//! [`interrupt_code`]) because their values differ per platform and libc.
//!
//! Functions taking raw pointers are `unsafe`; the pointed-to memory must be
//! valid for the size the function documents.

#![allow(non_camel_case_types)]

#[cfg(unix)]
mod unix;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::*;

#[cfg(any(
  target_vendor = "apple",
  target_os = "freebsd",
  target_os = "dragonfly",
  target_os = "openbsd",
))]
mod kqueue;
#[cfg(any(
  target_vendor = "apple",
  target_os = "freebsd",
  target_os = "dragonfly",
  target_os = "openbsd",
))]
pub use kqueue::*;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::*;

#[cfg(not(any(
  target_os = "linux",
  target_vendor = "apple",
  target_os = "freebsd",
  target_os = "dragonfly",
  target_os = "openbsd",
  windows,
)))]
compile_error!("tenet-sys does not support this target OS");

/// Length of the longest textual IPv4 address including the nul byte.
pub const INET_ADDRSTRLEN: usize = 16;
/// Length of the longest textual IPv6 address including the nul byte.
pub const INET6_ADDRSTRLEN: usize = 46;

/// Returns the maximum textual length of an IPv4 address, nul included.
pub fn ipv4_address_len() -> usize {
  INET_ADDRSTRLEN
}

/// Returns the maximum textual length of an IPv6 address, nul included.
pub fn ipv6_address_len() -> usize {
  INET6_ADDRSTRLEN
}
