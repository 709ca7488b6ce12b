use std::fmt;

use tenet_sys::RawSocket;

/// A native socket handle.
///
/// POSIX descriptors are 32-bit and live in the low half; Windows `SOCKET`
/// values are pointer-width and use all 64 bits. The value carries no
/// ownership: whoever created it closes it exactly once through
/// [`OsNetworkLibrary::close_socket`](crate::OsNetworkLibrary::close_socket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Socket(u64);

impl Socket {
  /// The platform's invalid-handle sentinel.
  pub const INVALID: Socket = Socket::from_raw_socket(tenet_sys::INVALID_SOCKET);

  /// Wraps a 32-bit descriptor.
  pub const fn from_fd(fd: i32) -> Self {
    Socket(fd as u32 as u64)
  }

  /// Wraps a full-width handle.
  pub const fn from_raw(value: u64) -> Self {
    Socket(value)
  }

  #[cfg(unix)]
  pub(crate) const fn from_raw_socket(raw: RawSocket) -> Self {
    Socket::from_fd(raw)
  }

  #[cfg(windows)]
  pub(crate) const fn from_raw_socket(raw: RawSocket) -> Self {
    Socket(raw as u64)
  }

  #[cfg(unix)]
  pub(crate) const fn as_raw(self) -> RawSocket {
    self.int_value()
  }

  #[cfg(windows)]
  pub(crate) const fn as_raw(self) -> RawSocket {
    self.0 as RawSocket
  }

  /// The handle viewed as a 32-bit descriptor.
  pub const fn int_value(self) -> i32 {
    self.0 as u32 as i32
  }

  /// The handle at full width.
  pub const fn long_value(self) -> u64 {
    self.0
  }

  pub const fn is_invalid(self) -> bool {
    self.0 == Self::INVALID.0
  }
}

impl fmt::Display for Socket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if cfg!(windows) {
      write!(f, "{}", self.long_value())
    } else {
      write!(f, "{}", self.int_value())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fd_round_trip() {
    let s = Socket::from_fd(42);
    assert_eq!(s.int_value(), 42);
    assert_eq!(s.long_value(), 42);
  }

  #[test]
  fn test_negative_fd_stays_in_low_half() {
    let s = Socket::from_fd(-1);
    assert_eq!(s.int_value(), -1);
    assert_eq!(s.long_value(), 0xFFFF_FFFF);
  }

  #[test]
  fn test_wide_value_truncates_for_int_view() {
    let s = Socket::from_raw(0x1_0000_0007);
    assert_eq!(s.long_value(), 0x1_0000_0007);
    assert_eq!(s.int_value(), 7);
  }

  #[cfg(unix)]
  #[test]
  fn test_invalid_is_minus_one_on_posix() {
    assert_eq!(Socket::INVALID.int_value(), -1);
    assert!(Socket::from_fd(-1).is_invalid());
    assert!(!Socket::from_fd(0).is_invalid());
  }
}
