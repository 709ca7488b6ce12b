use std::fmt;

use crate::Socket;

/// Interest flags a socket is registered for on a [`Mux`](crate::Mux).
///
/// The reactor keeps no registration state: callers track the current
/// interest themselves and hand both the old and the new value to
/// [`ctl`](crate::OsNetworkLibrary::ctl).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interest {
  bits: u8,
}

impl Interest {
  pub const NONE: Self = Self { bits: 0 };
  pub const READ: Self = Self { bits: 1 << 0 };
  pub const WRITE: Self = Self { bits: 1 << 1 };
  pub const READ_AND_WRITE: Self =
    Self { bits: Self::READ.bits | Self::WRITE.bits };

  /// Every interest value, in bit order.
  pub const ALL: [Self; 4] =
    [Self::NONE, Self::READ, Self::WRITE, Self::READ_AND_WRITE];

  pub const fn is_readable(self) -> bool {
    self.bits & Self::READ.bits != 0
  }

  pub const fn is_writable(self) -> bool {
    self.bits & Self::WRITE.bits != 0
  }

  pub const fn is_none(self) -> bool {
    self.bits == 0
  }

  /// Combine interests using bitwise OR
  pub const fn or(self, other: Self) -> Self {
    Self { bits: self.bits | other.bits }
  }

  /// Remove every bit of `other`
  pub const fn remove(self, other: Self) -> Self {
    Self { bits: self.bits & !other.bits }
  }

  /// Check if this interest contains all bits from another
  pub const fn contains(self, other: Self) -> bool {
    (self.bits & other.bits) == other.bits
  }
}

impl std::ops::BitOr for Interest {
  type Output = Self;

  fn bitor(self, rhs: Self) -> Self::Output {
    self.or(rhs)
  }
}

impl std::ops::BitOrAssign for Interest {
  fn bitor_assign(&mut self, rhs: Self) {
    *self = self.or(rhs);
  }
}

impl fmt::Display for Interest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match *self {
      Self::NONE => "NONE",
      Self::READ => "R",
      Self::WRITE => "W",
      _ => "R|W",
    };
    f.write_str(name)
  }
}

/// The readiness class one event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Readiness {
  Read,
  Write,
  /// Error or hangup that wepoll reports apart from read readiness.
  Other,
}

impl Readiness {
  /// The interest bit this readiness answers, `NONE` for `Other`.
  pub const fn interest(self) -> Interest {
    match self {
      Readiness::Read => Interest::READ,
      Readiness::Write => Interest::WRITE,
      Readiness::Other => Interest::NONE,
    }
  }
}

/// One `(socket, readiness)` pair pulled out of an event buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxEvent {
  pub socket: Socket,
  pub readiness: Readiness,
}

impl MuxEvent {
  pub const fn new(socket: Socket, readiness: Readiness) -> Self {
    Self { socket, readiness }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_flags() {
    assert!(Interest::NONE.is_none());
    assert!(Interest::READ.is_readable() && !Interest::READ.is_writable());
    assert!(Interest::WRITE.is_writable() && !Interest::WRITE.is_readable());
    assert_eq!(Interest::READ | Interest::WRITE, Interest::READ_AND_WRITE);
    assert!(Interest::READ_AND_WRITE.contains(Interest::WRITE));
    assert_eq!(Interest::READ_AND_WRITE.remove(Interest::READ), Interest::WRITE);
  }

  #[test]
  fn test_display() {
    let names: Vec<String> =
      Interest::ALL.iter().map(|i| i.to_string()).collect();
    assert_eq!(names, ["NONE", "R", "W", "R|W"]);
  }
}
