use std::fmt;

/// A native readiness multiplexer.
///
/// Valid from [`create_mux`](crate::OsNetworkLibrary::create_mux) until
/// [`exit_mux`](crate::OsNetworkLibrary::exit_mux). The wepoll handle is kept
/// as an integer so `Mux` stays `Send + Sync` and can be handed to other
/// threads calling `ctl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mux {
  Epoll(i32),
  Kqueue(i32),
  Wepoll(usize),
}

impl Mux {
  /// The epoll descriptor.
  ///
  /// # Panics
  ///
  /// If this is not an epoll mux; reaching that means the wrong backend was
  /// compiled in.
  pub fn epfd(self) -> i32 {
    match self {
      Mux::Epoll(fd) => fd,
      other => unreachable!("{other} is not an epoll mux"),
    }
  }

  /// The kqueue descriptor. Panics on any other variant.
  pub fn kqfd(self) -> i32 {
    match self {
      Mux::Kqueue(fd) => fd,
      other => unreachable!("{other} is not a kqueue mux"),
    }
  }

  /// The wepoll port handle. Panics on any other variant.
  pub fn win_handle(self) -> usize {
    match self {
      Mux::Wepoll(handle) => handle,
      other => unreachable!("{other} is not a wepoll mux"),
    }
  }
}

impl fmt::Display for Mux {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Mux::Epoll(fd) => write!(f, "epoll({fd})"),
      Mux::Kqueue(fd) => write!(f, "kqueue({fd})"),
      Mux::Wepoll(handle) => write!(f, "wepoll({handle:#x})"),
    }
  }
}
