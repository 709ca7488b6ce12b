//! Reactor errors.
//!
//! Only genuine failures become an [`Error`]. "Would block" and "interrupted"
//! codes are ordinary values (see [`Transfer`](crate::Transfer) and
//! [`ConnectStatus`](crate::ConnectStatus)).

use std::io;
use thiserror::Error;

use crate::loc::IpType;

/// Errors raised by the reactor.
#[derive(Debug, Error)]
pub enum Error {
  /// A native call failed. `code` is the platform error code read right
  /// after the call returned.
  #[error("failed to {op} with err code : {code}")]
  Os {
    /// The operation that failed.
    op: &'static str,
    /// Platform error code (`errno` or `WSAGetLastError`).
    code: i32,
  },

  /// The address text could not be parsed for its family.
  #[error("{ip_type} address is not valid : {ip}")]
  InvalidAddress {
    /// The family the address was parsed as.
    ip_type: IpType,
    /// The rejected text.
    ip: String,
  },

  /// A configuration value is out of range.
  #[error("invalid config: {0}")]
  InvalidConfig(&'static str),

  /// The kernel handed back a socket address of an unexpected family.
  #[error("unsupported address family : {0}")]
  AddressFamily(u16),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  /// The platform error code, if this error came from a native call.
  pub fn code(&self) -> Option<i32> {
    match self {
      Error::Os { code, .. } => Some(*code),
      _ => None,
    }
  }
}

impl From<Error> for io::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Os { code, .. } => io::Error::from_raw_os_error(code),
      Error::InvalidAddress { .. }
      | Error::InvalidConfig(_)
      | Error::AddressFamily(_) => {
        io::Error::new(io::ErrorKind::InvalidInput, err)
      }
    }
  }
}
