use std::mem;

use tenet_sys::{sockaddr, sockaddr_storage, socklen_t};

/// A native socket address buffer.
///
/// Backed by a `sockaddr_storage`, which is large and aligned enough for
/// either family, while `len` is the exact size the binding layer reports for
/// the family in use. The kernel sees only the first `len` bytes.
#[derive(Clone, Copy)]
pub struct SockAddr {
  storage: sockaddr_storage,
  len: socklen_t,
}

impl SockAddr {
  /// A zeroed buffer exposing `len` bytes to the kernel.
  ///
  /// # Panics
  ///
  /// If `len` or `align` exceed what `sockaddr_storage` provides.
  pub fn zeroed(len: usize, align: usize) -> Self {
    assert!(
      len <= mem::size_of::<sockaddr_storage>()
        && align <= mem::align_of::<sockaddr_storage>(),
      "socket address of {len} bytes aligned to {align} does not fit storage"
    );
    Self {
      // SAFETY: sockaddr_storage is plain old data, all-zero is valid.
      storage: unsafe { mem::zeroed() },
      len: len as socklen_t,
    }
  }

  /// A zeroed buffer exposing the whole storage, for calls that report the
  /// family they filled in.
  pub fn any() -> Self {
    Self::zeroed(
      mem::size_of::<sockaddr_storage>(),
      mem::align_of::<sockaddr_storage>(),
    )
  }

  pub fn len(&self) -> usize {
    self.len as usize
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// The `sa_family` the buffer currently holds.
  pub fn family(&self) -> u16 {
    self.storage.ss_family as u16
  }

  pub(crate) fn as_ptr(&self) -> *const sockaddr {
    (&raw const self.storage).cast()
  }

  pub(crate) fn as_mut_ptr(&mut self) -> *mut sockaddr {
    (&raw mut self.storage).cast()
  }

  pub(crate) fn storage_ptr(&self) -> *const sockaddr_storage {
    &raw const self.storage
  }

  pub(crate) fn storage_mut_ptr(&mut self) -> *mut sockaddr_storage {
    &raw mut self.storage
  }

  pub(crate) fn raw_len(&self) -> socklen_t {
    self.len
  }

  pub(crate) fn raw_len_mut(&mut self) -> *mut socklen_t {
    &raw mut self.len
  }
}

impl std::fmt::Debug for SockAddr {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SockAddr")
      .field("family", &self.family())
      .field("len", &self.len)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zeroed() {
    let addr = SockAddr::zeroed(tenet_sys::ipv4_address_size(), 4);
    assert_eq!(addr.len(), tenet_sys::ipv4_address_size());
    assert_eq!(addr.family(), 0);
    assert!(!addr.is_empty());
  }

  #[test]
  #[should_panic(expected = "does not fit storage")]
  fn test_oversized_rejected() {
    SockAddr::zeroed(4096, 1);
  }
}
