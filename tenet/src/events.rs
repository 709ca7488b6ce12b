use std::ffi::c_void;
use std::mem;

use crate::layout::MemoryLayout;

/// A zeroed native region holding `capacity` event records.
///
/// The storage is a boxed `u64` slice so the region is 8-byte aligned for
/// every record layout the backends declare. Fields are read and written
/// at byte offsets in native endianness without assuming any alignment.
pub struct EventBuffer {
  words: Box<[u64]>,
  capacity: usize,
  record_size: usize,
}

macro_rules! field_accessors {
  ($($get:ident, $set:ident => $ty:ty;)*) => {
    $(
      #[doc = concat!("Reads a native-endian `", stringify!($ty), "` at `offset`.")]
      pub fn $get(&self, offset: usize) -> $ty {
        let mut raw = [0u8; mem::size_of::<$ty>()];
        raw.copy_from_slice(
          &self.as_bytes()[offset..offset + mem::size_of::<$ty>()],
        );
        <$ty>::from_ne_bytes(raw)
      }

      #[doc = concat!("Writes a native-endian `", stringify!($ty), "` at `offset`.")]
      pub fn $set(&mut self, offset: usize, value: $ty) {
        self.as_bytes_mut()[offset..offset + mem::size_of::<$ty>()]
          .copy_from_slice(&value.to_ne_bytes());
      }
    )*
  };
}

impl EventBuffer {
  pub fn new(capacity: usize, record_size: usize) -> Self {
    let bytes = capacity * record_size;
    let words = vec![0u64; bytes.div_ceil(8).max(1)].into_boxed_slice();
    Self { words, capacity, record_size }
  }

  /// A buffer of `capacity` records shaped by `layout`.
  pub fn for_layout(layout: &MemoryLayout, capacity: usize) -> Self {
    Self::new(capacity, layout.byte_size())
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn record_size(&self) -> usize {
    self.record_size
  }

  /// Byte offset of record `index`.
  ///
  /// # Panics
  ///
  /// If `index` is out of bounds.
  pub fn record_offset(&self, index: usize) -> usize {
    assert!(
      index < self.capacity,
      "event index {index} out of bounds for {} records",
      self.capacity
    );
    index * self.record_size
  }

  pub fn as_bytes(&self) -> &[u8] {
    // SAFETY: the words cover at least `capacity * record_size` bytes and u8
    // has no alignment requirement.
    unsafe {
      std::slice::from_raw_parts(
        self.words.as_ptr().cast::<u8>(),
        self.capacity * self.record_size,
      )
    }
  }

  pub fn as_bytes_mut(&mut self) -> &mut [u8] {
    // SAFETY: see `as_bytes`, and `&mut self` guarantees exclusive access.
    unsafe {
      std::slice::from_raw_parts_mut(
        self.words.as_mut_ptr().cast::<u8>(),
        self.capacity * self.record_size,
      )
    }
  }

  pub fn as_ptr(&self) -> *const c_void {
    self.words.as_ptr().cast()
  }

  pub fn as_mut_ptr(&mut self) -> *mut c_void {
    self.words.as_mut_ptr().cast()
  }

  /// Zeroes every record.
  pub fn clear(&mut self) {
    self.words.fill(0);
  }

  field_accessors! {
    get_u16, set_u16 => u16;
    get_i16, set_i16 => i16;
    get_u32, set_u32 => u32;
    get_i32, set_i32 => i32;
    get_u64, set_u64 => u64;
    get_i64, set_i64 => i64;
    get_usize, set_usize => usize;
  }
}

impl std::fmt::Debug for EventBuffer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EventBuffer")
      .field("capacity", &self.capacity)
      .field("record_size", &self.record_size)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_region_is_zeroed_and_aligned() {
    let buf = EventBuffer::new(3, 12);
    assert_eq!(buf.as_bytes().len(), 36);
    assert!(buf.as_bytes().iter().all(|b| *b == 0));
    assert_eq!(buf.as_ptr() as usize % 8, 0);
  }

  #[test]
  fn test_unaligned_fields() {
    let mut buf = EventBuffer::new(2, 12);
    let base = buf.record_offset(1);
    buf.set_u32(base, 0xdead_beef);
    buf.set_i32(base + 4, -5);
    assert_eq!(buf.get_u32(base), 0xdead_beef);
    assert_eq!(buf.get_i32(base + 4), -5);
    buf.set_i16(base + 8, -2);
    assert_eq!(buf.get_u16(base + 8), 0xfffe);

    buf.clear();
    assert_eq!(buf.get_u32(base), 0);
  }

  #[test]
  #[should_panic(expected = "out of bounds")]
  fn test_record_offset_bounds() {
    EventBuffer::new(2, 16).record_offset(2);
  }

  #[test]
  fn test_zero_capacity() {
    let buf = EventBuffer::new(0, 16);
    assert!(buf.as_bytes().is_empty());
  }
}
