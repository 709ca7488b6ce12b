//! Declared memory layouts for native event records.
//!
//! The kernel writes event records into a flat byte buffer. Rather than
//! overlaying a Rust struct on that buffer, each backend declares the C
//! struct once as a [`MemoryLayout`] and reads fields at the byte offsets it
//! computes. Placement follows the C rules: every member starts at the next
//! multiple of its alignment, every union member starts at `0`, and an
//! aggregate is padded up to its own alignment. Values can be declared
//! unaligned to model `__attribute__((packed))`.

use std::mem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryLayout {
  Value { name: &'static str, size: usize, align: usize },
  Padding { size: usize },
  Struct {
    name: &'static str,
    members: Vec<MemoryLayout>,
    align: Option<usize>,
  },
  Union {
    name: &'static str,
    members: Vec<MemoryLayout>,
    align: Option<usize>,
  },
}

const fn align_up(offset: usize, align: usize) -> usize {
  (offset + align - 1) & !(align - 1)
}

impl MemoryLayout {
  /// A value with the size and natural alignment of `T`.
  pub fn value<T>(name: &'static str) -> Self {
    MemoryLayout::Value {
      name,
      size: mem::size_of::<T>(),
      align: mem::align_of::<T>(),
    }
  }

  /// A native pointer.
  pub fn pointer(name: &'static str) -> Self {
    Self::value::<*const u8>(name)
  }

  pub fn padding(size: usize) -> Self {
    MemoryLayout::Padding { size }
  }

  pub fn structure(name: &'static str, members: Vec<MemoryLayout>) -> Self {
    MemoryLayout::Struct { name, members, align: None }
  }

  pub fn union(name: &'static str, members: Vec<MemoryLayout>) -> Self {
    MemoryLayout::Union { name, members, align: None }
  }

  /// Drops every alignment requirement, recursively.
  pub fn unaligned(self) -> Self {
    match self {
      MemoryLayout::Value { name, size, .. } => {
        MemoryLayout::Value { name, size, align: 1 }
      }
      MemoryLayout::Padding { size } => MemoryLayout::Padding { size },
      MemoryLayout::Struct { name, members, .. } => MemoryLayout::Struct {
        name,
        members: members.into_iter().map(Self::unaligned).collect(),
        align: Some(1),
      },
      MemoryLayout::Union { name, members, .. } => MemoryLayout::Union {
        name,
        members: members.into_iter().map(Self::unaligned).collect(),
        align: Some(1),
      },
    }
  }

  /// Overrides the alignment of this layout. Members are left untouched.
  ///
  /// # Panics
  ///
  /// If `align` is not a power of two.
  pub fn with_alignment(self, align: usize) -> Self {
    assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
    match self {
      MemoryLayout::Value { name, size, .. } => {
        MemoryLayout::Value { name, size, align }
      }
      MemoryLayout::Padding { size } => MemoryLayout::Padding { size },
      MemoryLayout::Struct { name, members, .. } => {
        MemoryLayout::Struct { name, members, align: Some(align) }
      }
      MemoryLayout::Union { name, members, .. } => {
        MemoryLayout::Union { name, members, align: Some(align) }
      }
    }
  }

  pub fn name(&self) -> Option<&'static str> {
    match self {
      MemoryLayout::Value { name, .. }
      | MemoryLayout::Struct { name, .. }
      | MemoryLayout::Union { name, .. } => Some(name),
      MemoryLayout::Padding { .. } => None,
    }
  }

  pub fn byte_alignment(&self) -> usize {
    match self {
      MemoryLayout::Value { align, .. } => *align,
      MemoryLayout::Padding { .. } => 1,
      MemoryLayout::Struct { members, align, .. }
      | MemoryLayout::Union { members, align, .. } => align.unwrap_or_else(|| {
        members.iter().map(Self::byte_alignment).max().unwrap_or(1)
      }),
    }
  }

  pub fn byte_size(&self) -> usize {
    match self {
      MemoryLayout::Value { size, .. } | MemoryLayout::Padding { size } => {
        *size
      }
      MemoryLayout::Struct { members, .. } => {
        let end = members.iter().fold(0, |offset, member| {
          align_up(offset, member.byte_alignment()) + member.byte_size()
        });
        align_up(end, self.byte_alignment())
      }
      MemoryLayout::Union { members, .. } => {
        let widest = members.iter().map(Self::byte_size).max().unwrap_or(0);
        align_up(widest, self.byte_alignment())
      }
    }
  }

  /// Byte offset of the member reached by following `path` through named
  /// struct and union members. An empty path is offset `0`.
  pub fn byte_offset(&self, path: &[&str]) -> Option<usize> {
    let Some((first, rest)) = path.split_first() else {
      return Some(0);
    };
    match self {
      MemoryLayout::Struct { members, .. } => {
        let mut offset = 0;
        for member in members {
          offset = align_up(offset, member.byte_alignment());
          if member.name() == Some(*first) {
            return member.byte_offset(rest).map(|inner| offset + inner);
          }
          offset += member.byte_size();
        }
        None
      }
      MemoryLayout::Union { members, .. } => members
        .iter()
        .find(|member| member.name() == Some(*first))
        .and_then(|member| member.byte_offset(rest)),
      MemoryLayout::Value { .. } | MemoryLayout::Padding { .. } => None,
    }
  }

  /// Like [`byte_offset`](Self::byte_offset) for paths known to exist.
  ///
  /// # Panics
  ///
  /// If `path` names no member.
  pub fn field(&self, path: &[&str]) -> usize {
    match self.byte_offset(path) {
      Some(offset) => offset,
      None => panic!("{:?} has no member {path:?}", self.name()),
    }
  }
}

/// The event records of each backend.
pub mod records {
  use super::MemoryLayout;

  /// `struct epoll_event`. glibc declares it packed on x86_64 only.
  pub fn epoll_event() -> MemoryLayout {
    let layout = MemoryLayout::structure(
      "epoll_event",
      vec![
        MemoryLayout::value::<u32>("events"),
        MemoryLayout::union(
          "data",
          vec![
            MemoryLayout::pointer("ptr"),
            MemoryLayout::value::<i32>("fd"),
            MemoryLayout::value::<u32>("u32"),
            MemoryLayout::value::<u64>("u64"),
          ],
        ),
      ],
    );
    if cfg!(target_arch = "x86_64") { layout.unaligned() } else { layout }
  }

  /// `struct kevent`. FreeBSD appends `uint64_t ext[4]`.
  pub fn kevent() -> MemoryLayout {
    #[allow(unused_mut)]
    let mut members = vec![
      MemoryLayout::value::<u64>("ident"),
      MemoryLayout::value::<i16>("filter"),
      MemoryLayout::value::<u16>("flags"),
      MemoryLayout::value::<u32>("fflags"),
      MemoryLayout::value::<i64>("data"),
      MemoryLayout::pointer("udata"),
    ];
    #[cfg(target_os = "freebsd")]
    {
      let head =
        MemoryLayout::structure("kevent", members.clone()).unaligned();
      members.push(MemoryLayout::padding(
        std::mem::size_of::<libc::kevent>() - head.byte_size(),
      ));
    }
    MemoryLayout::structure("kevent", members).unaligned().with_alignment(4)
  }

  /// wepoll's `struct epoll_event`: naturally aligned, with a `SOCKET` and a
  /// `HANDLE` in the data union.
  pub fn wepoll_event() -> MemoryLayout {
    MemoryLayout::structure(
      "epoll_event",
      vec![
        MemoryLayout::value::<u32>("events"),
        MemoryLayout::padding(4),
        MemoryLayout::union(
          "data",
          vec![
            MemoryLayout::pointer("ptr"),
            MemoryLayout::value::<i32>("fd"),
            MemoryLayout::value::<u32>("u32"),
            MemoryLayout::value::<u64>("u64"),
            MemoryLayout::value::<usize>("sock"),
            MemoryLayout::pointer("hnd"),
          ],
        ),
      ],
    )
  }
}
