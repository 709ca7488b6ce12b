use std::ptr;
use std::sync::LazyLock;

use tracing::debug;

use super::{FilterChange, OsNetworkLibrary, Platform, filter_changes};
use crate::error::Result;
use crate::events::EventBuffer;
use crate::interest::{Interest, MuxEvent, Readiness};
use crate::layout::{MemoryLayout, records};
use crate::mux::Mux;
use crate::socket::Socket;
use crate::timeout::{Timeout, timeout_to_timespec};

static KEVENT: LazyLock<MemoryLayout> = LazyLock::new(records::kevent);

struct Offsets {
  ident: usize,
  filter: usize,
  flags: usize,
}

static OFFSETS: LazyLock<Offsets> = LazyLock::new(|| Offsets {
  ident: KEVENT.field(&["ident"]),
  filter: KEVENT.field(&["filter"]),
  flags: KEVENT.field(&["flags"]),
});

fn filter_of(readiness: Readiness) -> i16 {
  match readiness {
    Readiness::Read => tenet_sys::EVFILT_READ,
    Readiness::Write => tenet_sys::EVFILT_WRITE,
    Readiness::Other => unreachable!("kqueue has no filter for {readiness:?}"),
  }
}

/// macOS and BSD backend over kqueue.
///
/// Read and write interest map to two independent filters, so one `ctl`
/// may submit two changes in a single `kevent` call.
#[derive(Debug, Default)]
pub struct KqueueLibrary {
  _priv: (),
}

impl KqueueLibrary {
  pub fn new() -> Self {
    Self::default()
  }
}

impl OsNetworkLibrary for KqueueLibrary {
  impl_socket_calls!();

  fn platform(&self) -> Platform {
    Platform::MacOs
  }

  fn event_layout(&self) -> &'static MemoryLayout {
    &KEVENT
  }

  fn create_mux(&self) -> Result<Mux> {
    let kq = self.check(tenet_sys::kqueue(), "create kqueue")?;
    debug!(kq, "kqueue created");
    Ok(Mux::Kqueue(kq))
  }

  fn ctl(
    &self,
    mux: Mux,
    socket: Socket,
    from: Interest,
    to: Interest,
  ) -> i32 {
    let mut changes = self.new_event_buffer(2);
    let mut count = 0;
    for change in filter_changes(from, to).into_iter().flatten() {
      let (readiness, flags) = match change {
        FilterChange::Add(r) => (r, tenet_sys::EV_ADD),
        FilterChange::Delete(r) => (r, tenet_sys::EV_DELETE),
      };
      let base = changes.record_offset(count);
      changes.set_u64(base + OFFSETS.ident, socket.int_value() as u64);
      changes.set_i16(base + OFFSETS.filter, filter_of(readiness));
      changes.set_u16(base + OFFSETS.flags, flags);
      count += 1;
    }
    if count == 0 {
      return 0;
    }
    // SAFETY: `changes` holds `count` initialised kevent records.
    unsafe { tenet_sys::kevent_ctl(mux.kqfd(), changes.as_ptr(), count as i32) }
  }

  fn mux_wait(
    &self,
    mux: Mux,
    events: &mut EventBuffer,
    max_events: usize,
    timeout: Timeout,
  ) -> i32 {
    assert!(max_events <= events.capacity(), "max events exceeds the buffer");
    debug_assert_eq!(events.record_size(), KEVENT.byte_size());
    let ts = timeout_to_timespec(timeout);
    let ts_ptr = ts.as_ref().map_or(ptr::null(), |ts| ts as *const _);
    // SAFETY: the buffer holds at least `max_events` records and `ts` lives
    // until the call returns.
    unsafe {
      tenet_sys::kevent_wait(
        mux.kqfd(),
        events.as_mut_ptr(),
        max_events as i32,
        ts_ptr,
      )
    }
  }

  fn access(&self, events: &EventBuffer, index: usize) -> MuxEvent {
    let base = events.record_offset(index);
    let ident = events.get_u64(base + OFFSETS.ident);
    let filter = events.get_i16(base + OFFSETS.filter);
    let readiness = match filter {
      tenet_sys::EVFILT_READ => Readiness::Read,
      tenet_sys::EVFILT_WRITE => Readiness::Write,
      other => unreachable!("kqueue reported filter {other} for ident {ident}"),
    };
    MuxEvent::new(Socket::from_fd(ident as i32), readiness)
  }

  fn close_mux(&self, mux: Mux) -> i32 {
    tenet_sys::close(mux.kqfd())
  }

  fn exit(&self) {}
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_access_filters() {
    let lib = KqueueLibrary::new();
    let mut buf = lib.new_event_buffer(2);
    let second = buf.record_offset(1);
    buf.set_u64(OFFSETS.ident, 5);
    buf.set_i16(OFFSETS.filter, tenet_sys::EVFILT_READ);
    buf.set_u64(second + OFFSETS.ident, 6);
    buf.set_i16(second + OFFSETS.filter, tenet_sys::EVFILT_WRITE);

    assert_eq!(
      lib.access(&buf, 0),
      MuxEvent::new(Socket::from_fd(5), Readiness::Read)
    );
    assert_eq!(
      lib.access(&buf, 1),
      MuxEvent::new(Socket::from_fd(6), Readiness::Write)
    );
  }

  #[test]
  fn test_noop_ctl_skips_native_call() {
    let lib = KqueueLibrary::new();
    let r = lib.ctl(
      Mux::Kqueue(-1),
      Socket::from_fd(-1),
      Interest::READ_AND_WRITE,
      Interest::READ_AND_WRITE,
    );
    assert_eq!(r, 0);
  }
}
