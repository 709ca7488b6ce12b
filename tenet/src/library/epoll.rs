use std::ptr;
use std::sync::LazyLock;

use tracing::debug;

use super::{CtlOp, OsNetworkLibrary, Platform, ctl_op};
use crate::error::Result;
use crate::events::EventBuffer;
use crate::interest::{Interest, MuxEvent, Readiness};
use crate::layout::{MemoryLayout, records};
use crate::mux::Mux;
use crate::socket::Socket;
use crate::timeout::Timeout;

static EPOLL_EVENT: LazyLock<MemoryLayout> = LazyLock::new(records::epoll_event);

struct Offsets {
  events: usize,
  fd: usize,
}

static OFFSETS: LazyLock<Offsets> = LazyLock::new(|| Offsets {
  events: EPOLL_EVENT.field(&["events"]),
  fd: EPOLL_EVENT.field(&["data", "fd"]),
});

const READ_MASK: u32 = tenet_sys::EPOLLIN | tenet_sys::EPOLLRDHUP;
const WRITE_MASK: u32 = tenet_sys::EPOLLOUT;
const READ_EVENTS: u32 = tenet_sys::EPOLLIN
  | tenet_sys::EPOLLERR
  | tenet_sys::EPOLLHUP
  | tenet_sys::EPOLLRDHUP;

fn event_mask(interest: Interest) -> u32 {
  let mut mask = 0;
  if interest.is_readable() {
    mask |= READ_MASK;
  }
  if interest.is_writable() {
    mask |= WRITE_MASK;
  }
  mask
}

/// Linux backend over level-triggered epoll.
#[derive(Debug, Default)]
pub struct EpollLibrary {
  _priv: (),
}

impl EpollLibrary {
  pub fn new() -> Self {
    Self::default()
  }
}

impl OsNetworkLibrary for EpollLibrary {
  impl_socket_calls!();

  fn platform(&self) -> Platform {
    Platform::Linux
  }

  fn event_layout(&self) -> &'static MemoryLayout {
    &EPOLL_EVENT
  }

  fn create_mux(&self) -> Result<Mux> {
    let epfd = self.check(tenet_sys::epoll_create(), "create epoll")?;
    debug!(epfd, "epoll created");
    Ok(Mux::Epoll(epfd))
  }

  fn ctl(
    &self,
    mux: Mux,
    socket: Socket,
    from: Interest,
    to: Interest,
  ) -> i32 {
    let Some(op) = ctl_op(from, to) else {
      return 0;
    };
    let epfd = mux.epfd();
    let fd = socket.int_value();
    let op = match op {
      CtlOp::Add => tenet_sys::EPOLL_CTL_ADD,
      CtlOp::Modify => tenet_sys::EPOLL_CTL_MOD,
      CtlOp::Delete => {
        // SAFETY: EPOLL_CTL_DEL ignores the event pointer.
        return unsafe {
          tenet_sys::epoll_ctl(epfd, tenet_sys::EPOLL_CTL_DEL, fd, ptr::null_mut())
        };
      }
    };
    let mut event = self.new_event_buffer(1);
    event.set_u32(OFFSETS.events, event_mask(to));
    event.set_i32(OFFSETS.fd, fd);
    // SAFETY: `event` holds one epoll_event record.
    unsafe { tenet_sys::epoll_ctl(epfd, op, fd, event.as_mut_ptr()) }
  }

  fn mux_wait(
    &self,
    mux: Mux,
    events: &mut EventBuffer,
    max_events: usize,
    timeout: Timeout,
  ) -> i32 {
    assert!(max_events <= events.capacity(), "max events exceeds the buffer");
    debug_assert_eq!(events.record_size(), EPOLL_EVENT.byte_size());
    // SAFETY: the buffer holds at least `max_events` records.
    unsafe {
      tenet_sys::epoll_wait(
        mux.epfd(),
        events.as_mut_ptr(),
        max_events as i32,
        timeout.as_millis(),
      )
    }
  }

  fn access(&self, events: &EventBuffer, index: usize) -> MuxEvent {
    let base = events.record_offset(index);
    let fd = events.get_i32(base + OFFSETS.fd);
    let mask = events.get_u32(base + OFFSETS.events);
    let readiness = if mask & READ_EVENTS != 0 {
      Readiness::Read
    } else if mask & tenet_sys::EPOLLOUT != 0 {
      Readiness::Write
    } else {
      unreachable!("epoll reported events {mask:#x} for fd {fd}")
    };
    MuxEvent::new(Socket::from_fd(fd), readiness)
  }

  fn close_mux(&self, mux: Mux) -> i32 {
    tenet_sys::close(mux.epfd())
  }

  fn exit(&self) {}
}
