use std::ptr;
use std::sync::LazyLock;

use tracing::{debug, error};

use super::{CtlOp, OsNetworkLibrary, Platform, ctl_op};
use crate::error::{Error, Result};
use crate::events::EventBuffer;
use crate::interest::{Interest, MuxEvent, Readiness};
use crate::layout::{MemoryLayout, records};
use crate::mux::Mux;
use crate::socket::Socket;
use crate::timeout::Timeout;

static WEPOLL_EVENT: LazyLock<MemoryLayout> =
  LazyLock::new(records::wepoll_event);

struct Offsets {
  events: usize,
  sock: usize,
}

static OFFSETS: LazyLock<Offsets> = LazyLock::new(|| Offsets {
  events: WEPOLL_EVENT.field(&["events"]),
  sock: WEPOLL_EVENT.field(&["data", "sock"]),
});

const READ_MASK: u32 = tenet_sys::EPOLLIN | tenet_sys::EPOLLRDHUP;
const WRITE_MASK: u32 = tenet_sys::EPOLLOUT;

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

fn handle(mux: Mux) -> tenet_sys::Handle {
  mux.win_handle() as tenet_sys::Handle
}

/// Windows backend over wepoll.
///
/// wepoll keeps epoll's surface but reports error and hangup apart from
/// read readiness, which surfaces here as [`Readiness::Other`]. Its port
/// accepts `epoll_ctl` from any thread while another thread waits.
#[derive(Debug)]
pub struct WepollLibrary {
  startup: i32,
}

impl WepollLibrary {
  /// Initialises Winsock. A failure is logged and resurfaces as an error
  /// from the first socket call.
  pub fn new() -> Self {
    let startup = tenet_sys::wsa_startup();
    if startup != 0 {
      error!(code = startup, "WSAStartup failed");
    }
    Self { startup }
  }
}

impl Default for WepollLibrary {
  fn default() -> Self {
    Self::new()
  }
}

impl OsNetworkLibrary for WepollLibrary {
  impl_socket_calls!();

  fn platform(&self) -> Platform {
    Platform::Windows
  }

  fn event_layout(&self) -> &'static MemoryLayout {
    &WEPOLL_EVENT
  }

  fn create_mux(&self) -> Result<Mux> {
    let port = tenet_sys::epoll_create();
    if port.is_null() {
      let code = self.errno();
      return Err(Error::Os { op: "create wepoll", code });
    }
    debug!(port = ?port, "wepoll created");
    Ok(Mux::Wepoll(port as usize))
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
    let sock = socket.as_raw();
    let op = match op {
      CtlOp::Add => tenet_sys::EPOLL_CTL_ADD,
      CtlOp::Modify => tenet_sys::EPOLL_CTL_MOD,
      CtlOp::Delete => {
        // SAFETY: EPOLL_CTL_DEL ignores the event pointer.
        return unsafe {
          tenet_sys::epoll_ctl(
            handle(mux),
            tenet_sys::EPOLL_CTL_DEL,
            sock,
            ptr::null_mut(),
          )
        };
      }
    };
    let mut event = self.new_event_buffer(1);
    event.set_u32(OFFSETS.events, event_mask(to));
    event.set_usize(OFFSETS.sock, sock);
    // SAFETY: `event` holds one epoll_event record.
    unsafe { tenet_sys::epoll_ctl(handle(mux), op, sock, event.as_mut_ptr()) }
  }

  fn mux_wait(
    &self,
    mux: Mux,
    events: &mut EventBuffer,
    max_events: usize,
    timeout: Timeout,
  ) -> i32 {
    assert!(max_events <= events.capacity(), "max events exceeds the buffer");
    debug_assert_eq!(events.record_size(), WEPOLL_EVENT.byte_size());
    // SAFETY: the buffer holds at least `max_events` records.
    unsafe {
      tenet_sys::epoll_wait(
        handle(mux),
        events.as_mut_ptr(),
        max_events as i32,
        timeout.as_millis(),
      )
    }
  }

  fn access(&self, events: &EventBuffer, index: usize) -> MuxEvent {
    let base = events.record_offset(index);
    let sock = events.get_usize(base + OFFSETS.sock);
    let mask = events.get_u32(base + OFFSETS.events);
    let readiness = if mask & (tenet_sys::EPOLLIN | tenet_sys::EPOLLRDHUP) != 0
    {
      Readiness::Read
    } else if mask & tenet_sys::EPOLLOUT != 0 {
      Readiness::Write
    } else if mask & (tenet_sys::EPOLLERR | tenet_sys::EPOLLHUP) != 0 {
      Readiness::Other
    } else {
      unreachable!("wepoll reported events {mask:#x} for socket {sock}")
    };
    MuxEvent::new(Socket::from_raw(sock as u64), readiness)
  }

  fn close_mux(&self, mux: Mux) -> i32 {
    tenet_sys::epoll_close(handle(mux))
  }

  fn exit(&self) {
    if self.startup == 0 {
      tenet_sys::wsa_cleanup();
    }
  }
}
