#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Tenet - Portable Non-Blocking Socket Reactor
//!
//! Tenet is the syscall-facing layer of a network framework. It owns raw
//! socket lifecycle, readiness multiplexing and the binary layouts of each
//! kernel's event records, and exposes them through one interface,
//! [`OsNetworkLibrary`].
//!
//! ## Platform support
//!
//! | Platform    | Multiplexer | Backend                        |
//! |-------------|-------------|--------------------------------|
//! | Linux       | epoll       | `EpollLibrary`                 |
//! | macOS / BSD | kqueue      | `KqueueLibrary`                |
//! | Windows     | wepoll      | `WepollLibrary`                |
//!
//! Exactly one backend is compiled in and [`library()`] returns the
//! process-wide instance.
//!
//! ## Usage
//!
//! ```no_run
//! use tenet::{Interest, Loc, OsNetworkLibrary, SocketConfig, Timeout};
//!
//! fn main() -> tenet::Result<()> {
//!   let lib = tenet::library();
//!   let loc = Loc::ipv4("127.0.0.1", 8080);
//!
//!   let listener = lib.create_socket(&loc)?;
//!   lib.configure_server_socket(listener, &loc, &SocketConfig::default())?;
//!   lib.bind_and_listen(listener, &loc, 64)?;
//!
//!   let mux = lib.create_mux()?;
//!   lib.ctl_mux(mux, listener, Interest::NONE, Interest::READ)?;
//!
//!   let mut events = lib.new_event_buffer(16);
//!   let n = lib.wait(mux, &mut events, Timeout::from_millis(25))?;
//!   for event in lib.ready_events(&events, n) {
//!     println!("{} is ready: {:?}", event.socket, event.readiness);
//!   }
//!
//!   lib.exit_mux(mux)?;
//!   lib.close_socket(listener);
//!   tenet::exit();
//!   Ok(())
//! }
//! ```
//!
//! ## Ownership
//!
//! [`Socket`] and [`Mux`] are plain handles. Nothing is closed on drop: the
//! owner calls [`close_socket`](OsNetworkLibrary::close_socket) and
//! [`exit_mux`](OsNetworkLibrary::exit_mux) exactly once.
//!
//! ## Threading
//!
//! One thread waits on a given [`Mux`]. Any thread may call
//! [`ctl_mux`](OsNetworkLibrary::ctl_mux) on it at any time, including while
//! the wait is in progress.
//!
//! ## Error Handling
//!
//! Native failures become [`Error::Os`] carrying the operation name and the
//! platform error code. "Would block" and "interrupted" are never errors:
//! they come back as [`Transfer::WouldBlock`], [`ConnectStatus::InProgress`],
//! an empty accept or a zero-event wait.

use std::sync::OnceLock;

mod addr;
mod config;
mod error;
mod events;
mod interest;
pub mod layout;
pub mod library;
mod loc;
mod mux;
mod socket;
mod timeout;

#[doc(hidden)]
pub mod test_utils;

pub use addr::SockAddr;
pub use config::{MuxConfig, SocketConfig};
pub use error::{Error, Result};
pub use events::EventBuffer;
pub use interest::{Interest, MuxEvent, Readiness};
pub use layout::MemoryLayout;
pub use library::{
  Accepted, ConnectStatus, OsNetworkLibrary, Platform, Transfer,
};
pub use loc::{IpType, Loc};
pub use mux::Mux;
pub use socket::Socket;
pub use timeout::Timeout;

/// The backend compiled into this build.
#[cfg(linux)]
pub type Library = library::EpollLibrary;
/// The backend compiled into this build.
#[cfg(kqueue)]
pub type Library = library::KqueueLibrary;
/// The backend compiled into this build.
#[cfg(wepoll)]
pub type Library = library::WepollLibrary;

static LIBRARY: OnceLock<Library> = OnceLock::new();

/// The process-wide backend, created on first use.
pub fn library() -> &'static Library {
  LIBRARY.get_or_init(Library::new)
}

/// Releases process-wide native state (`WSACleanup` on Windows).
///
/// Does nothing if [`library()`] was never called.
pub fn exit() {
  if let Some(library) = LIBRARY.get() {
    library.exit();
  }
}
