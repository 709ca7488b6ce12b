#![allow(dead_code)]

use std::time::Duration;

use tenet::{EventBuffer, Mux, MuxEvent, OsNetworkLibrary, Socket, Timeout};
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber filtered by `RUST_LOG`.
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

/// Every event `socket` gets from one wait of at most `timeout`.
pub fn events_for(
  mux: Mux,
  events: &mut EventBuffer,
  socket: Socket,
  timeout: Duration,
) -> Vec<MuxEvent> {
  tenet::test_utils::poll_once(mux, events, Timeout::from_duration(timeout))
    .expect("wait failed")
    .into_iter()
    .filter(|event| event.socket == socket)
    .collect()
}

/// Waits until `socket` reports any readiness.
pub fn wait_any(
  mux: Mux,
  events: &mut EventBuffer,
  socket: Socket,
  timeout: Duration,
) -> bool {
  let lib = tenet::library();
  let deadline = std::time::Instant::now() + timeout;
  while std::time::Instant::now() < deadline {
    let n = lib.wait(mux, events, Timeout::from_millis(10)).expect("wait failed");
    if lib.ready_events(events, n).any(|event| event.socket == socket) {
      return true;
    }
  }
  false
}
