//! TCP echo server on a single reactor thread
//!
//! This example demonstrates:
//! - Binding a non-blocking listener
//! - Registering and re-registering interest as a connection's state changes
//! - Handling partial sends with write readiness
//!
//! Run with `RUST_LOG=tenet=debug` to see the reactor's own logging.

use std::collections::HashMap;

use tenet::{
  Interest, Loc, MuxConfig, OsNetworkLibrary, Readiness, Socket, SocketConfig,
  Transfer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PORT: u16 = 8080;

struct Conn {
  interest: Interest,
  pending: Vec<u8>,
}

impl Conn {
  /// Read while nothing is queued, otherwise wait to flush.
  fn wanted(&self) -> Interest {
    if self.pending.is_empty() { Interest::READ } else { Interest::WRITE }
  }
}

fn main() -> tenet::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let lib = tenet::library();
  let config = MuxConfig::default();
  config.validate()?;
  let socket_config = SocketConfig::default();

  let loc = Loc::ipv4("", PORT);
  let listener = lib.create_socket(&loc)?;
  lib.configure_server_socket(listener, &loc, &socket_config)?;
  lib.bind_and_listen(listener, &loc, config.backlog)?;
  info!(%loc, "echo server listening, try: nc localhost {PORT}");

  let mux = lib.create_mux()?;
  lib.ctl_mux(mux, listener, Interest::NONE, Interest::READ)?;

  let mut events = lib.new_event_buffer(config.max_events);
  let mut conns: HashMap<Socket, Conn> = HashMap::new();
  let mut buf = vec![0u8; 16 * 1024];

  loop {
    let n = lib.wait(mux, &mut events, config.timeout())?;
    let ready: Vec<_> = lib.ready_events(&events, n).collect();

    for event in ready {
      if event.socket == listener {
        while let Some(accepted) =
          lib.accept_connection(&loc, listener, &socket_config)?
        {
          info!(peer = %accepted.loc, socket = %accepted.socket, "accepted");
          lib.ctl_mux(mux, accepted.socket, Interest::NONE, Interest::READ)?;
          conns.insert(
            accepted.socket,
            Conn { interest: Interest::READ, pending: Vec::new() },
          );
        }
        continue;
      }

      let Some(conn) = conns.get_mut(&event.socket) else {
        continue;
      };
      let open = match event.readiness {
        Readiness::Read | Readiness::Other => {
          echo_read(lib, event.socket, conn, &mut buf)
        }
        Readiness::Write => flush(lib, event.socket, conn),
      };

      if open {
        let wanted = conn.wanted();
        lib.ctl_mux(mux, event.socket, conn.interest, wanted)?;
        conn.interest = wanted;
      } else if let Some(conn) = conns.remove(&event.socket) {
        lib.ctl_mux(mux, event.socket, conn.interest, Interest::NONE)?;
        lib.close_socket(event.socket);
        info!(socket = %event.socket, "closed");
      }
    }
  }
}

/// Reads what is available and tries to echo it straight back. Returns
/// `false` once the connection is finished.
fn echo_read(
  lib: &tenet::Library,
  socket: Socket,
  conn: &mut Conn,
  buf: &mut [u8],
) -> bool {
  match lib.try_recv(socket, buf) {
    Transfer::Ready(0) => false,
    Transfer::Ready(n) => {
      conn.pending.extend_from_slice(&buf[..n]);
      flush(lib, socket, conn)
    }
    Transfer::WouldBlock => true,
    Transfer::Fatal(code) => {
      warn!(%socket, code, "recv failed");
      false
    }
  }
}

fn flush(lib: &tenet::Library, socket: Socket, conn: &mut Conn) -> bool {
  while !conn.pending.is_empty() {
    match lib.try_send(socket, &conn.pending) {
      Transfer::Ready(n) => {
        conn.pending.drain(..n);
      }
      Transfer::WouldBlock => return true,
      Transfer::Fatal(code) => {
        warn!(%socket, code, "send failed");
        return false;
      }
    }
  }
  true
}
