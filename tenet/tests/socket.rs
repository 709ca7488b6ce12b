mod common;

use std::io::Read;
use std::net::{Shutdown, TcpListener};
use std::thread;
use std::time::Duration;

use tenet::test_utils::{connected_pair, listen_on, listener, loopback, wait_for};
use tenet::{
  ConnectStatus, Error, Interest, IpType, Loc, OsNetworkLibrary, Readiness,
  SocketConfig, Transfer,
};

#[test]
fn test_create_and_configure_both_families() {
  common::init_tracing();
  let lib = tenet::library();
  for ip_type in [IpType::Ipv4, IpType::Ipv6] {
    let loc = loopback(ip_type);
    let socket = lib.create_socket(&loc).expect("create socket");
    assert!(!socket.is_invalid());
    lib
      .configure_client_socket(socket, &SocketConfig::default())
      .expect("configure client");
    lib
      .configure_server_socket(socket, &loc, &SocketConfig::default())
      .expect("configure server");
    assert_eq!(lib.close_socket(socket), 0);
  }
}

#[test]
fn test_fresh_socket_has_no_pending_error() {
  let lib = tenet::library();
  let socket = lib.create_socket(&loopback(IpType::Ipv4)).unwrap();
  assert_eq!(lib.get_err_opt(socket).unwrap(), 0);
  lib.close_socket(socket);
}

#[test]
fn test_refused_connect_reports_error() {
  common::init_tracing();
  let lib = tenet::library();
  let port = {
    let std_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    std_listener.local_addr().unwrap().port()
  };
  let target = Loc::ipv4("127.0.0.1", port);

  let socket = lib.create_socket(&target).unwrap();
  lib.configure_client_socket(socket, &SocketConfig::default()).unwrap();

  match lib.try_connect(socket, &target) {
    Err(Error::Os { op, code }) => {
      assert_eq!(op, "connect");
      assert_ne!(code, 0);
    }
    Err(other) => panic!("unexpected error {other}"),
    Ok(ConnectStatus::Connected) => panic!("connected to a closed port"),
    Ok(ConnectStatus::InProgress) => {
      let mux = lib.create_mux().unwrap();
      let mut events = lib.new_event_buffer(4);
      lib.ctl_mux(mux, socket, Interest::NONE, Interest::WRITE).unwrap();
      assert!(common::wait_any(
        mux,
        &mut events,
        socket,
        Duration::from_secs(5)
      ));
      assert_ne!(lib.get_err_opt(socket).unwrap(), 0);
      lib.ctl_mux(mux, socket, Interest::WRITE, Interest::NONE).unwrap();
      lib.exit_mux(mux).unwrap();
    }
  }
  lib.close_socket(socket);
}

#[test]
fn test_connect_in_progress_completes() {
  common::init_tracing();
  let lib = tenet::library();
  let (server, loc) = listener(IpType::Ipv4).unwrap();

  let socket = lib.create_socket(&loc).unwrap();
  lib.configure_client_socket(socket, &SocketConfig::default()).unwrap();
  let status = lib.try_connect(socket, &loc).unwrap();

  if status == ConnectStatus::InProgress {
    let mux = lib.create_mux().unwrap();
    let mut events = lib.new_event_buffer(4);
    lib.ctl_mux(mux, socket, Interest::NONE, Interest::WRITE).unwrap();
    assert!(
      wait_for(mux, &mut events, socket, Readiness::Write, Duration::from_secs(5))
        .unwrap()
    );
    lib.ctl_mux(mux, socket, Interest::WRITE, Interest::NONE).unwrap();
    lib.exit_mux(mux).unwrap();
  }
  assert_eq!(lib.get_err_opt(socket).unwrap(), 0);

  lib.close_socket(socket);
  lib.close_socket(server);
}

#[test]
fn test_large_send_handles_would_block() {
  common::init_tracing();
  let lib = tenet::library();
  let pair = connected_pair().unwrap();
  let payload: Vec<u8> =
    std::iter::repeat_with(|| fastrand::u8(..)).take(4 << 20).collect();

  let mut peer = pair.peer.try_clone().unwrap();
  let reader = thread::spawn(move || {
    let mut received = Vec::new();
    peer.read_to_end(&mut received).unwrap();
    received
  });

  let mux = lib.create_mux().unwrap();
  let mut events = lib.new_event_buffer(4);
  lib.ctl_mux(mux, pair.socket, Interest::NONE, Interest::WRITE).unwrap();

  let mut sent = 0;
  let mut blocked = 0;
  while sent < payload.len() {
    match lib.try_send(pair.socket, &payload[sent..]) {
      Transfer::Ready(n) => sent += n,
      Transfer::WouldBlock => {
        blocked += 1;
        assert!(
          wait_for(
            mux,
            &mut events,
            pair.socket,
            Readiness::Write,
            Duration::from_secs(10),
          )
          .unwrap()
        );
      }
      Transfer::Fatal(code) => panic!("send failed with {code}"),
    }
  }
  tracing::debug!(blocked, "payload sent");

  assert_eq!(lib.shutdown_write(pair.socket), 0);
  let received = reader.join().unwrap();
  assert_eq!(received.len(), payload.len());
  assert!(received == payload);

  lib.ctl_mux(mux, pair.socket, Interest::WRITE, Interest::NONE).unwrap();
  lib.exit_mux(mux).unwrap();
  pair.close();
}

#[test]
fn test_shutdown_write_gives_peer_eof() {
  let lib = tenet::library();
  let mut pair = connected_pair().unwrap();
  assert_eq!(lib.try_send(pair.socket, b"bye"), Transfer::Ready(3));
  assert_eq!(lib.shutdown_write(pair.socket), 0);

  let mut received = Vec::new();
  pair.peer.read_to_end(&mut received).unwrap();
  assert_eq!(received, b"bye");
  pair.close();
}

#[test]
fn test_recv_after_peer_shutdown_is_zero() {
  let lib = tenet::library();
  let pair = connected_pair().unwrap();
  pair.peer.shutdown(Shutdown::Write).unwrap();

  let mux = lib.create_mux().unwrap();
  let mut events = lib.new_event_buffer(4);
  lib.ctl_mux(mux, pair.socket, Interest::NONE, Interest::READ).unwrap();
  assert!(
    wait_for(mux, &mut events, pair.socket, Readiness::Read, Duration::from_secs(5))
      .unwrap()
  );

  let mut buf = [0u8; 16];
  assert_eq!(lib.try_recv(pair.socket, &mut buf), Transfer::Ready(0));

  lib.ctl_mux(mux, pair.socket, Interest::READ, Interest::NONE).unwrap();
  lib.exit_mux(mux).unwrap();
  pair.close();
}

#[test]
fn test_recv_on_empty_socket_would_block() {
  let lib = tenet::library();
  let pair = connected_pair().unwrap();
  let mut buf = [0u8; 16];
  assert_eq!(lib.try_recv(pair.socket, &mut buf), Transfer::WouldBlock);
  assert!(lib.try_recv(pair.socket, &mut buf).is_would_block());
  pair.close();
}

#[test]
fn test_invalid_address_is_rejected() {
  let lib = tenet::library();
  let err = lib
    .create_sock_addr(&Loc::ipv4("300.1.2.3", 80))
    .expect_err("address should not parse");
  assert!(matches!(
    err,
    Error::InvalidAddress { ip_type: IpType::Ipv4, ref ip } if ip == "300.1.2.3"
  ));

  let err = lib.create_sock_addr(&Loc::ipv6("127.0.0.1", 80)).unwrap_err();
  assert!(matches!(err, Error::InvalidAddress { ip_type: IpType::Ipv6, .. }));
  assert_eq!(err.code(), None);
}

#[test]
fn test_wildcard_address_builds() {
  let lib = tenet::library();
  let v4 = lib.create_sock_addr(&Loc::ipv4("", 8080)).unwrap();
  assert_eq!(v4.family(), tenet_sys::AF_INET);
  assert_eq!(lib.ipv4_port(&v4), 8080);

  let v6 = lib.create_sock_addr(&Loc::ipv6("", 9090)).unwrap();
  assert_eq!(v6.family(), tenet_sys::AF_INET6);
  assert_eq!(lib.ipv6_port(&v6), 9090);
}

#[test]
fn test_bind_conflict_is_os_error() {
  common::init_tracing();
  let lib = tenet::library();
  let config = SocketConfig::default().with_reuse_addr(false);
  let (first, bound) = listen_on(&loopback(IpType::Ipv4), &config).unwrap();

  let second = lib.create_socket(&bound).unwrap();
  lib.configure_server_socket(second, &bound, &config).unwrap();
  let err = lib.bind_and_listen(second, &bound, 16).unwrap_err();
  assert!(matches!(err, Error::Os { op: "bind", .. }), "{err}");
  assert!(err.code().is_some());

  lib.close_socket(second);
  lib.close_socket(first);
}

#[test]
fn test_local_loc_reports_bound_port() {
  let lib = tenet::library();
  let (socket, loc) = listener(IpType::Ipv4).unwrap();
  assert_ne!(loc.port(), 0);

  let local = lib.local_loc(socket).unwrap();
  assert_eq!(local.ip_type(), IpType::Ipv4);
  assert_eq!(local.ip(), "127.0.0.1");
  assert_eq!(local.port(), loc.port());
  lib.close_socket(socket);
}

#[cfg(feature = "bytes")]
#[test]
fn test_recv_buf_appends() {
  use std::io::Write;

  let lib = tenet::library();
  let mut pair = connected_pair().unwrap();
  pair.peer.write_all(b"chunked").unwrap();

  let mux = lib.create_mux().unwrap();
  let mut events = lib.new_event_buffer(4);
  lib.ctl_mux(mux, pair.socket, Interest::NONE, Interest::READ).unwrap();
  assert!(
    wait_for(mux, &mut events, pair.socket, Readiness::Read, Duration::from_secs(5))
      .unwrap()
  );

  let mut buf = bytes::BytesMut::from(&b"head:"[..]);
  let transfer = lib.try_recv_buf(pair.socket, &mut buf);
  assert_eq!(transfer, Transfer::Ready(7));
  assert_eq!(&buf[..], b"head:chunked");

  assert!(lib.try_recv_buf(pair.socket, &mut buf).is_would_block());
  assert_eq!(&buf[..], b"head:chunked");

  lib.ctl_mux(mux, pair.socket, Interest::READ, Interest::NONE).unwrap();
  lib.exit_mux(mux).unwrap();
  pair.close();
}

#[test]
fn test_send_after_peer_close_fails() {
  let lib = tenet::library();
  let pair = connected_pair().unwrap();
  let tenet::test_utils::Pair { listener, socket, peer } = pair;
  drop(peer);
  thread::sleep(Duration::from_millis(50));

  // The first send may still be accepted locally; a reset follows.
  let mut outcome = Transfer::Ready(0);
  for _ in 0..50 {
    outcome = lib.try_send(socket, &[0u8; 1024]);
    if matches!(outcome, Transfer::Fatal(_)) {
      break;
    }
    thread::sleep(Duration::from_millis(10));
  }
  assert!(matches!(outcome, Transfer::Fatal(code) if code != 0), "{outcome:?}");

  lib.close_socket(socket);
  lib.close_socket(listener);
}

#[derive(Clone, Default)]
struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

#[test]
fn test_discard_socket_logs_failed_close() {
  let lib = tenet::library();
  let captured = Captured::default();
  let writer = captured.clone();
  let subscriber = tracing_subscriber::fmt()
    .with_ansi(false)
    .with_writer(move || writer.clone())
    .finish();

  let r = tracing::subscriber::with_default(subscriber, || {
    lib.discard_socket(tenet::Socket::INVALID)
  });
  assert_ne!(r, 0);

  let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
  assert!(logged.contains("close failed"), "{logged}");
  assert!(logged.contains("WARN"), "{logged}");
}
