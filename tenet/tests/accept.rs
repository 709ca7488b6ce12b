mod common;

use std::net::TcpListener;
use std::time::Duration;

use tenet::test_utils::{accept_within, listen_on, listener, peer};
use tenet::{IpType, Loc, OsNetworkLibrary, SocketConfig, Transfer};

fn ipv6_available() -> bool {
  TcpListener::bind("[::1]:0").is_ok()
}

#[test]
fn test_accept_ipv4_reports_peer() {
  common::init_tracing();
  let lib = tenet::library();
  let (server, loc) = listener(IpType::Ipv4).unwrap();
  let client = peer(&loc).unwrap();

  let accepted = accept_within(&loc, server, Duration::from_secs(5))
    .unwrap()
    .expect("no connection accepted");
  assert_eq!(accepted.loc.ip_type(), IpType::Ipv4);
  assert_eq!(accepted.loc.ip(), "127.0.0.1");
  assert_eq!(accepted.loc.port(), client.local_addr().unwrap().port());

  lib.close_socket(accepted.socket);
  lib.close_socket(server);
}

#[test]
fn test_accept_ipv6_reports_peer() {
  if !ipv6_available() {
    return;
  }
  common::init_tracing();
  let lib = tenet::library();
  let (server, loc) = listener(IpType::Ipv6).unwrap();
  let client = peer(&loc).unwrap();

  let accepted = accept_within(&loc, server, Duration::from_secs(5))
    .unwrap()
    .expect("no connection accepted");
  assert_eq!(accepted.loc, Loc::ipv6("::1", client.local_addr().unwrap().port()));

  lib.close_socket(accepted.socket);
  lib.close_socket(server);
}

#[test]
fn test_dual_stack_accept_unmaps_ipv4_peer() {
  if !ipv6_available() {
    return;
  }
  common::init_tracing();
  let lib = tenet::library();
  let config = SocketConfig::default().with_ipv6_only(false);
  let (server, bound) = listen_on(&Loc::ipv6("", 0), &config).unwrap();

  let client = peer(&Loc::ipv4("127.0.0.1", bound.port())).unwrap();
  let accepted = accept_within(&bound, server, Duration::from_secs(5))
    .unwrap()
    .expect("no connection accepted");

  assert_eq!(accepted.loc.ip_type(), IpType::Ipv4);
  assert_eq!(accepted.loc.ip(), "127.0.0.1");
  assert_eq!(accepted.loc.port(), client.local_addr().unwrap().port());

  lib.close_socket(accepted.socket);
  lib.close_socket(server);
}

#[test]
fn test_accept_without_pending_is_none() {
  let lib = tenet::library();
  let (server, loc) = listener(IpType::Ipv4).unwrap();
  let accepted = lib
    .accept_connection(&loc, server, &SocketConfig::default())
    .unwrap();
  assert!(accepted.is_none());
  lib.close_socket(server);
}

#[test]
fn test_accepted_socket_is_non_blocking() {
  let lib = tenet::library();
  let (server, loc) = listener(IpType::Ipv4).unwrap();
  let _client = peer(&loc).unwrap();

  let accepted = accept_within(&loc, server, Duration::from_secs(5))
    .unwrap()
    .expect("no connection accepted");
  let mut buf = [0u8; 8];
  assert_eq!(lib.try_recv(accepted.socket, &mut buf), Transfer::WouldBlock);

  lib.close_socket(accepted.socket);
  lib.close_socket(server);
}

#[test]
fn test_accept_drains_backlog() {
  let lib = tenet::library();
  let (server, loc) = listener(IpType::Ipv4).unwrap();
  let clients: Vec<_> = (0..4).map(|_| peer(&loc).unwrap()).collect();

  let mut ports = Vec::new();
  for _ in &clients {
    let accepted = accept_within(&loc, server, Duration::from_secs(5))
      .unwrap()
      .expect("no connection accepted");
    ports.push(accepted.loc.port());
    lib.close_socket(accepted.socket);
  }
  ports.sort_unstable();

  let mut expected: Vec<_> = clients
    .iter()
    .map(|c| c.local_addr().unwrap().port())
    .collect();
  expected.sort_unstable();
  assert_eq!(ports, expected);

  lib.close_socket(server);
}
