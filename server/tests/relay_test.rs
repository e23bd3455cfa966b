//! End-to-end tests: a real relay on an ephemeral port, driven by the client
//! library and by raw TCP sockets.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

use relay_client::{connect, ClientError, Incoming, Outgoing, ServerEvent};
use relay_protocol::{ProtocolError, MAX_LINE_LEN, MAX_NAME_LEN};
use relay_server::{Config, Registry, ServerListener};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

/// Helper: start the relay on a random port and return its address and registry.
async fn start_server(config: Config) -> (SocketAddr, Registry) {
    let server = ServerListener::bind(Config { port: 0, ..config }).await.unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    server.spawn();
    (addr, registry)
}

async fn start_quiet_server() -> (SocketAddr, Registry) {
    start_server(Config { no_announce: true, ..Config::default() }).await
}

/// Poll the registry until `check` holds or the deadline passes.
async fn wait_for<F>(registry: &Registry, check: F)
where
    F: Fn(&[String]) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        let names = registry.names().await;
        if check(&names) {
            return;
        }
        assert!(Instant::now() < deadline, "registry never reached expected state: {:?}", names);
        sleep(Duration::from_millis(10)).await;
    }
}

/// Connect and wait until the server has registered the connection.
async fn join(addr: SocketAddr, registry: &Registry, name: &str) -> (Outgoing, Incoming) {
    let before = registry.len().await;
    let session = connect(addr, name).await.unwrap();
    let deadline = Instant::now() + WAIT;
    while registry.len().await <= before {
        assert!(Instant::now() < deadline, "{} was never registered", name);
        sleep(Duration::from_millis(10)).await;
    }
    session
}

async fn recv(incoming: &mut Incoming) -> ServerEvent {
    timeout(WAIT, incoming.next_event())
        .await
        .expect("timed out waiting for event")
        .expect("server closed the connection")
        .unwrap()
}

async fn recv_line(incoming: &mut Incoming) -> String {
    match recv(incoming).await {
        ServerEvent::Line(line) => line,
        other => panic!("expected chat line, got {:?}", other),
    }
}

async fn assert_silent(incoming: &mut Incoming) {
    if let Ok(event) = timeout(QUIET, incoming.next_event()).await {
        panic!("expected nothing, got {:?}", event);
    }
}

#[tokio::test]
async fn broadcast_then_abrupt_disconnect() {
    let (addr, registry) = start_quiet_server().await;
    let (mut alice_out, mut alice_in) = join(addr, &registry, "alice").await;
    let (mut bob_out, mut bob_in) = join(addr, &registry, "bob").await;
    let (_carol_out, mut carol_in) = join(addr, &registry, "carol").await;

    alice_out.send_line("hello everyone").await.unwrap();

    for incoming in [&mut bob_in, &mut carol_in] {
        let line = recv_line(incoming).await;
        assert!(line.contains("alice"), "{}", line);
        assert!(line.contains("hello everyone"), "{}", line);
        assert!(line.starts_with('['));
    }
    assert_silent(&mut alice_in).await;

    // alice vanishes without a goodbye
    drop(alice_out);
    drop(alice_in);
    wait_for(&registry, |names| !names.iter().any(|n| n == "alice")).await;

    bob_out.send_line("still there?").await.unwrap();

    let line = recv_line(&mut carol_in).await;
    assert!(line.ends_with("bob: still there?"), "{}", line);
    assert_silent(&mut bob_in).await;
    assert_eq!(registry.names().await, vec!["bob", "carol"]);
}

#[tokio::test]
async fn private_message_reaches_only_target() {
    let (addr, registry) = start_quiet_server().await;
    let (mut alice_out, mut alice_in) = join(addr, &registry, "alice").await;
    let (_bob_out, mut bob_in) = join(addr, &registry, "bob").await;
    let (_carol_out, mut carol_in) = join(addr, &registry, "carol").await;

    alice_out.submit("/pm bob secret").await.unwrap();

    let line = recv_line(&mut bob_in).await;
    assert!(line.contains("secret"), "{}", line);
    assert!(line.contains("alice (private)"), "{}", line);
    assert_silent(&mut carol_in).await;
    assert_silent(&mut alice_in).await;
}

#[tokio::test]
async fn private_message_to_absent_user_is_reported() {
    let (addr, registry) = start_quiet_server().await;
    let (mut alice_out, mut alice_in) = join(addr, &registry, "alice").await;
    let (_bob_out, mut bob_in) = join(addr, &registry, "bob").await;

    alice_out.private("dave", "anyone?").await.unwrap();

    assert_eq!(recv(&mut alice_in).await, ServerEvent::Notice("User dave is not online".into()));
    assert_silent(&mut bob_in).await;
}

#[tokio::test]
async fn malformed_private_message_is_not_relayed() {
    let (addr, registry) = start_quiet_server().await;
    let (mut alice_out, mut alice_in) = join(addr, &registry, "alice").await;
    let (_bob_out, mut bob_in) = join(addr, &registry, "bob").await;

    alice_out.send_line("/pm bob").await.unwrap();

    assert!(matches!(recv(&mut alice_in).await, ServerEvent::Notice(_)));
    assert_silent(&mut bob_in).await;
}

#[tokio::test]
async fn typing_indicator_fans_out() {
    let (addr, registry) = start_quiet_server().await;
    let (mut alice_out, mut alice_in) = join(addr, &registry, "alice").await;
    let (_bob_out, mut bob_in) = join(addr, &registry, "bob").await;
    let (_carol_out, mut carol_in) = join(addr, &registry, "carol").await;

    alice_out.typing().await.unwrap();
    alice_out.send_line("/typing").await.unwrap();

    for incoming in [&mut bob_in, &mut carol_in] {
        assert_eq!(recv(incoming).await, ServerEvent::Typing("alice".into()));
        assert_eq!(recv(incoming).await, ServerEvent::Typing("alice".into()));
    }
    assert_silent(&mut alice_in).await;
}

#[tokio::test]
async fn messages_from_one_sender_stay_ordered() {
    let (addr, registry) = start_quiet_server().await;
    let (mut alice_out, _alice_in) = join(addr, &registry, "alice").await;
    let (_bob_out, mut bob_in) = join(addr, &registry, "bob").await;

    for n in 0..50 {
        alice_out.send_line(&format!("msg {}", n)).await.unwrap();
    }

    for n in 0..50 {
        let line = recv_line(&mut bob_in).await;
        assert!(line.ends_with(&format!("alice: msg {}", n)), "{}", line);
    }
}

#[tokio::test]
async fn blank_lines_are_ignored() {
    let (addr, registry) = start_quiet_server().await;
    let (mut alice_out, _alice_in) = join(addr, &registry, "alice").await;
    let (_bob_out, mut bob_in) = join(addr, &registry, "bob").await;

    alice_out.send_line("   ").await.unwrap();
    alice_out.send_line("after").await.unwrap();

    assert!(recv_line(&mut bob_in).await.ends_with("alice: after"));
}

#[tokio::test]
async fn handshake_rejections_close_the_socket() {
    let (addr, registry) = start_quiet_server().await;

    for first_line in ["hello\n", "USERNAME:\n", "USERNAME:two words\n"] {
        let mut socket = TcpStream::connect(addr).await.unwrap();
        socket.write_all(first_line.as_bytes()).await.unwrap();

        let mut buf = [0u8; 64];
        let n = timeout(WAIT, socket.read(&mut buf)).await.unwrap().unwrap_or(0);
        assert_eq!(n, 0, "socket should be closed after {:?}", first_line);
    }

    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn silent_connection_times_out_before_handshake() {
    let config = Config { handshake_timeout_ms: 100, no_announce: true, ..Config::default() };
    let (addr, registry) = start_server(config).await;

    let mut socket = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 16];
    let n = timeout(WAIT, socket.read(&mut buf)).await.unwrap().unwrap_or(0);

    assert_eq!(n, 0);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn raw_line_protocol_interoperates() {
    let (addr, registry) = start_quiet_server().await;
    let (_bob_out, mut bob_in) = join(addr, &registry, "bob").await;

    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket.write_all(b"USERNAME:raw\r\n").await.unwrap();
    wait_for(&registry, |names| names.iter().any(|n| n == "raw")).await;

    socket.write_all(b"hi from netcat\r\n").await.unwrap();

    assert!(recv_line(&mut bob_in).await.ends_with("raw: hi from netcat"));
}

#[tokio::test]
async fn duplicate_names_are_disambiguated() {
    let (addr, registry) = start_quiet_server().await;
    let (_first_out, _first_in) = join(addr, &registry, "alice").await;
    let (mut second_out, mut second_in) = join(addr, &registry, "alice").await;

    assert_eq!(
        recv(&mut second_in).await,
        ServerEvent::Notice("You have joined as alice_2".into())
    );

    second_out.users().await.unwrap();
    assert_eq!(
        recv(&mut second_in).await,
        ServerEvent::Notice("Users currently online: alice alice_2".into())
    );
}

#[tokio::test]
async fn presence_is_announced() {
    let (addr, registry) = start_server(Config::default()).await;
    let (_alice_out, mut alice_in) = join(addr, &registry, "alice").await;
    let (bob_out, bob_in) = join(addr, &registry, "bob").await;

    assert_eq!(recv(&mut alice_in).await, ServerEvent::Notice("bob joined".into()));

    bob_out.close().await.unwrap();
    drop(bob_in);

    assert_eq!(recv(&mut alice_in).await, ServerEvent::Notice("bob has left".into()));
    assert_eq!(registry.names().await, vec!["alice"]);
}

#[tokio::test]
async fn oversized_line_disconnects_sender_only() {
    let (addr, registry) = start_quiet_server().await;
    let (_alice_out, mut alice_in) = join(addr, &registry, "alice").await;

    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket.write_all(b"USERNAME:loud\n").await.unwrap();
    wait_for(&registry, |names| names.iter().any(|n| n == "loud")).await;

    let long = "x".repeat(MAX_LINE_LEN + 10) + "\n";
    socket.write_all(long.as_bytes()).await.unwrap();

    wait_for(&registry, |names| names == ["alice"]).await;
    assert_silent(&mut alice_in).await;
}

#[tokio::test]
async fn idle_clients_are_disconnected() {
    let config = Config { idle_timeout_secs: Some(1), no_announce: true, ..Config::default() };
    let (addr, registry) = start_server(config).await;
    let (_alice_out, mut alice_in) = join(addr, &registry, "alice").await;

    let closed = timeout(Duration::from_secs(3), alice_in.next_event()).await.unwrap();
    assert!(closed.is_none());
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn full_length_lines_reach_every_recipient() {
    let (addr, registry) = start_quiet_server().await;
    let long_name = "n".repeat(MAX_NAME_LEN);
    let (mut alice_out, _alice_in) = join(addr, &registry, &long_name).await;
    let (mut bob_out, mut bob_in) = join(addr, &registry, "bob").await;
    let (_carol_out, mut carol_in) = join(addr, &registry, "carol").await;

    let text = "x".repeat(MAX_LINE_LEN);
    alice_out.send_line(&text).await.unwrap();

    for incoming in [&mut bob_in, &mut carol_in] {
        let line = recv_line(incoming).await;
        assert!(line.ends_with(&format!("{}: {}", long_name, text)));
    }

    let pm = "y".repeat(MAX_LINE_LEN - "/pm carol ".len());
    alice_out.submit(&format!("/pm carol {}", pm)).await.unwrap();
    let line = recv_line(&mut carol_in).await;
    assert!(line.ends_with(&format!("(private): {}", pm)));

    // recipients are still connected and usable
    bob_out.send_line("after").await.unwrap();
    assert!(recv_line(&mut carol_in).await.ends_with("bob: after"));
    assert_eq!(registry.len().await, 3);
}

#[tokio::test]
async fn overlong_outgoing_line_is_refused_locally() {
    let (addr, registry) = start_quiet_server().await;
    let (mut alice_out, _alice_in) = join(addr, &registry, "alice").await;
    let (_bob_out, mut bob_in) = join(addr, &registry, "bob").await;

    let err = alice_out.send_line(&"x".repeat(2000)).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Protocol(ProtocolError::LineTooLong { len: 2000, max: MAX_LINE_LEN })
    ));

    // nothing went out and the session carries on
    alice_out.send_line("short one").await.unwrap();
    assert!(recv_line(&mut bob_in).await.ends_with("alice: short one"));
    assert_eq!(registry.len().await, 2);
}

#[tokio::test]
async fn private_target_with_trailing_underscore_is_found() {
    let (addr, registry) = start_quiet_server().await;
    let (mut alice_out, _alice_in) = join(addr, &registry, "alice").await;
    let (_bob_out, mut bob_in) = join(addr, &registry, "bob_").await;

    // the requested name was trimmed, so the assigned one is reported
    assert_eq!(recv(&mut bob_in).await, ServerEvent::Notice("You have joined as bob".into()));

    alice_out.submit("/pm bob_ over here").await.unwrap();
    assert!(recv_line(&mut bob_in).await.ends_with("alice (private): over here"));
}
