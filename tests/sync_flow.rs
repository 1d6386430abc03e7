use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

use custontp::core::{LogSink, ServerConfig, TimestampStyle};
use custontp::network::{discover, discover_at, fetch_time, ServerState, TimeServer};
use custontp::protocol::WireTime;
use custontp::sync::{ClockSetter, SyncManager, SyncPhase};
use custontp::Error;

#[derive(Default)]
struct Recorder(Mutex<Vec<WireTime>>);

#[async_trait]
impl ClockSetter for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn set_system_clock(&self, time: &WireTime) -> custontp::Result<()> {
        self.0.lock().unwrap().push(*time);
        Ok(())
    }
}

/// Shares one recorder between the manager and the test
struct Shared(Arc<Recorder>);

#[async_trait]
impl ClockSetter for Shared {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn set_system_clock(&self, time: &WireTime) -> custontp::Result<()> {
        self.0.set_system_clock(time).await
    }
}

fn log_lines() -> (Arc<dyn LogSink>, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&lines);
    let sink: Arc<dyn LogSink> =
        Arc::new(move |msg: &str| captured.lock().unwrap().push(msg.to_string()));
    (sink, lines)
}

fn loopback_config(port: u16) -> ServerConfig {
    ServerConfig {
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
        poll_interval: Duration::from_millis(200),
        ..Default::default()
    }
}

#[tokio::test]
async fn discovery_on_fixed_port_finds_loopback() {
    let (log, _) = log_lines();
    let mut server = TimeServer::new(loopback_config(55000), log);
    let addr = assert_ok!(server.start().await);

    let started = Instant::now();
    let found = assert_ok!(discover_at(addr, Duration::from_secs(2)).await);
    assert_eq!(found, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    assert!(started.elapsed() < Duration::from_secs(2));

    server.stop().await;
}

#[tokio::test]
async fn broadcast_discovery_finds_wildcard_server() {
    let (log, lines) = log_lines();
    let mut server = TimeServer::new(
        ServerConfig {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            poll_interval: Duration::from_millis(200),
            ..Default::default()
        },
        log,
    );
    let addr = assert_ok!(server.start().await);

    let started = Instant::now();
    match discover(addr.port(), Duration::from_secs(2)).await {
        Ok(found) => {
            assert!(found.is_some(), "nobody answered the broadcast");
            assert!(started.elapsed() < Duration::from_secs(2));
            assert!(lines
                .lock()
                .unwrap()
                .iter()
                .any(|l| l.starts_with("[SERVER] Discovery request from ")));
        }
        // Hosts without a broadcast route refuse the send outright
        Err(Error::Network(reason)) => eprintln!("broadcast unavailable: {}", reason),
        Err(other) => panic!("unexpected discovery error: {}", other),
    }

    server.stop().await;
}

#[tokio::test]
async fn full_sync_against_running_server() {
    let (server_log, _) = log_lines();
    let mut server = TimeServer::new(loopback_config(0), server_log);
    let addr = assert_ok!(server.start().await);

    let (client_log, lines) = log_lines();
    let primary = Arc::new(Recorder::default());
    let fallback = Arc::new(Recorder::default());
    let mut manager = SyncManager::with_setters(
        client_log,
        Box::new(Shared(Arc::clone(&primary))),
        Box::new(Shared(Arc::clone(&fallback))),
    );

    let before = Utc::now().naive_utc();
    let outcome = assert_ok!(manager.synchronize("127.0.0.1", addr.port()).await);
    let after = Utc::now().naive_utc();

    assert_eq!(manager.phase(), SyncPhase::Done);
    assert!(outcome.primary_ok && outcome.fallback_ok);

    let applied = primary.0.lock().unwrap()[0];
    assert_eq!(fallback.0.lock().unwrap()[0], applied);
    let applied = applied.to_datetime().unwrap();
    // Millisecond truncation on the server side
    assert!(applied >= before - chrono::Duration::milliseconds(1));
    assert!(applied <= after);

    let lines = lines.lock().unwrap();
    assert!(lines[0].starts_with("[CLIENT] Measured ping (RTT):"));
    assert!(lines[1].starts_with("[CLIENT] Received time: "));

    server.stop().await;
}

#[tokio::test]
async fn legacy_style_server_is_applied_verbatim() {
    let (log, _) = log_lines();
    let mut server = TimeServer::new(
        ServerConfig {
            style: TimestampStyle::LegacyLocal,
            ..loopback_config(0)
        },
        log,
    );
    let addr = assert_ok!(server.start().await);

    let sample = assert_ok!(fetch_time("127.0.0.1", addr.port()).await);
    let parsed = assert_ok!(WireTime::parse(&sample.raw));
    assert!(!parsed.has_millis);
    assert_eq!(parsed.format(), sample.raw);

    server.stop().await;
}

#[tokio::test]
async fn unreachable_server_fails_sync() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (log, lines) = log_lines();
    let mut manager = SyncManager::with_setters(
        log,
        Box::new(Recorder::default()),
        Box::new(Recorder::default()),
    );

    let err = assert_err!(manager.synchronize("127.0.0.1", port).await);
    assert!(matches!(err, Error::Network(_)));
    assert_eq!(manager.phase(), SyncPhase::Failed);
    assert!(lines.lock().unwrap()[0].starts_with("[CLIENT] Error:"));
}

#[tokio::test]
async fn listener_closing_under_waiting_client_fails_fetch() {
    // Connections complete in the kernel backlog but are never served
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let fetch = tokio::spawn(async move { fetch_time("127.0.0.1", port).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(listener);

    let result = tokio::time::timeout(Duration::from_secs(5), fetch)
        .await
        .expect("fetch hung after the listener closed")
        .unwrap();
    assert!(matches!(result, Err(Error::Network(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopping_server_never_leaves_fetch_hanging() {
    let (log, _) = log_lines();
    let mut server = TimeServer::new(loopback_config(0), log);
    let addr = assert_ok!(server.start().await);

    // Some of these are still in the listen backlog when the listener closes
    let fetches: Vec<_> = (0..32)
        .map(|_| tokio::spawn(async move { fetch_time("127.0.0.1", addr.port()).await }))
        .collect();
    server.stop().await;

    for fetch in fetches {
        let result = tokio::time::timeout(Duration::from_secs(5), fetch)
            .await
            .expect("fetch hung after the server stopped")
            .unwrap();
        match result {
            Ok(sample) => {
                assert_ok!(WireTime::parse(&sample.raw));
            }
            Err(err) => assert!(matches!(err, Error::Network(_)), "unexpected error: {}", err),
        }
    }

    let err = assert_err!(fetch_time("127.0.0.1", addr.port()).await);
    assert!(matches!(err, Error::Network(_)));
}

#[tokio::test]
async fn server_stop_is_idempotent_and_releases_port() {
    let (log, _) = log_lines();
    let mut server = TimeServer::new(loopback_config(0), log);
    let addr = assert_ok!(server.start().await);

    server.stop().await;
    server.stop().await;
    assert_eq!(server.state(), ServerState::Stopped);

    let err = assert_err!(fetch_time("127.0.0.1", addr.port()).await);
    assert!(matches!(err, Error::Network(_)));
}
