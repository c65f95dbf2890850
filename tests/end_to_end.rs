//! End-to-end tests: a real server on a loopback port driven by real clients.

use loopkv::client::{Client, ClientError};
use loopkv::config::ServerConfig;
use loopkv::server::{DispatchReport, Server};
use loopkv::storage::{MemoryStore, Store};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Gap between commands so each lands in its own read on the server.
const SETTLE: Duration = Duration::from_millis(50);

struct TestServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<anyhow::Result<DispatchReport<MemoryStore>>>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..config
        };
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = stopped.await;
        }));

        Self { addr, stop, task }
    }

    async fn client(&self) -> Client {
        Client::connect(self.addr)
            .await
            .unwrap()
            .with_reply_timeout(Duration::from_millis(200))
    }

    async fn shutdown(self) -> DispatchReport<MemoryStore> {
        self.stop.send(()).unwrap();
        self.task.await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn test_set_is_silent_and_get_returns_raw_value() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut client = server.client().await;

    client.set("foo", "bar").await.unwrap();
    assert!(matches!(
        client.read_reply().await,
        Err(ClientError::NoReply(_))
    ));

    let value = client.get("foo").await.unwrap();
    assert_eq!(&value[..], b"bar");

    let report = server.shutdown().await;
    assert_eq!(report.store.get(b"foo").as_deref(), Some(&b"bar"[..]));
    assert_eq!(report.stats.replies_sent, 1);
}

#[tokio::test]
async fn test_get_missing_key_gets_no_reply() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut client = server.client().await;

    assert!(matches!(
        client.get("missing").await,
        Err(ClientError::NoReply(_))
    ));

    let report = server.shutdown().await;
    assert_eq!(report.stats.misses, 1);
    assert_eq!(report.stats.replies_sent, 0);
}

#[tokio::test]
async fn test_bad_requests_keep_the_connection_usable() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut client = server.client().await;

    // Wrong arity
    client
        .send_raw(b"*4\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n$3\r\nbaz\r\n")
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;
    // Not an array
    client.send_raw(b"+SET foo bar\r\n").await.unwrap();
    tokio::time::sleep(SETTLE).await;
    // Garbage
    client.send_raw(b"$-7\r\n").await.unwrap();
    tokio::time::sleep(SETTLE).await;
    // Unknown verb
    client
        .send_raw(b"*2\r\n$3\r\nDEL\r\n$3\r\nfoo\r\n")
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    assert!(matches!(
        client.get("foo").await,
        Err(ClientError::NoReply(_))
    ));

    client.set("foo", "bar").await.unwrap();
    tokio::time::sleep(SETTLE).await;
    assert_eq!(&client.get("foo").await.unwrap()[..], b"bar");

    let report = server.shutdown().await;
    assert_eq!(report.stats.protocol_errors, 4);
    assert_eq!(report.stats.misses, 1);
}

#[tokio::test]
async fn test_lowercase_verbs_are_accepted() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut client = server.client().await;

    client
        .send_raw(b"*3\r\n$3\r\nset\r\n$1\r\nk\r\n$1\r\nv\r\n")
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;
    client
        .send_raw(b"*2\r\n$3\r\ngEt\r\n$1\r\nk\r\n")
        .await
        .unwrap();
    assert_eq!(&client.read_reply().await.unwrap()[..], b"v");

    server.shutdown().await;
}

#[tokio::test]
async fn test_writes_are_visible_to_other_clients() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut writer = server.client().await;
    let mut reader = server.client().await;

    writer.set("shared", "v1").await.unwrap();
    tokio::time::sleep(SETTLE).await;
    writer.set("shared", "v2").await.unwrap();
    tokio::time::sleep(SETTLE).await;

    assert_eq!(&reader.get("shared").await.unwrap()[..], b"v2");
    // The writer never sees the reader's reply.
    assert!(matches!(
        writer.read_reply().await,
        Err(ClientError::NoReply(_))
    ));

    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_clients_with_pipelining() {
    let config = ServerConfig {
        pipelining: true,
        ..ServerConfig::default()
    };
    let server = TestServer::start(config).await;

    let mut tasks = Vec::new();
    for c in 0..8 {
        let mut client = server.client().await;
        tasks.push(tokio::spawn(async move {
            for i in 0..20 {
                let key = format!("client:{}:key:{}", c, i);
                let value = format!("value:{}:{}", c, i);
                client.set(key.clone(), value.clone()).await.unwrap();
                let got = client.get(key).await.unwrap();
                assert_eq!(got, value);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let report = server.shutdown().await;
    assert_eq!(report.store.len(), 160);
    assert_eq!(report.stats.replies_sent, 160);
    assert_eq!(report.stats.peers_registered, 8);
}

#[tokio::test]
async fn test_disconnect_deregisters_peer() {
    let server = TestServer::start(ServerConfig::default()).await;

    let client = server.client().await;
    drop(client);

    let mut other = server.client().await;
    other.set("k", "v").await.unwrap();
    tokio::time::sleep(SETTLE).await;
    assert_eq!(&other.get("k").await.unwrap()[..], b"v");

    let report = server.shutdown().await;
    assert_eq!(report.stats.peers_registered, 2);
    assert_eq!(report.stats.peers_deregistered, 1);
    assert_eq!(report.live_peers, 1);
}

#[tokio::test]
async fn test_get_before_half_close_is_answered() {
    let server = TestServer::start(ServerConfig::default()).await;

    let mut writer = server.client().await;
    writer.set("foo", "bar").await.unwrap();
    tokio::time::sleep(SETTLE).await;

    for _ in 0..20 {
        let mut client = server.client().await;
        client
            .send_raw(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .await
            .unwrap();
        client.shutdown_write().await.unwrap();

        assert_eq!(&client.read_reply().await.unwrap()[..], b"bar");
        assert!(matches!(client.read_reply().await, Err(ClientError::Closed)));
    }

    let report = server.shutdown().await;
    assert_eq!(report.stats.replies_sent, 20);
    assert_eq!(report.stats.peers_deregistered, 20);
}

#[tokio::test]
async fn test_shutdown_closes_client_connections() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut client = server.client().await;

    client.set("k", "v").await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let report = server.shutdown().await;
    assert_eq!(report.store.len(), 1);

    assert!(matches!(client.read_reply().await, Err(ClientError::Closed)));
}

#[tokio::test]
async fn test_key_limit_refuses_new_keys() {
    let config = ServerConfig {
        max_keys: Some(1),
        ..ServerConfig::default()
    };
    let server = TestServer::start(config).await;
    let mut client = server.client().await;

    client.set("a", "1").await.unwrap();
    tokio::time::sleep(SETTLE).await;
    client.set("b", "2").await.unwrap();
    tokio::time::sleep(SETTLE).await;
    // Overwriting an existing key is still allowed.
    client.set("a", "3").await.unwrap();
    tokio::time::sleep(SETTLE).await;

    assert!(matches!(client.get("b").await, Err(ClientError::NoReply(_))));
    assert_eq!(&client.get("a").await.unwrap()[..], b"3");

    let report = server.shutdown().await;
    assert_eq!(report.stats.store_errors, 1);
    assert_eq!(report.store.len(), 1);
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let first = TestServer::start(ServerConfig::default()).await;

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: first.addr.port(),
        ..ServerConfig::default()
    };
    assert!(Server::bind(config).await.is_err());

    first.shutdown().await;
}
