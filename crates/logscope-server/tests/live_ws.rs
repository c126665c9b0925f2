//! End-to-end tests for the live-tail WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::{SinkExt, StreamExt};
use logscope_core::{Level, LogEntry, LogIndex, SearchEngine};
use logscope_server::{LiveTailConfig, LogscopeServer, ServerConfig, ServerResult};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};

/// Default test timeout.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Server on an ephemeral port with a fast poll interval.
struct TestServer {
    addr: SocketAddr,
    index: Arc<LogIndex>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<ServerResult<()>>,
}

impl TestServer {
    async fn start(max_live_connections: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let index = Arc::new(LogIndex::in_memory().unwrap());

        let config = ServerConfig::new(addr)
            .with_max_live_connections(max_live_connections)
            .with_live_tail(LiveTailConfig::default().with_poll_interval(Duration::from_millis(50)));
        let server = LogscopeServer::new(config, Arc::new(SearchEngine::new(Arc::clone(&index))));

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve_listener(listener, async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Self {
            addr,
            index,
            shutdown_tx,
            handle,
        }
    }

    fn live_url(&self) -> String {
        format!("ws://{}/entries/live", self.addr)
    }

    async fn connect(&self) -> Client {
        let (ws, _) = connect_async(self.live_url()).await.unwrap();
        ws
    }

    fn add(&self, message: &str, secs: i64, level: Level) {
        let ts = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        self.index
            .add(&LogEntry::new(message).with_timestamp(ts).with_level(level))
            .unwrap();
    }

    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let result = timeout(Duration::from_secs(2), self.handle).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}

/// Waits for the next batch and returns its messages.
async fn recv_messages(ws: &mut Client) -> Vec<String> {
    loop {
        let frame = timeout(TEST_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a batch")
            .expect("connection closed")
            .unwrap();
        if let WsMessage::Text(text) = frame {
            let batch: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert!(batch.get("err").is_none(), "unexpected error batch: {batch}");
            return batch["entries"]
                .as_array()
                .unwrap()
                .iter()
                .map(|e| e["message"].as_str().unwrap().to_string())
                .collect();
        }
    }
}

/// Collects messages across batches until `n` arrived, sorted.
async fn recv_sorted(ws: &mut Client, n: usize) -> Vec<String> {
    let mut messages = Vec::new();
    while messages.len() < n {
        messages.extend(recv_messages(ws).await);
    }
    messages.sort();
    messages
}

#[tokio::test]
async fn test_live_tail_streams_only_new_entries() {
    let server = TestServer::start(8).await;
    server.add("first", 1, Level::Info);
    server.add("second", 2, Level::Info);

    let mut ws = server.connect().await;
    assert_eq!(recv_messages(&mut ws).await, ["second", "first"]);

    server.add("third", 2, Level::Info);
    server.add("fourth", 3, Level::Info);
    // Both may land in one batch or two, depending on poll timing.
    assert_eq!(recv_sorted(&mut ws, 2).await, ["fourth", "third"]);

    let idle = timeout(Duration::from_millis(300), ws.next()).await;
    assert!(idle.is_err(), "no batch expected without new entries");

    ws.close(None).await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_live_tail_applies_client_query() {
    let server = TestServer::start(8).await;
    let mut ws = server.connect().await;

    ws.send(WsMessage::Text(r#"{"q":"level:error"}"#.to_string()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    server.add("fine", 1, Level::Info);
    server.add("broken", 2, Level::Error);
    assert_eq!(recv_messages(&mut ws).await, ["broken"]);

    ws.close(None).await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_live_tail_reports_invalid_query() {
    let server = TestServer::start(8).await;
    let mut ws = server.connect().await;

    ws.send(WsMessage::Text(r#"{"q":"nosuchfield:x"}"#.to_string()))
        .await
        .unwrap();

    let batch = loop {
        let frame = timeout(TEST_TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        if let WsMessage::Text(text) = frame {
            let batch: serde_json::Value = serde_json::from_str(&text).unwrap();
            if batch.get("err").is_some() {
                break batch;
            }
        }
    };
    assert!(batch["err"].as_str().unwrap().contains("nosuchfield"));

    ws.close(None).await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_live_connection_limit() {
    let server = TestServer::start(1).await;
    let _first = server.connect().await;

    let second = connect_async(server.live_url()).await;
    assert!(second.is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_ends_live_sessions() {
    let server = TestServer::start(8).await;
    let mut ws = server.connect().await;

    server.shutdown().await;

    let end = timeout(TEST_TIMEOUT, async {
        while let Some(frame) = ws.next().await {
            if frame.is_err() || matches!(frame, Ok(WsMessage::Close(_))) {
                break;
            }
        }
    })
    .await;
    assert!(end.is_ok());
}
