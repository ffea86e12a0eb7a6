//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use tcp_server::config::ServerConfig;
use tcp_server::{Connection, EventHandler, LengthPrefixed, Server, ServerError, SharedHandler};

/// Callback observed by a [`Recorder`], tagged with the peer address.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect(String),
    Message(String, Bytes),
    Close(String),
}

/// Records every callback in order. Optionally echoes messages back.
#[derive(Default)]
pub struct Recorder {
    echo: bool,
    events: Mutex<Vec<Event>>,
    close_reasons: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn echoing() -> Arc<Self> {
        Arc::new(Self {
            echo: true,
            ..Self::default()
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<Bytes> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Message(_, payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn close_reasons(&self) -> Vec<String> {
        self.close_reasons.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler<Bytes> for Recorder {
    async fn on_connect(&self, conn: &Connection<Bytes>) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Connect(conn.remote_addr().to_string()));
    }

    async fn on_message(&self, conn: &Connection<Bytes>, message: Bytes) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Message(conn.remote_addr().to_string(), message.clone()));
        if self.echo {
            let _ = conn.send(message).await;
        }
    }

    async fn on_close(&self, conn: &Connection<Bytes>) {
        let reason = conn
            .close_reason()
            .map(|reason| reason.label().to_string())
            .unwrap_or_default();
        self.close_reasons.lock().unwrap().push(reason);
        self.events
            .lock()
            .unwrap()
            .push(Event::Close(conn.remote_addr().to_string()));
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct TestServer {
    pub server: Arc<Server<Bytes>>,
    pub addr: SocketAddr,
    pub serving: JoinHandle<Result<(), ServerError>>,
}

/// Serve `handler` over length-prefixed framing on an ephemeral loopback port.
pub async fn start_server(handler: SharedHandler<Bytes>, config: ServerConfig) -> TestServer {
    let server = Arc::new(
        Server::with_shared(config, handler, Arc::new(LengthPrefixed::new())).unwrap(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    TestServer {
        server,
        addr,
        serving,
    }
}

pub async fn write_frame(stream: &mut TcpStream, payload: &[u8]) {
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(payload).await.unwrap();
}

pub async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let len = tokio::time::timeout(Duration::from_secs(2), stream.read_u32())
        .await
        .expect("frame header in time")
        .unwrap() as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    payload
}

/// True once the peer has closed its side of `stream`.
pub async fn reads_eof(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    loop {
        match tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => return true,
            Ok(Ok(_)) => continue,
            Err(_) => return false,
        }
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
