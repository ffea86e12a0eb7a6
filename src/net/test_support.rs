//! Socket and handler helpers shared by the net unit tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::config::ConnectionConfig;
use crate::handler::EventHandler;
use crate::net::connection::{Connection, ConnectionOptions};

/// Loopback pair: (server side, its peer address, client side).
pub(crate) async fn connected_pair() -> (TcpStream, SocketAddr, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).await.unwrap();
    let (server_side, peer) = listener.accept().await.unwrap();
    (server_side, peer, client)
}

pub(crate) fn options() -> ConnectionOptions {
    ConnectionOptions::from_config(&ConnectionConfig::default())
}

/// Poll `condition` until it holds or two seconds pass.
pub(crate) async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub(crate) async fn write_frame(stream: &mut TcpStream, payload: &[u8]) {
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(payload).await.unwrap();
}

pub(crate) async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let len = stream.read_u32().await.unwrap() as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    payload
}

/// Records every callback; panics on a `panic` message.
#[derive(Default)]
pub(crate) struct Recorder {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    messages: Mutex<Vec<Bytes>>,
}

impl Recorder {
    pub const PANIC: &'static [u8] = b"panic";

    pub fn messages(&self) -> Vec<Bytes> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler<Bytes> for Recorder {
    async fn on_connect(&self, _conn: &Connection<Bytes>) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_message(&self, _conn: &Connection<Bytes>, message: Bytes) {
        if &message[..] == Self::PANIC {
            panic!("handler asked to panic");
        }
        self.messages.lock().unwrap().push(message);
    }

    async fn on_close(&self, _conn: &Connection<Bytes>) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
