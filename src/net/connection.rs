//! Connection state machine and pumps.
//!
//! # Responsibilities
//! - Track connection state (Open → Closing → Closed)
//! - Generate unique connection IDs for tracing
//! - Run the inbound pump (read → decode → dispatch) and the outbound pump
//!   (dequeue → encode → write)
//! - Make close idempotent and deliver `on_close` exactly once
//!
//! # Design Decisions
//! - The socket is split; each pump owns one half and nothing else touches it
//! - Closing is a watch signal both pumps select on, so a pump blocked in I/O
//!   wakes up and drops its half
//! - The inbound pump outlives the outbound pump and performs the final
//!   Closing → Closed transition

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::Instrument;

use crate::config::{ConnectionConfig, QueueFullPolicy};
use crate::error::SendError;
use crate::handler::SharedHandler;
use crate::lifecycle::shutdown::triggered;
use crate::observability::metrics;
use crate::protocol::{ProtocolError, SharedProtocol};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Initial read buffer size and minimum free space before each read.
const READ_CHUNK: usize = 4096;

/// Undecoded bytes tolerated beyond `max_message_size` for frame headers.
pub const FRAME_OVERHEAD_ALLOWANCE: usize = 64;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Pumps are running and the outbound queue accepts messages.
    Open = 0,
    /// Close was initiated; pumps are winding down.
    Closing = 1,
    /// Both pumps exited and the socket is released.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Why a connection left the open state. The first cause recorded wins.
#[derive(Debug)]
pub enum CloseReason {
    /// `Connection::close` or `Server::close` was called.
    Local,
    /// The peer closed its side of the stream.
    PeerClosed,
    /// No bytes arrived within the idle read timeout.
    ReadTimeout,
    /// Reading or writing the socket failed.
    Io(io::Error),
    /// The inbound byte stream could not be decoded.
    Protocol(ProtocolError),
    /// An outbound message could not be encoded.
    Encode(ProtocolError),
    /// A pump or handler callback panicked.
    Panicked,
}

impl CloseReason {
    /// Short stable label, used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::Local => "local",
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::ReadTimeout => "read_timeout",
            CloseReason::Io(_) => "io",
            CloseReason::Protocol(_) => "protocol",
            CloseReason::Encode(_) => "encode",
            CloseReason::Panicked => "panicked",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Io(e) => write!(f, "io error: {}", e),
            CloseReason::Protocol(e) => write!(f, "decode error: {}", e),
            CloseReason::Encode(e) => write!(f, "encode error: {}", e),
            other => f.write_str(other.label()),
        }
    }
}

/// Settings a connection is created with.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionOptions {
    pub max_message_size: usize,
    pub read_timeout: Option<Duration>,
    pub queue_capacity: usize,
    pub queue_full_policy: QueueFullPolicy,
    pub drain_timeout: Duration,
    pub dialed: bool,
}

impl ConnectionOptions {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            max_message_size: config.max_message_size,
            read_timeout: config.read_timeout(),
            queue_capacity: config.outbound_queue_capacity,
            queue_full_policy: config.queue_full_policy,
            drain_timeout: config.drain_timeout(),
            dialed: false,
        }
    }
}

struct Shared<M: Send + 'static> {
    id: ConnectionId,
    peer_addr: SocketAddr,
    remote_addr: String,
    state: AtomicU8,
    closing: watch::Sender<bool>,
    outbound: mpsc::Sender<M>,
    queue_full_policy: QueueFullPolicy,
    /// Idle read timeout in nanoseconds, 0 when disabled.
    read_timeout_nanos: AtomicU64,
    close_reason: OnceLock<CloseReason>,
    handler: SharedHandler<M>,
}

/// Handle to one live or recently closed connection.
///
/// Cheap to clone; all clones refer to the same socket and queue.
pub struct Connection<M: Send + 'static> {
    shared: Arc<Shared<M>>,
}

impl<M: Send + 'static> Clone for Connection<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: Send + 'static> fmt::Debug for Connection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("peer", &self.shared.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

impl<M: Send + 'static> Connection<M> {
    /// Wrap `stream` without starting its pumps.
    pub(crate) fn open(
        stream: TcpStream,
        peer_addr: SocketAddr,
        handler: SharedHandler<M>,
        protocol: SharedProtocol<M>,
        options: &ConnectionOptions,
    ) -> (Self, ConnectionDriver<M>) {
        let (outbound, outbound_rx) = mpsc::channel(options.queue_capacity.max(1));
        let (closing, _) = watch::channel(false);

        let conn = Self {
            shared: Arc::new(Shared {
                id: ConnectionId::new(),
                peer_addr,
                remote_addr: peer_addr.to_string(),
                state: AtomicU8::new(ConnectionState::Open as u8),
                closing,
                outbound,
                queue_full_policy: options.queue_full_policy,
                read_timeout_nanos: AtomicU64::new(0),
                close_reason: OnceLock::new(),
                handler,
            }),
        };
        if let Some(timeout) = options.read_timeout {
            conn.set_read_timeout(timeout);
        }

        let (reader, writer) = stream.into_split();
        let driver = ConnectionDriver {
            conn: conn.clone(),
            reader,
            writer,
            outbound_rx,
            protocol,
            max_message_size: options.max_message_size,
            drain_timeout: options.drain_timeout,
            dialed: options.dialed,
        };

        (conn, driver)
    }

    /// This connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Peer address as a string; stable for the connection's lifetime.
    pub fn remote_addr(&self) -> &str {
        &self.shared.remote_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// True once both pumps exited and the socket was released.
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Why the connection stopped, if it has.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.shared.close_reason.get()
    }

    /// Close the connection. Safe to call any number of times from anywhere.
    ///
    /// Stops accepting outbound messages and wakes both pumps. Messages
    /// already queued are flushed within the drain timeout. `on_close` runs
    /// once the pumps are gone; this call does not wait for it.
    pub fn close(&self) {
        if self.begin_close(CloseReason::Local) {
            tracing::debug!(connection_id = %self.shared.id, "Connection close requested");
        }
    }

    /// Open → Closing. Only the first caller wins.
    fn begin_close(&self, reason: CloseReason) -> bool {
        if self
            .shared
            .state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        let _ = self.shared.close_reason.set(reason);
        self.shared.closing.send_replace(true);
        true
    }

    fn finish(&self) {
        self.shared
            .state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Enqueue a message for the outbound pump.
    ///
    /// With [`QueueFullPolicy::Block`] this waits for queue space; with
    /// [`QueueFullPolicy::Reject`] a full queue fails with
    /// [`SendError::QueueFull`].
    pub async fn send(&self, message: M) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        match self.shared.queue_full_policy {
            QueueFullPolicy::Block => self
                .shared
                .outbound
                .send(message)
                .await
                .map_err(|_| SendError::Closed),
            QueueFullPolicy::Reject => self.try_send(message),
        }
    }

    /// Enqueue a message without waiting, whatever the configured policy.
    pub fn try_send(&self, message: M) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        self.shared.outbound.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Set the idle read timeout. `Duration::ZERO` disables it.
    ///
    /// Takes effect from the next read.
    pub fn set_read_timeout(&self, timeout: Duration) {
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        self.shared.read_timeout_nanos.store(nanos, Ordering::Relaxed);
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        match self.shared.read_timeout_nanos.load(Ordering::Relaxed) {
            0 => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    fn closing_signal(&self) -> watch::Receiver<bool> {
        self.shared.closing.subscribe()
    }
}

/// The I/O side of a connection, consumed when its pumps start.
pub(crate) struct ConnectionDriver<M: Send + 'static> {
    conn: Connection<M>,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    outbound_rx: mpsc::Receiver<M>,
    protocol: SharedProtocol<M>,
    max_message_size: usize,
    drain_timeout: Duration,
    dialed: bool,
}

impl<M: Send + 'static> ConnectionDriver<M> {
    /// Spawn the inbound and outbound pumps. Returns immediately.
    pub(crate) fn serve(self) {
        let ConnectionDriver {
            conn,
            reader,
            writer,
            outbound_rx,
            protocol,
            max_message_size,
            drain_timeout,
            dialed,
        } = self;

        let span = tracing::info_span!(
            "connection",
            id = %conn.id(),
            peer = %conn.remote_addr(),
        );
        metrics::record_connection_opened(dialed);
        tracing::debug!(parent: &span, dialed, "Connection opened");

        let outbound = tokio::spawn(
            outbound_pump(
                conn.clone(),
                writer,
                outbound_rx,
                Arc::clone(&protocol),
                drain_timeout,
            )
            .instrument(span.clone()),
        );

        tokio::spawn(
            async move {
                inbound_pump(&conn, reader, &protocol, max_message_size).await;

                if let Err(e) = outbound.await {
                    tracing::warn!(error = %e, "Outbound pump did not finish cleanly");
                }

                conn.finish();
                let reason = conn.close_reason().map(CloseReason::label).unwrap_or("local");
                metrics::record_connection_closed(reason);
                match conn.close_reason() {
                    Some(reason) => tracing::debug!(%reason, "Connection closed"),
                    None => tracing::debug!("Connection closed"),
                }

                let handler = Arc::clone(&conn.shared.handler);
                if AssertUnwindSafe(handler.on_close(&conn))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    tracing::error!("on_close handler panicked");
                }
            }
            .instrument(span),
        );
    }
}

async fn inbound_pump<M: Send + 'static>(
    conn: &Connection<M>,
    reader: OwnedReadHalf,
    protocol: &SharedProtocol<M>,
    max_message_size: usize,
) {
    let reason = AssertUnwindSafe(read_loop(conn, reader, protocol, max_message_size))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            tracing::error!("Inbound pump panicked");
            CloseReason::Panicked
        });
    conn.begin_close(reason);
}

async fn read_loop<M: Send + 'static>(
    conn: &Connection<M>,
    mut reader: OwnedReadHalf,
    protocol: &SharedProtocol<M>,
    max_message_size: usize,
) -> CloseReason {
    let mut closing = conn.closing_signal();
    let handler = Arc::clone(&conn.shared.handler);
    handler.on_connect(conn).await;

    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        // Dispatch every complete frame before reading again.
        loop {
            if !conn.is_open() {
                return CloseReason::Local;
            }
            match protocol.decode(&mut buf, max_message_size) {
                Ok(Some(message)) => {
                    metrics::record_message_received();
                    handler.on_message(conn, message).await;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "Decode failed");
                    return CloseReason::Protocol(e);
                }
            }
        }

        if buf.len() > max_message_size.saturating_add(FRAME_OVERHEAD_ALLOWANCE) {
            return CloseReason::Protocol(ProtocolError::FrameTooLarge {
                size: buf.len(),
                max: max_message_size,
            });
        }

        buf.reserve(READ_CHUNK);
        let timeout = conn.read_timeout();
        let read = tokio::select! {
            biased;
            _ = triggered(&mut closing) => return CloseReason::Local,
            read = read_with_timeout(&mut reader, &mut buf, timeout) => read,
        };

        match read {
            Ok(0) => return CloseReason::PeerClosed,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return CloseReason::ReadTimeout,
            Err(e) => return CloseReason::Io(e),
        }
    }
}

async fn read_with_timeout(
    reader: &mut OwnedReadHalf,
    buf: &mut BytesMut,
    timeout: Option<Duration>,
) -> io::Result<usize> {
    match timeout {
        Some(limit) => match time::timeout(limit, reader.read_buf(buf)).await {
            Ok(read) => read,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "read idle timeout")),
        },
        None => reader.read_buf(buf).await,
    }
}

async fn outbound_pump<M: Send + 'static>(
    conn: Connection<M>,
    writer: OwnedWriteHalf,
    rx: mpsc::Receiver<M>,
    protocol: SharedProtocol<M>,
    drain_timeout: Duration,
) {
    let outcome = AssertUnwindSafe(write_loop(&conn, writer, rx, &protocol, drain_timeout))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Some(reason)) => {
            conn.begin_close(reason);
        }
        Ok(None) => {}
        Err(_) => {
            tracing::error!("Outbound pump panicked");
            conn.begin_close(CloseReason::Panicked);
        }
    }
}

/// Returns the close reason when the pump itself failed.
async fn write_loop<M: Send + 'static>(
    conn: &Connection<M>,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<M>,
    protocol: &SharedProtocol<M>,
    drain_timeout: Duration,
) -> Option<CloseReason> {
    let mut closing = conn.closing_signal();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut deadline: Option<Instant> = None;

    loop {
        let message = tokio::select! {
            biased;
            _ = triggered(&mut closing) => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        buf.clear();
        if let Err(e) = protocol.encode(message, &mut buf) {
            rx.close();
            return Some(CloseReason::Encode(e));
        }

        let written = {
            let write = writer.write_all(&buf);
            tokio::pin!(write);
            tokio::select! {
                biased;
                result = &mut write => Some(result),
                _ = triggered(&mut closing) => {
                    // Let the frame in flight finish inside the drain window.
                    let until = *deadline.get_or_insert_with(|| Instant::now() + drain_timeout);
                    time::timeout_at(until, &mut write).await.ok()
                }
            }
        };

        match written {
            Some(Ok(())) => metrics::record_message_sent(),
            Some(Err(e)) => {
                rx.close();
                return Some(CloseReason::Io(e));
            }
            None => {
                tracing::debug!("Outbound write abandoned at close");
                rx.close();
                return None;
            }
        }
    }

    rx.close();
    let until = deadline.unwrap_or_else(|| Instant::now() + drain_timeout);
    match time::timeout_at(until, drain(&mut writer, &mut rx, protocol, &mut buf)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Outbound drain failed"),
        Err(_) => tracing::debug!("Outbound drain timed out"),
    }
    None
}

/// Flush whatever is still queued, then shut the write half.
async fn drain<M: Send + 'static>(
    writer: &mut OwnedWriteHalf,
    rx: &mut mpsc::Receiver<M>,
    protocol: &SharedProtocol<M>,
    buf: &mut BytesMut,
) -> io::Result<()> {
    while let Ok(message) = rx.try_recv() {
        buf.clear();
        if let Err(e) = protocol.encode(message, buf) {
            tracing::debug!(error = %e, "Dropping unencodable message during drain");
            continue;
        }
        writer.write_all(buf).await?;
        metrics::record_message_sent();
    }
    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::test_support::{
        connected_pair, options, read_frame, wait_until, write_frame, Recorder,
    };
    use crate::protocol::LengthPrefixed;
    use bytes::Bytes;

    fn open_with(
        stream: TcpStream,
        peer: SocketAddr,
        recorder: &Arc<Recorder>,
        options: &ConnectionOptions,
    ) -> (Connection<Bytes>, ConnectionDriver<Bytes>) {
        let handler: SharedHandler<Bytes> = recorder.clone();
        let protocol: SharedProtocol<Bytes> = Arc::new(LengthPrefixed::new());
        Connection::open(stream, peer, handler, protocol, options)
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_on_close_runs_once() {
        let (server_side, peer, _client) = connected_pair().await;
        let recorder = Arc::new(Recorder::default());
        let (conn, driver) = open_with(server_side, peer, &recorder, &options());
        driver.serve();

        conn.close();
        conn.close();
        assert!(wait_until(|| conn.is_closed()).await);
        conn.close();

        assert!(wait_until(|| recorder.closes.load(Ordering::SeqCst) == 1).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(conn.close_reason(), Some(CloseReason::Local)));
        assert_eq!(conn.try_send(Bytes::from_static(b"late")), Err(SendError::Closed));
    }

    #[tokio::test]
    async fn peer_eof_closes_connection() {
        let (server_side, peer, client) = connected_pair().await;
        let recorder = Arc::new(Recorder::default());
        let (conn, driver) = open_with(server_side, peer, &recorder, &options());
        driver.serve();

        assert!(wait_until(|| recorder.connects.load(Ordering::SeqCst) == 1).await);
        drop(client);

        assert!(wait_until(|| conn.is_closed()).await);
        assert!(matches!(conn.close_reason(), Some(CloseReason::PeerClosed)));
    }

    #[tokio::test]
    async fn messages_dispatch_in_wire_order() {
        let (server_side, peer, mut client) = connected_pair().await;
        let recorder = Arc::new(Recorder::default());
        let (_conn, driver) = open_with(server_side, peer, &recorder, &options());
        driver.serve();

        // All three frames in one write so they land in one read.
        let mut wire = Vec::new();
        for payload in [&b"F1"[..], b"F2", b"F3"] {
            wire.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            wire.extend_from_slice(payload);
        }
        client.write_all(&wire).await.unwrap();

        assert!(wait_until(|| recorder.messages().len() == 3).await);
        assert_eq!(
            recorder.messages(),
            vec![
                Bytes::from_static(b"F1"),
                Bytes::from_static(b"F2"),
                Bytes::from_static(b"F3"),
            ]
        );
    }

    #[tokio::test]
    async fn reject_policy_reports_full_queue() {
        let (server_side, peer, _client) = connected_pair().await;
        let recorder = Arc::new(Recorder::default());
        let mut opts = options();
        opts.queue_capacity = 2;
        opts.queue_full_policy = QueueFullPolicy::Reject;
        // Pumps not started, so nothing drains the queue.
        let (conn, _driver) = open_with(server_side, peer, &recorder, &opts);

        conn.send(Bytes::from_static(b"1")).await.unwrap();
        conn.send(Bytes::from_static(b"2")).await.unwrap();
        assert_eq!(conn.send(Bytes::from_static(b"3")).await, Err(SendError::QueueFull));
        assert_eq!(conn.try_send(Bytes::from_static(b"3")), Err(SendError::QueueFull));
    }

    #[tokio::test]
    async fn block_policy_waits_for_space_and_keeps_order() {
        let (server_side, peer, mut client) = connected_pair().await;
        let recorder = Arc::new(Recorder::default());
        let mut opts = options();
        opts.queue_capacity = 1;
        let (conn, driver) = open_with(server_side, peer, &recorder, &opts);

        conn.send(Bytes::from_static(b"M1")).await.unwrap();
        let blocked = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send(Bytes::from_static(b"M2")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished(), "second send must wait for space");

        driver.serve();
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("send unblocked")
            .unwrap()
            .unwrap();

        assert_eq!(&read_frame(&mut client).await[..], b"M1");
        assert_eq!(&read_frame(&mut client).await[..], b"M2");
    }

    #[tokio::test]
    async fn queued_messages_are_flushed_on_close() {
        let (server_side, peer, mut client) = connected_pair().await;
        let recorder = Arc::new(Recorder::default());
        let (conn, driver) = open_with(server_side, peer, &recorder, &options());

        conn.try_send(Bytes::from_static(b"a")).unwrap();
        conn.try_send(Bytes::from_static(b"b")).unwrap();
        conn.close();
        driver.serve();

        assert_eq!(&read_frame(&mut client).await[..], b"a");
        assert_eq!(&read_frame(&mut client).await[..], b"b");
        assert!(wait_until(|| conn.is_closed()).await);
    }

    #[tokio::test]
    async fn idle_read_timeout_closes_connection() {
        let (server_side, peer, _client) = connected_pair().await;
        let recorder = Arc::new(Recorder::default());
        let mut opts = options();
        opts.read_timeout = Some(Duration::from_millis(50));
        let (conn, driver) = open_with(server_side, peer, &recorder, &opts);
        assert_eq!(conn.read_timeout(), Some(Duration::from_millis(50)));
        driver.serve();

        assert!(wait_until(|| conn.is_closed()).await);
        assert!(matches!(conn.close_reason(), Some(CloseReason::ReadTimeout)));
    }

    #[tokio::test]
    async fn oversized_frame_is_a_decode_error() {
        let (server_side, peer, mut client) = connected_pair().await;
        let recorder = Arc::new(Recorder::default());
        let mut opts = options();
        opts.max_message_size = 16;
        let (conn, driver) = open_with(server_side, peer, &recorder, &opts);
        driver.serve();

        write_frame(&mut client, &[0u8; 17]).await;

        assert!(wait_until(|| conn.is_closed()).await);
        assert!(matches!(
            conn.close_reason(),
            Some(CloseReason::Protocol(ProtocolError::FrameTooLarge { size: 17, max: 16 }))
        ));
        assert!(recorder.messages().is_empty());
    }

    #[tokio::test]
    async fn handler_panic_closes_only_this_connection() {
        let (server_side, peer, mut client) = connected_pair().await;
        let recorder = Arc::new(Recorder::default());
        let (conn, driver) = open_with(server_side, peer, &recorder, &options());
        driver.serve();

        write_frame(&mut client, Recorder::PANIC).await;

        assert!(wait_until(|| conn.is_closed()).await);
        assert!(matches!(conn.close_reason(), Some(CloseReason::Panicked)));
        assert!(wait_until(|| recorder.closes.load(Ordering::SeqCst) == 1).await);
    }
}
