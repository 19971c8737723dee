//! Peer connection module
//!
//! Drives one metadata fetch attempt against one peer. The socket is split
//! in two: a read loop feeds inbound bytes to the [`MetadataMachine`] and
//! forwards the resulting actions, while a dispatch task owns the write
//! half, writes outbound frames and reports events. The first terminal
//! event ends the attempt and both tasks are torn down.

use crate::cli::FetchConfig;
use crate::error::TorrentError;
use crate::peer::event::LifecycleEvent;
use crate::peer::state::{Action, MetadataMachine};
use crate::torrent::MetadataResult;
use anyhow::Result;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, trace, warn};

const READ_BUFFER_SIZE: usize = 4096;

type Outcome = Result<MetadataResult, TorrentError>;

/// Fetches the info dictionary for one info hash from one peer
#[derive(Debug, Clone)]
pub struct MetadataFetcher {
    info_hash: [u8; 20],
    addr: SocketAddr,
    config: FetchConfig,
}

/// Aborts every task it holds when dropped
#[derive(Default)]
struct TaskSet(Vec<JoinHandle<()>>);

impl TaskSet {
    fn spawn<F>(&mut self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.0.push(tokio::spawn(future));
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

impl MetadataFetcher {
    pub fn new(info_hash: [u8; 20], addr: SocketAddr, config: FetchConfig) -> Self {
        Self { info_hash, addr, config }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Run the attempt to completion.
    ///
    /// Resolves with the decoded metadata, or with the first error the
    /// attempt hits. The attempt never outlives `attempt_timeout`.
    pub async fn fetch(self) -> Result<MetadataResult> {
        self.config.validate()?;
        info!("Fetching metadata for {} from {}", hex::encode(self.info_hash), self.addr);

        let limit = self.config.attempt_timeout;
        let outcome = match timeout(limit, self.run()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Fetch from {} timed out after {:?}", self.addr, limit);
                Err(TorrentError::network_error_full(
                    "Fetch attempt timed out",
                    self.addr.to_string(),
                    format!("no result within {:?}", limit),
                ))
            }
        };

        match &outcome {
            Ok(result) => info!("Fetched metadata '{}' from {}", result.name, self.addr),
            Err(e) => error!("Fetch from {} failed: {}", self.addr, e),
        }
        Ok(outcome?)
    }

    async fn run(&self) -> Outcome {
        let stream = self.connect().await?;
        let (reader, writer) = stream.into_split();

        let peer_id = self.config.resolve_peer_id();
        let machine = MetadataMachine::new(self.info_hash, peer_id).with_verification(self.config.verify_info_hash);
        let handshake = machine.start();

        let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(1);
        let (event_tx, event_rx) = mpsc::channel::<LifecycleEvent>(1);
        let (result_tx, result_rx) = oneshot::channel::<Outcome>();
        let (ready_tx, ready_rx) = oneshot::channel::<()>();

        // Dropping `tasks` on any return path, or when the attempt timeout
        // cancels this future, aborts both loops and closes the socket.
        let mut tasks = TaskSet::default();
        tasks.spawn(dispatch_loop(writer, outbound_rx, event_rx, ready_tx, result_tx, self.addr));

        ready_rx
            .await
            .map_err(|_| TorrentError::peer_error_full("Dispatch task failed to start", self.addr.to_string(), "ready signal dropped"))?;

        debug!("Sending handshake to {}", self.addr);
        outbound_tx
            .send(handshake)
            .await
            .map_err(|_| TorrentError::peer_error_full("Failed to queue handshake", self.addr.to_string(), "dispatch task exited"))?;

        tasks.spawn(read_loop(reader, machine, outbound_tx, event_tx, self.config.idle_timeout, self.addr));

        result_rx.await.unwrap_or_else(|_| {
            Err(TorrentError::peer_error_full(
                "Connection ended without a result",
                self.addr.to_string(),
                "result channel closed",
            ))
        })
    }

    async fn connect(&self) -> Result<TcpStream, TorrentError> {
        debug!("Connecting to peer: {}", self.addr);

        let socket = timeout(self.config.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|e| {
                warn!("Connection timeout to {}", self.addr);
                TorrentError::network_error_full("Connection timeout", self.addr.to_string(), e.to_string())
            })?
            .map_err(|e| {
                error!("Failed to connect to {}: {}", self.addr, e);
                TorrentError::network_error_full("Failed to connect", self.addr.to_string(), e.to_string())
            })?;

        if let Err(e) = socket.set_nodelay(true) {
            trace!("Could not set TCP_NODELAY on {}: {}", self.addr, e);
        }
        info!("Connected to peer: {}", self.addr);
        Ok(socket)
    }
}

/// Owns the write half: writes outbound frames and routes events
async fn dispatch_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Bytes>,
    mut events: mpsc::Receiver<LifecycleEvent>,
    ready: oneshot::Sender<()>,
    result: oneshot::Sender<Outcome>,
    addr: SocketAddr,
) {
    if ready.send(()).is_err() {
        return;
    }

    loop {
        tokio::select! {
            Some(data) = outbound.recv() => {
                trace!("Writing {} bytes to {}", data.len(), addr);
                if let Err(e) = writer.write_all(&data).await {
                    error!("Failed to write to {}: {}", addr, e);
                    let _ = result.send(Err(TorrentError::network_error_full(
                        "Failed to send message",
                        addr.to_string(),
                        e.to_string(),
                    )));
                    return;
                }
            }
            Some(event) = events.recv() => {
                log_event(&event, addr);
                if let Some(outcome) = event.into_outcome() {
                    let _ = result.send(outcome);
                    return;
                }
            }
            else => {
                debug!("Channels to {} closed", addr);
                return;
            }
        }
    }
}

fn log_event(event: &LifecycleEvent, addr: SocketAddr) {
    match event {
        LifecycleEvent::HandshakeOk { peer_id } => {
            debug!("Handshake with {} complete, peer id {}", addr, String::from_utf8_lossy(peer_id));
        }
        LifecycleEvent::ExtendedOk { metadata_size, piece_count } => {
            info!("{} advertises {} bytes of metadata in {} pieces", addr, metadata_size, piece_count);
        }
        LifecycleEvent::PieceReceived { index, received, piece_count } => {
            debug!("Piece {} from {} ({}/{})", index, addr, received, piece_count);
        }
        LifecycleEvent::Done(result) => {
            debug!("Metadata from {} complete: '{}'", addr, result.name);
        }
        LifecycleEvent::Error(e) => {
            debug!("Attempt against {} ended with error: {}", addr, e);
        }
    }
}

/// Owns the read half: feeds the machine and forwards its actions in order
async fn read_loop(
    mut reader: OwnedReadHalf,
    mut machine: MetadataMachine,
    outbound: mpsc::Sender<Bytes>,
    events: mpsc::Sender<LifecycleEvent>,
    idle_timeout: Duration,
    addr: SocketAddr,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = match timeout(idle_timeout, reader.read(&mut buf)).await {
            Ok(Ok(0)) => Err(TorrentError::peer_error_full(
                "Peer closed the connection",
                addr.to_string(),
                "end of stream",
            )),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(TorrentError::network_error_full("Failed to read from peer", addr.to_string(), e.to_string())),
            Err(_) => Err(TorrentError::network_error_full(
                "Peer idle timeout",
                addr.to_string(),
                format!("no data for {:?}", idle_timeout),
            )),
        };

        let n = match read {
            Ok(n) => n,
            Err(e) => {
                warn!("Reading from {} stopped: {}", addr, e);
                let _ = events.send(LifecycleEvent::Error(e)).await;
                return;
            }
        };

        trace!("Read {} bytes from {}", n, addr);
        for action in machine.feed(&buf[..n]) {
            let delivered = match action {
                Action::Send(data) => outbound.send(data).await.is_ok(),
                Action::Event(event) => events.send(event).await.is_ok(),
            };
            if !delivered {
                return;
            }
        }

        if machine.is_finished() {
            debug!("Metadata exchange with {} finished", addr);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::testing::*;
    use crate::protocol::decode_prefix;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    async fn read_frame(socket: &mut TcpStream) -> Vec<u8> {
        let mut prefix = [0u8; 4];
        socket.read_exact(&mut prefix).await.unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(prefix) as usize];
        socket.read_exact(&mut body).await.unwrap();
        body
    }

    async fn accept_handshake(listener: &TcpListener, info_hash: [u8; 20]) -> TcpStream {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut handshake = [0u8; 68];
        socket.read_exact(&mut handshake).await.unwrap();
        assert_eq!(handshake[0], 19);
        assert_eq!(&handshake[28..48], &info_hash);
        socket
    }

    /// Answers the handshake, then serves every piece the client asks for
    async fn serve_metadata(listener: TcpListener, metadata: Vec<u8>, info_hash: [u8; 20]) {
        let mut socket = accept_handshake(&listener, info_hash).await;
        socket.write_all(&peer_handshake(info_hash)).await.unwrap();

        let ext = read_frame(&mut socket).await;
        assert_eq!(&ext[..2], &[20, 0]);
        socket
            .write_all(&extended_handshake(REMOTE_UT_METADATA as i64, metadata.len() as i64))
            .await
            .unwrap();
        socket.write_all(&bitfield_message()).await.unwrap();

        let piece_count = metadata.len().div_ceil(16384);
        let mut requested = Vec::new();
        for _ in 0..piece_count {
            let request = read_frame(&mut socket).await;
            assert_eq!(&request[..2], &[20, REMOTE_UT_METADATA]);
            let (dict, _) = decode_prefix(&request[2..]).unwrap();
            requested.push(dict.get(b"piece").and_then(|p| p.as_int()).unwrap() as usize);
        }

        for index in requested.into_iter().rev() {
            socket.write_all(&data_piece(&metadata, index)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    fn fast_config() -> FetchConfig {
        FetchConfig::default()
            .with_connect_timeout(Duration::from_secs(2))
            .with_idle_timeout(Duration::from_secs(2))
            .with_attempt_timeout(Duration::from_secs(5))
    }

    fn torrent_error(err: anyhow::Error) -> TorrentError {
        err.downcast::<TorrentError>().expect("error should be a TorrentError")
    }

    #[tokio::test]
    async fn test_fetch_from_mock_peer() {
        let (metadata, hash) = fixture(20000);
        let (listener, addr) = listener().await;
        tokio::spawn(serve_metadata(listener, metadata.clone(), hash));

        let result = MetadataFetcher::new(hash, addr, fast_config()).fetch().await.unwrap();
        assert_eq!(result.info_hash, hash);
        assert_eq!(result.name, "fixture.bin");
        assert_eq!(result.length, Some(20000));
        assert_eq!(result.total_size(), 20000);
    }

    #[tokio::test]
    async fn test_fetch_large_metadata() {
        let (metadata, hash) = fixture(100_000);
        let (listener, addr) = listener().await;
        tokio::spawn(serve_metadata(listener, metadata, hash));

        let result = MetadataFetcher::new(hash, addr, fast_config()).fetch().await.unwrap();
        assert_eq!(result.length, Some(100_000));
    }

    #[tokio::test]
    async fn test_wrong_protocol_string() {
        let hash = [0x22; 20];
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let mut socket = accept_handshake(&listener, hash).await;
            socket.write_all(&raw_handshake(b"Foo protocol", [0xff; 8], hash)).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let err = torrent_error(MetadataFetcher::new(hash, addr, fast_config()).fetch().await.unwrap_err());
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
        assert!(err.to_string().contains("not BitTorrent protocol"));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let (listener, addr) = listener().await;
        drop(listener);

        let err = torrent_error(MetadataFetcher::new([0x33; 20], addr, fast_config()).fetch().await.unwrap_err());
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_peer_closes_connection() {
        let hash = [0x44; 20];
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let mut socket = accept_handshake(&listener, hash).await;
            socket.write_all(&peer_handshake(hash)).await.unwrap();
            read_frame(&mut socket).await;
        });

        let err = torrent_error(MetadataFetcher::new(hash, addr, fast_config()).fetch().await.unwrap_err());
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_idle_peer_times_out() {
        let hash = [0x55; 20];
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let _socket = accept_handshake(&listener, hash).await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let config = fast_config().with_idle_timeout(Duration::from_millis(200));
        let err = torrent_error(MetadataFetcher::new(hash, addr, config).fetch().await.unwrap_err());
        assert!(err.to_string().contains("idle timeout"));
    }

    #[tokio::test]
    async fn test_attempt_timeout_with_keepalives() {
        let hash = [0x66; 20];
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let mut socket = accept_handshake(&listener, hash).await;
            socket.write_all(&peer_handshake(hash)).await.unwrap();
            for _ in 0..100 {
                if socket.write_all(&keepalive()).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });

        let config = fast_config()
            .with_idle_timeout(Duration::from_millis(300))
            .with_attempt_timeout(Duration::from_millis(400));
        let err = torrent_error(MetadataFetcher::new(hash, addr, config).fetch().await.unwrap_err());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = FetchConfig::default().with_attempt_timeout(Duration::ZERO);
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let err = torrent_error(MetadataFetcher::new([0u8; 20], addr, config).fetch().await.unwrap_err());
        assert!(matches!(err, TorrentError::ConfigError { .. }));
    }
}
