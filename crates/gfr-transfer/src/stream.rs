//! Reliable framed stream channel.
//!
//! Connections are transactional: each direction carries exactly one
//! length-prefixed frame (see [`crate::frame`]) and the connection is torn
//! down once the exchange is over.
//!
//! # Connection table
//!
//! When an inbound frame completes, the write half of its connection is
//! parked in a table keyed by the peer's `host:port`. A [`Receiver`] that
//! calls [`StreamSender::send`] for that same address answers on the parked
//! connection. Once the receiver returns, the worker drops whatever is still
//! parked for that address, closing connections nobody answered.
//!
//! Sending to an address with nothing parked opens a fresh connection,
//! writes the frame, and waits on that connection for the peer's single
//! reply frame, which is delivered like any other inbound message.
//!
//! The table sits behind its own mutex and is never held across an await.

use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use socket2::SockRef;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::frame::{encode_frame, read_frame, DEFAULT_MAX_FRAME_LEN};
use crate::queue::HandoffQueue;
use crate::types::{BufferItem, PeerAddr, Receiver};
use crate::worker::{join_worker, spawn_worker};

/// Stream channel configuration
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Address to listen on
    pub bind: SocketAddr,
    /// Largest frame a peer may declare
    pub max_frame_len: u32,
    /// Disable Nagle on every connection
    pub nodelay: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 9001)),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            nodelay: true,
        }
    }
}

struct Shared {
    queue: Arc<HandoffQueue<BufferItem>>,
    connections: Mutex<HashMap<String, OwnedWriteHalf>>,
    max_frame_len: u32,
    nodelay: bool,
    runtime: Handle,
}

impl Shared {
    /// Read the one frame an accepted connection carries, then park its
    /// write half for a reply and queue the message.
    async fn serve_inbound(self: Arc<Self>, mut stream: TcpStream, addr: SocketAddr) {
        if self.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                debug!("set_nodelay on {} failed: {}", addr, e);
            }
        }

        match read_frame(&mut stream, self.max_frame_len).await {
            Ok(Some(payload)) => {
                debug!("TCP frame of {} bytes from {}", payload.len(), addr);
                let peer = PeerAddr::from(addr);
                if let Err(e) = shutdown_read(&stream) {
                    debug!("read shutdown on {} failed: {}", addr, e);
                }
                let (_read, write) = stream.into_split();
                self.connections.lock().insert(peer.to_string(), write);
                self.queue.enqueue_and_notify(BufferItem::new(peer, payload));
            }
            Ok(None) => debug!("{} closed before sending a frame", addr),
            Err(e) => warn!("TCP read from {} failed: {}", addr, e),
        }
    }

    /// Resolve, connect, write one frame, then wait for the single reply.
    async fn exchange(self: Arc<Self>, target: PeerAddr, frame: Bytes) -> Result<()> {
        let stream = connect_any(&target, self.nodelay).await?;
        let remote = stream.peer_addr()?;
        let (mut read, mut write) = stream.into_split();

        write.write_all(&frame).await?;
        write.shutdown().await?;
        debug!("TCP sent {} byte frame to {}", frame.len(), remote);

        match read_frame(&mut read, self.max_frame_len).await? {
            Some(reply) => {
                debug!("TCP reply of {} bytes from {}", reply.len(), remote);
                self.queue
                    .enqueue_and_notify(BufferItem::new(PeerAddr::from(remote), reply));
            }
            None => debug!("{} closed without replying", remote),
        }
        Ok(())
    }
}

/// Try each resolved address in turn until one accepts.
async fn connect_any(target: &PeerAddr, nodelay: bool) -> Result<TcpStream> {
    let mut last_err = None;
    for addr in target.resolve().await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if nodelay {
                    stream.set_nodelay(true)?;
                }
                return Ok(stream);
            }
            Err(e) => {
                debug!("connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(match last_err {
        Some(e) => Error::Io(e),
        None => Error::Resolve(target.to_string()),
    })
}

/// The inbound direction carries one frame; close it once that frame is in.
fn shutdown_read(stream: &TcpStream) -> std::io::Result<()> {
    SockRef::from(stream).shutdown(Shutdown::Read)
}

async fn write_parked(mut write: OwnedWriteHalf, frame: Bytes) -> Result<()> {
    write.write_all(&frame).await?;
    write.shutdown().await?;
    Ok(())
}

/// Cloneable send side of a [`FramedStreamChannel`].
///
/// Usable from any thread, including from inside a [`Receiver`].
#[derive(Clone)]
pub struct StreamSender {
    shared: Arc<Shared>,
}

impl StreamSender {
    /// Send `payload` as one frame to `host:port`.
    ///
    /// Answers on a parked inbound connection from that address if there is
    /// one, otherwise opens a new connection. Returns immediately; failures
    /// are logged and not retried.
    pub fn send(&self, host: &str, port: u16, payload: impl Into<Bytes>) {
        let payload = payload.into();
        let target = PeerAddr::new(host, port);
        let frame = match encode_frame(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("TCP send to {} dropped: {}", target, e);
                return;
            }
        };

        // Taken synchronously so the worker's cleanup cannot race it.
        let parked = self.shared.connections.lock().remove(&target.to_string());
        let shared = Arc::clone(&self.shared);

        self.shared.runtime.spawn(async move {
            let result = match parked {
                Some(write) => {
                    debug!("TCP replying to {} on its connection", target);
                    write_parked(write, frame).await
                }
                None => shared.exchange(target.clone(), frame).await,
            };
            if let Err(e) = result {
                warn!("TCP send to {} failed: {}", target, e);
            }
        });
    }

    /// Number of inbound connections waiting for a reply.
    pub fn parked_connections(&self) -> usize {
        self.shared.connections.lock().len()
    }
}

/// Reliable transport: an accept loop, per-connection reader tasks and one
/// worker thread.
pub struct FramedStreamChannel {
    sender: StreamSender,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl FramedStreamChannel {
    /// Bind the listener and start delivering frames to `receiver`.
    ///
    /// Must be called from within a tokio runtime. A bind failure is the
    /// only error this channel ever reports.
    pub async fn listen(config: StreamConfig, receiver: Arc<dyn Receiver>) -> Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            queue: Arc::new(HandoffQueue::new()),
            connections: Mutex::new(HashMap::new()),
            max_frame_len: config.max_frame_len,
            nodelay: config.nodelay,
            runtime: Handle::current(),
        });

        let cleanup = Arc::clone(&shared);
        let worker = spawn_worker(
            &format!("gfr-tcp-{}", local_addr.port()),
            Arc::clone(&shared.queue),
            receiver,
            move |peer| {
                if cleanup.connections.lock().remove(&peer.to_string()).is_some() {
                    debug!("closing unanswered connection from {}", peer);
                }
            },
        )?;

        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));

        info!("TCP channel listening on {}", local_addr);

        Ok(Self {
            sender: StreamSender { shared },
            local_addr,
            accept_task,
            worker: Some(worker),
        })
    }

    /// See [`StreamSender::send`].
    pub fn send(&self, host: &str, port: u16, payload: impl Into<Bytes>) {
        self.sender.send(host, port, payload);
    }

    /// A cloneable handle for sending from elsewhere.
    pub fn sender(&self) -> StreamSender {
        self.sender.clone()
    }

    /// The address this channel listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait for the worker to finish the backlog.
    pub fn shutdown(mut self) {
        self.accept_task.abort();
        self.sender.shared.queue.close();
        if let Some(worker) = self.worker.take() {
            join_worker(worker);
        }
        self.sender.shared.connections.lock().clear();
        info!("TCP channel on {} shut down", self.local_addr);
    }
}

impl Drop for FramedStreamChannel {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.sender.shared.queue.close();
    }
}

/// Accept forever; a failed accept is logged and the loop goes on.
async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Incoming TCP connection from {}", addr);
                tokio::spawn(Arc::clone(&shared).serve_inbound(stream, addr));
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::sync::mpsc;

    type Delivery = (String, u16, Bytes);

    fn loopback() -> StreamConfig {
        StreamConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }
    }

    fn collector() -> (Arc<dyn Receiver>, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let receiver = move |host: &str, port: u16, payload: Bytes| {
            let _ = tx.send((host.to_string(), port, payload));
        };
        (Arc::new(receiver), rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("receiver dropped")
    }

    #[tokio::test]
    async fn test_frame_delivered_with_source() {
        let (receiver, mut rx) = collector();
        let server = FramedStreamChannel::listen(loopback(), receiver).await.unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        let client_port = client.local_addr().unwrap().port();
        client.write_all(&encode_frame(b"hello").unwrap()).await.unwrap();

        let (host, port, payload) = next(&mut rx).await;
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, client_port);
        assert_eq!(payload, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_read_side_closed_after_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (mut accepted, _) = listener.accept().await.unwrap();

        shutdown_read(&accepted).unwrap();
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(5), accepted.read(&mut buf))
            .await
            .expect("read after shutdown should not block")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_chunked_writes_reassemble() {
        let (receiver, mut rx) = collector();
        let server = FramedStreamChannel::listen(loopback(), receiver).await.unwrap();

        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let wire = encode_frame(&payload).unwrap();
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.set_nodelay(true).unwrap();
        for chunk in wire.chunks(777) {
            client.write_all(chunk).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(next(&mut rx).await.2.to_vec(), payload);
    }

    #[tokio::test]
    async fn test_partial_frame_delivered_on_disconnect() {
        let (receiver, mut rx) = collector();
        let server = FramedStreamChannel::listen(loopback(), receiver).await.unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(&100u32.to_be_bytes()).await.unwrap();
        client.write_all(b"only ten b").await.unwrap();
        drop(client);

        assert_eq!(next(&mut rx).await.2, Bytes::from_static(b"only ten b"));
        assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_frame_dropped() {
        let (receiver, mut rx) = collector();
        let config = StreamConfig {
            max_frame_len: 16,
            ..loopback()
        };
        let server = FramedStreamChannel::listen(config, receiver).await.unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(&1000u32.to_be_bytes()).await.unwrap();
        drop(client);

        assert!(tokio::time::timeout(Duration::from_millis(300), rx.recv()).await.is_err());

        // The accept loop keeps serving other peers.
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(&encode_frame(b"small").unwrap()).await.unwrap();
        assert_eq!(next(&mut rx).await.2, Bytes::from_static(b"small"));
    }

    #[tokio::test]
    async fn test_channel_to_channel_send() {
        let (r1, _rx1) = collector();
        let (r2, mut rx2) = collector();
        let c1 = FramedStreamChannel::listen(loopback(), r1).await.unwrap();
        let c2 = FramedStreamChannel::listen(loopback(), r2).await.unwrap();

        c1.send("localhost", c2.local_addr().port(), &b"request"[..]);
        let (host, _, payload) = next(&mut rx2).await;
        assert_eq!(host, "127.0.0.1");
        assert_eq!(payload, Bytes::from_static(b"request"));
    }

    #[tokio::test]
    async fn test_reply_on_same_connection() {
        let (r1, mut rx1) = collector();
        let c1 = FramedStreamChannel::listen(loopback(), r1).await.unwrap();

        let slot: Arc<OnceLock<StreamSender>> = Arc::new(OnceLock::new());
        let echo_slot = Arc::clone(&slot);
        let echo = move |host: &str, port: u16, payload: Bytes| {
            if let Some(sender) = echo_slot.get() {
                let mut reply = b"echo:".to_vec();
                reply.extend_from_slice(&payload);
                sender.send(host, port, reply);
            }
        };
        let c2 = FramedStreamChannel::listen(loopback(), Arc::new(echo)).await.unwrap();
        let _ = slot.set(c2.sender());

        c1.send("127.0.0.1", c2.local_addr().port(), &b"hi"[..]);

        let (_, port, payload) = next(&mut rx1).await;
        assert_eq!(port, c2.local_addr().port());
        assert_eq!(payload, Bytes::from_static(b"echo:hi"));
        assert_eq!(c2.sender().parked_connections(), 0);
    }

    #[tokio::test]
    async fn test_raw_client_gets_reply_then_eof() {
        let slot: Arc<OnceLock<StreamSender>> = Arc::new(OnceLock::new());
        let echo_slot = Arc::clone(&slot);
        let echo = move |host: &str, port: u16, payload: Bytes| {
            if let Some(sender) = echo_slot.get() {
                sender.send(host, port, payload);
            }
        };
        let server = FramedStreamChannel::listen(loopback(), Arc::new(echo)).await.unwrap();
        let _ = slot.set(server.sender());

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(&encode_frame(b"mirror").unwrap()).await.unwrap();

        let mut wire = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut wire))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wire, encode_frame(b"mirror").unwrap().to_vec());
    }

    #[tokio::test]
    async fn test_unanswered_connection_closed() {
        let (receiver, mut rx) = collector();
        let server = FramedStreamChannel::listen(loopback(), receiver).await.unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(&encode_frame(b"no reply").unwrap()).await.unwrap();
        next(&mut rx).await;

        let mut wire = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut wire))
            .await
            .unwrap()
            .unwrap();
        assert!(wire.is_empty());
        assert_eq!(server.sender().parked_connections(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_is_silent() {
        let (receiver, mut rx) = collector();
        let server = FramedStreamChannel::listen(loopback(), receiver).await.unwrap();

        // Grab a free port and close it again.
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = unused.local_addr().unwrap().port();
        drop(unused);

        server.send("127.0.0.1", port, &b"nobody home"[..]);
        assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.is_err());
        server.shutdown();
    }
}
