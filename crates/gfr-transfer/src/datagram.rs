//! Unreliable datagram channel
//!
//! Wraps a tokio `UdpSocket` with:
//! - Configurable send/receive buffer sizes (via socket2)
//! - A receive loop that re-arms straight after handing each datagram off
//! - Fire-and-forget sends whose failures are only logged
//!
//! The whole datagram is the message. Nothing is framed, split or merged.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::queue::HandoffQueue;
use crate::types::{BufferItem, PeerAddr, Receiver};
use crate::worker::{join_worker, spawn_worker};

/// Datagram channel configuration
#[derive(Debug, Clone)]
pub struct DatagramConfig {
    /// Address to bind to
    pub bind: SocketAddr,
    /// Size of the receive buffer; longer datagrams are truncated by the OS
    pub recv_buffer: usize,
    /// Send buffer size in bytes
    pub sndbuf: usize,
    /// Receive buffer size in bytes
    pub rcvbuf: usize,
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 9000)),
            recv_buffer: 64 * 1024,
            sndbuf: 4 * 1024 * 1024, // 4MB
            rcvbuf: 4 * 1024 * 1024, // 4MB
        }
    }
}

/// Bind to the given address with configured buffer sizes
async fn bind_udp(addr: SocketAddr, sndbuf: usize, rcvbuf: usize) -> Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    // Set buffer sizes before binding
    socket.set_send_buffer_size(sndbuf)?;
    socket.set_recv_buffer_size(rcvbuf)?;
    socket.set_reuse_address(true)?;

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Cloneable send side of a [`DatagramChannel`].
///
/// Usable from any thread, including the channel's own worker.
#[derive(Clone)]
pub struct DatagramSender {
    socket: Arc<UdpSocket>,
    runtime: Handle,
}

impl DatagramSender {
    /// Send `payload` as one datagram to `host:port`.
    ///
    /// Returns immediately. Resolution and transmission happen on the
    /// runtime; failures are logged and the datagram is lost.
    pub fn send(&self, host: &str, port: u16, payload: impl Into<Bytes>) {
        let payload = payload.into();
        let target = PeerAddr::new(host, port);
        let socket = Arc::clone(&self.socket);

        self.runtime.spawn(async move {
            let addrs = match target.resolve().await {
                Ok(addrs) => addrs,
                Err(e) => {
                    warn!("UDP send to {} dropped: {}", target, e);
                    return;
                }
            };
            // Prefer an address of the socket's own family.
            let v4 = socket.local_addr().map(|a| a.is_ipv4()).unwrap_or(true);
            let addr = addrs
                .iter()
                .copied()
                .find(|a| a.is_ipv4() == v4)
                .unwrap_or(addrs[0]);

            match socket.send_to(&payload, addr).await {
                Ok(n) => debug!("UDP sent {} bytes to {}", n, addr),
                Err(e) => warn!("UDP send to {} failed: {}", addr, e),
            }
        });
    }
}

/// Unreliable transport: one socket, one receive loop, one worker thread.
pub struct DatagramChannel {
    sender: DatagramSender,
    local_addr: SocketAddr,
    queue: Arc<HandoffQueue<BufferItem>>,
    recv_task: JoinHandle<()>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl DatagramChannel {
    /// Bind the socket and start delivering datagrams to `receiver`.
    ///
    /// Must be called from within a tokio runtime. A bind failure is the
    /// only error this channel ever reports.
    pub async fn listen(config: DatagramConfig, receiver: Arc<dyn Receiver>) -> Result<Self> {
        let socket = Arc::new(bind_udp(config.bind, config.sndbuf, config.rcvbuf).await?);
        let local_addr = socket.local_addr()?;

        let queue = Arc::new(HandoffQueue::new());
        let worker = spawn_worker(
            &format!("gfr-udp-{}", local_addr.port()),
            Arc::clone(&queue),
            receiver,
            |_| {},
        )?;

        let recv_task = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            Arc::clone(&queue),
            config.recv_buffer,
        ));

        info!(
            "UDP channel bound to {} (sndbuf={}, rcvbuf={})",
            local_addr, config.sndbuf, config.rcvbuf
        );

        Ok(Self {
            sender: DatagramSender {
                socket,
                runtime: Handle::current(),
            },
            local_addr,
            queue,
            recv_task,
            worker: Some(worker),
        })
    }

    /// See [`DatagramSender::send`].
    pub fn send(&self, host: &str, port: u16, payload: impl Into<Bytes>) {
        self.sender.send(host, port, payload);
    }

    /// A cloneable handle for sending from elsewhere.
    pub fn sender(&self) -> DatagramSender {
        self.sender.clone()
    }

    /// The address this channel is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop receiving and wait for the worker to finish the backlog.
    pub fn shutdown(mut self) {
        self.recv_task.abort();
        self.queue.close();
        if let Some(worker) = self.worker.take() {
            join_worker(worker);
        }
        info!("UDP channel on {} shut down", self.local_addr);
    }
}

impl Drop for DatagramChannel {
    fn drop(&mut self) {
        self.recv_task.abort();
        self.queue.close();
    }
}

/// Receive forever. Each datagram is copied out and queued before the next
/// receive is issued; errors skip that one datagram.
async fn receive_loop(socket: Arc<UdpSocket>, queue: Arc<HandoffQueue<BufferItem>>, buf_len: usize) {
    let mut buf = vec![0u8; buf_len];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => {
                debug!("UDP recv {} bytes from {}", len, src);
                let payload = Bytes::copy_from_slice(&buf[..len]);
                queue.enqueue_and_notify(BufferItem::new(PeerAddr::from(src), payload));
            }
            Err(e) => {
                warn!("UDP recv error, datagram ignored: {}", e);
            }
        }
    }
}
