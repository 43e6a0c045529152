//! Dedicated delivery thread shared by both channels.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::queue::HandoffQueue;
use crate::types::{BufferItem, PeerAddr, Receiver};

/// Spawn the thread that drains `queue` into `receiver`.
///
/// `after` runs once per message after the receiver returns, or after it
/// panics; a panic is logged and the next message is delivered as usual.
/// The thread exits when the queue is closed and empty.
pub(crate) fn spawn_worker<A>(
    name: &str,
    queue: Arc<HandoffQueue<BufferItem>>,
    receiver: Arc<dyn Receiver>,
    after: A,
) -> std::io::Result<JoinHandle<()>>
where
    A: Fn(&PeerAddr) + Send + 'static,
{
    let thread_name = name.to_string();
    thread::Builder::new().name(thread_name.clone()).spawn(move || {
        tracing::debug!("{} started", thread_name);
        while let Some(item) = queue.wait_for_dequeue() {
            let peer = item.peer;
            let payload = item.payload;
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                receiver.receive(&peer.host, peer.port, payload)
            }));
            if delivered.is_err() {
                tracing::error!("{}: receiver panicked on message from {}", thread_name, peer);
            }
            after(&peer);
        }
        tracing::debug!("{} stopped", thread_name);
    })
}

/// Join a worker unless we are running on it.
pub(crate) fn join_worker(handle: JoinHandle<()>) {
    if handle.thread().id() == thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        tracing::error!("worker thread panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use parking_lot::Mutex;

    #[test]
    fn panicking_receiver_does_not_stop_worker() {
        let queue = Arc::new(HandoffQueue::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cleaned = Arc::new(Mutex::new(Vec::new()));

        let receiver = {
            let seen = Arc::clone(&seen);
            move |_host: &str, _port: u16, payload: Bytes| {
                if payload.as_ref() == b"boom" {
                    panic!("bad message");
                }
                seen.lock().push(payload);
            }
        };
        let after = {
            let cleaned = Arc::clone(&cleaned);
            move |peer: &PeerAddr| cleaned.lock().push(peer.port)
        };

        let handle = spawn_worker("test-worker", Arc::clone(&queue), Arc::new(receiver), after).unwrap();
        for (port, body) in [(1, "boom"), (2, "ok")] {
            queue.enqueue_and_notify(BufferItem::new(PeerAddr::new("h", port), Bytes::from(body)));
        }
        queue.close();
        handle.join().unwrap();

        assert_eq!(*seen.lock(), vec![Bytes::from_static(b"ok")]);
        assert_eq!(*cleaned.lock(), vec![1, 2]);
    }
}
