//! Blocking handoff queue between I/O tasks and a worker thread.
//!
//! Producers (socket tasks) push without waiting on the consumer; the
//! consumer blocks on the channel until an item arrives. Items come out in
//! the order they were pushed, across all producers.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// Unbounded multi-producer queue with a blocking consumer side.
///
/// Closing drops the only sender, so consumers see the backlog and then a
/// disconnect.
pub struct HandoffQueue<T> {
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
}

impl<T> HandoffQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    /// Append an item and wake one waiting consumer.
    ///
    /// Items pushed after [`Self::close`] are dropped.
    pub fn enqueue_and_notify(&self, item: T) {
        match self.sender.lock().as_ref() {
            // The receiver lives as long as the queue, so this cannot fail.
            Some(sender) => {
                let _ = sender.send(item);
            }
            None => tracing::debug!("handoff queue closed, dropping item"),
        }
    }

    /// Block until an item is available and return it.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn wait_for_dequeue(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Pop an item if one is ready.
    pub fn try_dequeue(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Stop accepting items and release every waiting consumer once the
    /// backlog is drained.
    pub fn close(&self) {
        self.sender.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_single_producer() {
        let queue = HandoffQueue::new();
        for i in 0..5 {
            queue.enqueue_and_notify(i);
        }
        assert_eq!(queue.len(), 5);
        let out: Vec<_> = (0..5).map(|_| queue.wait_for_dequeue().unwrap()).collect();
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn consumer_blocks_until_item() {
        let queue = Arc::new(HandoffQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_for_dequeue())
        };
        thread::sleep(Duration::from_millis(50));
        queue.enqueue_and_notify("late");
        assert_eq!(consumer.join().unwrap(), Some("late"));
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 500;

        let queue = Arc::new(HandoffQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = HashSet::new();
                for _ in 0..PRODUCERS * PER_PRODUCER {
                    let item = queue.wait_for_dequeue().unwrap();
                    assert!(seen.insert(item), "duplicate item {:?}", item);
                }
                seen
            })
        };

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.enqueue_and_notify((p, i));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let seen = consumer.join().unwrap();
        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
        assert!(queue.is_empty());
    }

    #[test]
    fn close_drains_then_ends() {
        let queue = HandoffQueue::new();
        queue.enqueue_and_notify(1);
        queue.close();
        queue.enqueue_and_notify(2);
        assert!(queue.is_closed());
        assert_eq!(queue.wait_for_dequeue(), Some(1));
        assert_eq!(queue.wait_for_dequeue(), None);
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let queue: Arc<HandoffQueue<u8>> = Arc::new(HandoffQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_for_dequeue())
        };
        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }
}
