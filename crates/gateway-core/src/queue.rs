//! A bounded FIFO with a secondary integer priority, drained by a fixed
//! worker pool. Enqueue must never block the MQTT receive thread.

use crate::domain::Request;
use std::collections::BinaryHeap;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use tokio::sync::Notify;

struct Entry {
    priority: i32,
    seq: u64,
    request: Request,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    /// Higher priority first; within the same priority, lower `seq` (older,
    /// i.e. FIFO) first. `BinaryHeap` is a max-heap, so "pop first" means
    /// "compares greatest", hence the reversed `seq` comparison.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Bounded priority FIFO. `try_enqueue` is a synchronous, non-blocking
/// try-offer: it never awaits, so it is safe to call from the MQTT receive
/// path without risking head-of-line blocking of ingress.
pub struct MessageQueue {
    capacity: usize,
    heap: Mutex<BinaryHeap<Entry>>,
    notify: Notify,
    seq: AtomicU64,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Attempts to enqueue `request`. Returns it back to the caller if the
    /// queue is at `capacity`.
    pub fn try_enqueue(&self, request: Request) -> Result<(), Request> {
        let mut heap = self.heap.lock().unwrap();
        if heap.len() >= self.capacity {
            return Err(request);
        }
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let priority = request.priority;
        heap.push(Entry { priority, seq, request });
        drop(heap);
        self.notify.notify_one();
        Ok(())
    }

    /// Dequeues the next request by priority, then FIFO order; awaits if
    /// the queue is empty.
    pub async fn dequeue(&self) -> Request {
        loop {
            let notified = self.notify.notified();
            {
                let mut heap = self.heap.lock().unwrap();
                if let Some(entry) = heap.pop() {
                    return entry.request;
                }
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn request(session_id: &str, priority: i32) -> Request {
        Request {
            project_name: "general".to_string(),
            session_id: session_id.to_string(),
            user_message: "hi".to_string(),
            reply_topic: "general/assistant_response/s".to_string(),
            request_id: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            custom_system_prompt: None,
            enqueued_at: Instant::now(),
            priority,
        }
    }

    #[tokio::test]
    async fn fifo_order_within_same_priority() {
        let queue = MessageQueue::new(10);
        queue.try_enqueue(request("a", 0)).unwrap();
        queue.try_enqueue(request("b", 0)).unwrap();
        queue.try_enqueue(request("c", 0)).unwrap();

        assert_eq!(queue.dequeue().await.session_id, "a");
        assert_eq!(queue.dequeue().await.session_id, "b");
        assert_eq!(queue.dequeue().await.session_id, "c");
    }

    #[tokio::test]
    async fn higher_priority_dequeues_first() {
        let queue = MessageQueue::new(10);
        queue.try_enqueue(request("low", 0)).unwrap();
        queue.try_enqueue(request("high", 5)).unwrap();

        assert_eq!(queue.dequeue().await.session_id, "high");
        assert_eq!(queue.dequeue().await.session_id, "low");
    }

    #[test]
    fn try_enqueue_rejects_when_full() {
        let queue = MessageQueue::new(1);
        assert!(queue.try_enqueue(request("a", 0)).is_ok());
        let rejected = queue.try_enqueue(request("b", 0));
        assert!(rejected.is_err());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn dequeue_awaits_until_item_arrives() {
        let queue = std::sync::Arc::new(MessageQueue::new(10));
        let q2 = queue.clone();
        let handle = tokio::spawn(async move { q2.dequeue().await });

        tokio::task::yield_now().await;
        queue.try_enqueue(request("late", 0)).unwrap();

        let got = handle.await.unwrap();
        assert_eq!(got.session_id, "late");
    }
}
