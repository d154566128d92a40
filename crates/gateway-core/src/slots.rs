//! Caps concurrent in-flight backend calls independently of worker count
//! and session locks.

use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

pub struct InferenceSlots {
    semaphore: Semaphore,
}

impl InferenceSlots {
    pub fn new(slot_count: usize) -> Self {
        Self {
            semaphore: Semaphore::new(slot_count),
        }
    }

    /// Acquires one permit; held for the duration of a single backend call
    /// and dropped immediately after, before the post-inference session lock.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.semaphore
            .acquire()
            .await
            .expect("inference slot semaphore is never closed")
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

pub fn new_shared(slot_count: usize) -> Arc<InferenceSlots> {
    Arc::new(InferenceSlots::new(slot_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_configured_slot_count() {
        let slots = new_shared(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let slots = slots.clone();
            let in_flight = in_flight.clone();
            let max_observed = max_observed.clone();
            handles.push(tokio::spawn(async move {
                let _permit = slots.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }
}
