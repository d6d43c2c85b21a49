use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify, watch};

/// Queue depth at which the producer pauses.
pub const HIGH_WATER_MARK: usize = 5;

/// Queue depth at or below which a paused producer resumes.
pub const LOW_WATER_MARK: usize = 1;

/// Single-producer, single-consumer queue with hysteresis based backpressure.
///
/// Backpressure engages when a push that asks for it leaves [`HIGH_WATER_MARK`] or more
/// items queued, and is released by the first pop that leaves [`LOW_WATER_MARK`] or fewer.
/// Release happens only through a pop, never through time passing.
#[derive(Debug)]
pub struct BatchQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
    backpressure: watch::Sender<bool>,
}

impl<T> BatchQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            backpressure: watch::channel(false).0,
        }
    }

    /// Appends `item` and returns whether the producer must now wait for release.
    ///
    /// When `apply_backpressure` is `false` the item is queued without ever engaging
    /// backpressure.
    pub async fn push(&self, item: T, apply_backpressure: bool) -> bool {
        let engaged = {
            let mut items = self.items.lock().await;
            items.push_back(item);

            let engaged = apply_backpressure && items.len() >= HIGH_WATER_MARK;
            if engaged {
                self.backpressure.send_replace(true);
            }

            engaged
        };

        self.available.notify_one();

        engaged
    }

    /// Removes the oldest item, releasing backpressure if the queue drained far enough.
    pub async fn try_pop(&self) -> Option<T> {
        let mut items = self.items.lock().await;
        let item = items.pop_front()?;

        if items.len() <= LOW_WATER_MARK {
            self.backpressure.send_if_modified(|active| {
                let was_active = *active;
                *active = false;
                was_active
            });
        }

        Some(item)
    }

    /// Waits for an item and removes it, see [`BatchQueue::try_pop`].
    pub async fn pop(&self) -> T {
        loop {
            let notified = self.available.notified();
            if let Some(item) = self.try_pop().await {
                return item;
            }

            // A push between the check and this await leaves a permit, so no wakeup is lost.
            notified.await;
        }
    }

    /// Completes once backpressure is released, immediately if it is not active.
    pub async fn wait_for_release(&self) {
        let mut rx = self.backpressure.subscribe();
        let _ = rx.wait_for(|active| !*active).await;
    }

    /// Returns `true` while the producer is paused.
    pub fn is_backpressure_active(&self) -> bool {
        *self.backpressure.borrow()
    }

    /// Subscribes to backpressure transitions, `true` meaning the producer is paused.
    pub fn subscribe_backpressure(&self) -> watch::Receiver<bool> {
        self.backpressure.subscribe()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

impl<T> Default for BatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
