//! Bounded inbound event queue with duplicate suppression.
//!
//! The gateway handler pushes events as they arrive; a single drain loop pops
//! them one at a time with a pacing delay. Dedup covers both messages still
//! waiting in the queue and messages already handed to the pipeline, so a
//! redelivered gateway event never runs twice.

use crate::InboundEvent;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Processed-id memory high-water mark. When the set grows past this, it is
/// trimmed back to [`PROCESSED_KEEP`] most recent ids.
const PROCESSED_CAP: usize = 1000;
const PROCESSED_KEEP: usize = 500;

/// Why a push was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    Duplicate,
    Overflow,
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<InboundEvent>,
    queued_ids: HashSet<u64>,
    processed_order: VecDeque<u64>,
    processed_ids: HashSet<u64>,
}

/// Bounded FIFO of inbound events.
pub struct EventQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue an event. Duplicates (queued or already processed) and
    /// overflow beyond capacity are silently dropped; the outcome tells the
    /// caller which, for logging.
    pub fn push(&self, event: InboundEvent) -> PushOutcome {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.queued_ids.contains(&event.message_id)
            || state.processed_ids.contains(&event.message_id)
        {
            return PushOutcome::Duplicate;
        }
        if state.events.len() >= self.capacity {
            return PushOutcome::Overflow;
        }

        state.queued_ids.insert(event.message_id);
        state.events.push_back(event);
        drop(state);
        self.notify.notify_one();
        PushOutcome::Queued
    }

    /// Pop the next event, waiting until one is available. The popped id is
    /// recorded as processed before the event is returned.
    pub async fn pop(&self) -> InboundEvent {
        loop {
            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(event) = state.events.pop_front() {
                    state.queued_ids.remove(&event.message_id);
                    mark_processed(&mut state, event.message_id);
                    return event;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Try to pop without waiting.
    pub fn try_pop(&self) -> Option<InboundEvent> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let event = state.events.pop_front()?;
        state.queued_ids.remove(&event.message_id);
        mark_processed(&mut state, event.message_id);
        Some(event)
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn mark_processed(state: &mut QueueState, message_id: u64) {
    state.processed_ids.insert(message_id);
    state.processed_order.push_back(message_id);
    if state.processed_order.len() > PROCESSED_CAP {
        while state.processed_order.len() > PROCESSED_KEEP {
            if let Some(old) = state.processed_order.pop_front() {
                state.processed_ids.remove(&old);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(message_id: u64) -> InboundEvent {
        InboundEvent {
            message_id,
            channel_id: 1,
            author_id: 2,
            author_name: "alice".to_string(),
            author_is_bot: false,
            is_dm: false,
            mentions_bot: true,
            content: "hello".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn push_then_pop_is_fifo() {
        let queue = EventQueue::new(10);
        assert_eq!(queue.push(event(1)), PushOutcome::Queued);
        assert_eq!(queue.push(event(2)), PushOutcome::Queued);

        assert_eq!(queue.try_pop().map(|e| e.message_id), Some(1));
        assert_eq!(queue.try_pop().map(|e| e.message_id), Some(2));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn duplicate_in_queue_is_dropped() {
        let queue = EventQueue::new(10);
        queue.push(event(1));
        assert_eq!(queue.push(event(1)), PushOutcome::Duplicate);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn duplicate_after_processing_is_dropped() {
        let queue = EventQueue::new(10);
        queue.push(event(1));
        queue.try_pop();
        assert_eq!(queue.push(event(1)), PushOutcome::Duplicate);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_beyond_capacity_is_dropped() {
        let queue = EventQueue::new(2);
        queue.push(event(1));
        queue.push(event(2));
        assert_eq!(queue.push(event(3)), PushOutcome::Overflow);
        assert_eq!(queue.len(), 2);

        // Draining frees a slot.
        queue.try_pop();
        assert_eq!(queue.push(event(3)), PushOutcome::Queued);
    }

    #[test]
    fn processed_memory_is_trimmed() {
        let queue = EventQueue::new(5);
        for id in 0..(PROCESSED_CAP as u64 + 1) {
            queue.push(event(id));
            queue.try_pop();
        }

        let state = queue.state.lock().unwrap();
        assert_eq!(state.processed_order.len(), PROCESSED_KEEP);
        assert_eq!(state.processed_ids.len(), PROCESSED_KEEP);
        // Oldest ids are forgotten, newest survive.
        assert!(!state.processed_ids.contains(&0));
        assert!(state.processed_ids.contains(&(PROCESSED_CAP as u64)));
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = std::sync::Arc::new(EventQueue::new(5));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await.message_id })
        };

        tokio::task::yield_now().await;
        queue.push(event(42));

        let popped = waiter.await.expect("pop task should finish");
        assert_eq!(popped, 42);
    }
}
