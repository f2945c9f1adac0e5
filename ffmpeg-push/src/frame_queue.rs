use std::{
    collections::VecDeque,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::{Deserialize, Serialize};

use crate::frame::VideoFrame;

/// Log "queue full" at most every N drops.
const DROP_LOG_INTERVAL: u64 = 120;

/// Which frame gives way when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// The incoming frame is rejected; queued frames stay untouched.
    #[default]
    RejectNewest,
    /// The oldest queued frame is evicted to make room.
    DropOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    Dropped,
}

struct QueueInner {
    frames: VecDeque<VideoFrame>,
    capacity: usize,
}

/// Bounded FIFO between the video producer and the worker.
pub struct VideoFrameQueue {
    inner: Mutex<QueueInner>,
    policy: DropPolicy,
    dropped: AtomicU64,
}

impl VideoFrameQueue {
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(capacity),
                capacity,
            }),
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        // A panicking holder cannot leave the deque half-updated.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, frame: VideoFrame) -> PushOutcome {
        let outcome = {
            let mut inner = self.lock();
            if inner.frames.len() < inner.capacity {
                inner.frames.push_back(frame);
                PushOutcome::Queued
            } else {
                if self.policy == DropPolicy::DropOldest {
                    inner.frames.pop_front();
                    inner.frames.push_back(frame);
                }
                PushOutcome::Dropped
            }
        };

        if outcome == PushOutcome::Dropped {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % DROP_LOG_INTERVAL == 1 {
                log::debug!(
                    "video frame queue full, dropped {} frames (back-pressure)",
                    dropped
                );
            }
        }
        outcome
    }

    /// Takes every queued frame in arrival order, leaving the queue empty.
    pub fn pop_all(&self) -> Vec<VideoFrame> {
        let mut inner = self.lock();
        inner.frames.drain(..).collect()
    }

    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let len = inner.frames.len();
        inner.frames.clear();
        len
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelLayout;

    fn frame(tag: u8) -> VideoFrame {
        VideoFrame::copy_from(&[tag; 16], 2, 2, 8, PixelLayout::Argb)
            .unwrap()
            .with_timestamp(tag as f64)
    }

    fn tags(frames: &[VideoFrame]) -> Vec<u8> {
        frames.iter().map(|f| f.row(0)[0]).collect()
    }

    #[test]
    fn test_overflow_rejects_incoming() {
        let queue = VideoFrameQueue::new(30, DropPolicy::RejectNewest);
        let outcomes: Vec<_> = (0..40).map(|i| queue.push(frame(i))).collect();

        assert_eq!(queue.len(), 30);
        assert_eq!(queue.dropped(), 10);
        assert!(outcomes[..30].iter().all(|o| *o == PushOutcome::Queued));
        assert!(outcomes[30..].iter().all(|o| *o == PushOutcome::Dropped));

        let frames = queue.pop_all();
        assert_eq!(tags(&frames), (0..30).collect::<Vec<u8>>());
    }

    #[test]
    fn test_full_queue_unchanged_after_rejection() {
        let queue = VideoFrameQueue::new(2, DropPolicy::RejectNewest);
        queue.push(frame(1));
        queue.push(frame(2));
        assert_eq!(queue.push(frame(3)), PushOutcome::Dropped);
        assert_eq!(tags(&queue.pop_all()), vec![1, 2]);
    }

    #[test]
    fn test_drop_oldest_keeps_newest() {
        let queue = VideoFrameQueue::new(3, DropPolicy::DropOldest);
        for i in 0..5 {
            queue.push(frame(i));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(tags(&queue.pop_all()), vec![2, 3, 4]);
    }

    #[test]
    fn test_pop_all_empties_queue() {
        let queue = VideoFrameQueue::new(4, DropPolicy::RejectNewest);
        queue.push(frame(7));
        queue.push(frame(8));
        assert_eq!(tags(&queue.pop_all()), vec![7, 8]);
        assert!(queue.is_empty());
        assert!(queue.pop_all().is_empty());
    }
}
