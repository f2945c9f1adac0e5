//! Lock-free single-producer/single-consumer ring of interleaved samples.
//!
//! The ring is split into an [`AudioWriter`] for the real-time producer and
//! an [`AudioReader`] for the consumer. Neither half is `Clone`, which keeps
//! the one-writer/one-reader contract in the type system.
//!
//! One slot always stays empty so that `write == read` means empty and the
//! ring can hold at most `capacity - 1` samples.

use std::{
    cell::UnsafeCell,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

/// Default ring size: about 1.5 seconds of 44.1 kHz stereo.
pub const DEFAULT_CAPACITY: usize = 131_072;

struct RingInner {
    buffer: Box<[UnsafeCell<f32>]>,
    capacity: usize,
    read: AtomicUsize,
    write: AtomicUsize,
    truncated: AtomicU64,
}

// Slots between `read` and `write` belong to the reader, the others to the
// writer; cursor hand-off is Release/Acquire.
unsafe impl Sync for RingInner {}

impl RingInner {
    fn available(&self) -> usize {
        let w = self.write.load(Ordering::Acquire);
        let r = self.read.load(Ordering::Acquire);
        (w + self.capacity - r) % self.capacity
    }

    fn slot_ptr(&self, index: usize) -> *mut f32 {
        UnsafeCell::raw_get(self.buffer[index..].as_ptr())
    }

    /// Safety: `at..at + src.len()` must be writer-owned and in bounds.
    unsafe fn write_at(&self, at: usize, src: &[f32]) {
        if src.is_empty() {
            return;
        }
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), self.slot_ptr(at), src.len()) }
    }

    /// Safety: `at..at + dst.len()` must be reader-owned and in bounds.
    unsafe fn read_at(&self, at: usize, dst: &mut [f32]) {
        if dst.is_empty() {
            return;
        }
        unsafe { std::ptr::copy_nonoverlapping(self.slot_ptr(at), dst.as_mut_ptr(), dst.len()) }
    }
}

pub struct AudioSampleBuffer;

impl AudioSampleBuffer {
    /// Allocates a ring of `capacity` slots and returns its two halves.
    pub fn with_capacity(capacity: usize) -> (AudioWriter, AudioReader) {
        let capacity = capacity.max(2);
        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(0.0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let inner = Arc::new(RingInner {
            buffer,
            capacity,
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            truncated: AtomicU64::new(0),
        });
        (
            AudioWriter {
                inner: Arc::clone(&inner),
            },
            AudioReader { inner },
        )
    }
}

/// Producer half. Never blocks and never allocates.
pub struct AudioWriter {
    inner: Arc<RingInner>,
}

impl AudioWriter {
    /// Writes as much of `samples` as fits and returns how many were taken.
    /// The tail that does not fit is discarded and counted.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.push_frames(samples, 1)
    }

    /// Like [`push`](Self::push), but only accepts whole frames of
    /// `channels` samples so a full ring never splits a stereo pair.
    pub fn push_frames(&mut self, samples: &[f32], channels: usize) -> usize {
        let ring = &*self.inner;
        let cap = ring.capacity;
        let w = ring.write.load(Ordering::Relaxed);
        let r = ring.read.load(Ordering::Acquire);

        let free = (cap - 1) - ((w + cap - r) % cap);
        let count = samples.len().min(free);
        let count = count - count % channels.max(1);
        let first = count.min(cap - w);

        unsafe {
            ring.write_at(w, &samples[..first]);
            ring.write_at(0, &samples[first..count]);
        }
        ring.write.store((w + count) % cap, Ordering::Release);

        if count < samples.len() {
            ring.truncated
                .fetch_add((samples.len() - count) as u64, Ordering::Relaxed);
        }
        count
    }

    pub fn available(&self) -> usize {
        self.inner.available()
    }

    pub fn free(&self) -> usize {
        self.inner.capacity - 1 - self.inner.available()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// Consumer half.
pub struct AudioReader {
    inner: Arc<RingInner>,
}

impl AudioReader {
    /// Fills `out` completely, or consumes nothing and returns false.
    pub fn pop(&mut self, out: &mut [f32]) -> bool {
        let ring = &*self.inner;
        let cap = ring.capacity;
        let w = ring.write.load(Ordering::Acquire);
        let r = ring.read.load(Ordering::Relaxed);

        let available = (w + cap - r) % cap;
        let count = out.len();
        if available < count {
            return false;
        }
        let first = count.min(cap - r);

        unsafe {
            ring.read_at(r, &mut out[..first]);
            ring.read_at(0, &mut out[first..count]);
        }
        ring.read.store((r + count) % cap, Ordering::Release);
        true
    }

    /// Drops everything currently readable.
    pub fn clear(&mut self) -> usize {
        let ring = &*self.inner;
        let w = ring.write.load(Ordering::Acquire);
        let r = ring.read.load(Ordering::Relaxed);
        ring.read.store(w, Ordering::Release);
        (w + ring.capacity - r) % ring.capacity
    }

    pub fn available(&self) -> usize {
        self.inner.available()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Samples discarded by the writer because the ring was full.
    pub fn truncated(&self) -> u64 {
        self.inner.truncated.load(Ordering::Relaxed)
    }

    pub fn monitor(&self) -> RingMonitor {
        RingMonitor {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only view of the ring fill level, usable from any thread.
#[derive(Clone)]
pub struct RingMonitor {
    inner: Arc<RingInner>,
}

impl RingMonitor {
    pub fn available(&self) -> usize {
        self.inner.available()
    }

    pub fn truncated(&self) -> u64 {
        self.inner.truncated.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_in_order() {
        let (mut writer, mut reader) = AudioSampleBuffer::with_capacity(16);
        let input: Vec<f32> = (0..15).map(|i| i as f32).collect();

        assert_eq!(writer.push(&input[..7]), 7);
        assert_eq!(writer.push(&input[7..]), 8);
        assert_eq!(reader.available(), 15);

        let mut out = vec![0.0; 15];
        assert!(reader.pop(&mut out));
        assert_eq!(out, input);
        assert_eq!(reader.available(), 0);
    }

    #[test]
    fn test_overflow_accepts_exactly_free_space() {
        let (mut writer, mut reader) = AudioSampleBuffer::with_capacity(8);
        assert_eq!(writer.push(&[1.0, 2.0, 3.0]), 3);
        let free = writer.free();
        assert_eq!(free, 4);

        let accepted = writer.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(accepted, free);
        assert_eq!(reader.available(), 7);
        assert_eq!(writer.free(), 0);
        assert_eq!(reader.truncated(), 2);

        // Full ring rejects everything and keeps the unread data intact.
        assert_eq!(writer.push(&[10.0]), 0);
        let mut out = vec![0.0; 7];
        assert!(reader.pop(&mut out));
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_push_frames_keeps_pairs_whole() {
        let (mut writer, mut reader) = AudioSampleBuffer::with_capacity(8);
        // Seven free slots fit three stereo frames.
        assert_eq!(writer.push_frames(&[0.5; 10], 2), 6);
        assert_eq!(reader.truncated(), 4);
        assert_eq!(writer.free(), 1);
        assert_eq!(writer.push_frames(&[0.5, 0.5], 2), 0);
        assert_eq!(reader.available(), 6);
    }

    #[test]
    fn test_pop_short_consumes_nothing() {
        let (mut writer, mut reader) = AudioSampleBuffer::with_capacity(8);
        writer.push(&[1.0, 2.0]);
        let mut out = vec![0.0; 4];
        assert!(!reader.pop(&mut out));
        assert_eq!(reader.available(), 2);
        let mut out = vec![0.0; 2];
        assert!(reader.pop(&mut out));
        assert_eq!(out, vec![1.0, 2.0]);
    }

    #[test]
    fn test_wraps_around_capacity() {
        let (mut writer, mut reader) = AudioSampleBuffer::with_capacity(5);
        let mut out = vec![0.0; 3];
        for round in 0..10 {
            let base = round as f32 * 3.0;
            assert_eq!(writer.push(&[base, base + 1.0, base + 2.0]), 3);
            assert!(reader.pop(&mut out));
            assert_eq!(out, vec![base, base + 1.0, base + 2.0]);
        }
    }

    #[test]
    fn test_clear_discards_readable() {
        let (mut writer, mut reader) = AudioSampleBuffer::with_capacity(8);
        writer.push(&[1.0, 2.0, 3.0]);
        let monitor = reader.monitor();
        assert_eq!(monitor.available(), 3);
        assert_eq!(reader.clear(), 3);
        assert_eq!(monitor.available(), 0);
        assert_eq!(writer.push(&[4.0]), 1);
        let mut out = [0.0];
        assert!(reader.pop(&mut out));
        assert_eq!(out, [4.0]);
    }

    #[test]
    fn test_spsc_threads_keep_order() {
        const TOTAL: usize = 200_000;
        let (mut writer, mut reader) = AudioSampleBuffer::with_capacity(1024);

        let producer = std::thread::spawn(move || {
            let mut next = 0usize;
            while next < TOTAL {
                let end = (next + 37).min(TOTAL);
                let chunk: Vec<f32> = (next..end).map(|i| (i % 1_000_000) as f32).collect();
                next += writer.push(&chunk);
                std::thread::yield_now();
            }
        });

        let mut expected = 0usize;
        let mut out = vec![0.0f32; 64];
        while expected + out.len() <= TOTAL {
            if reader.pop(&mut out) {
                for sample in &out {
                    assert_eq!(*sample, (expected % 1_000_000) as f32);
                    expected += 1;
                }
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
        assert_eq!(reader.available(), TOTAL - expected);
    }
}
