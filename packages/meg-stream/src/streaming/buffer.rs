// Buffers connecting the acquisition side to the estimator
//
// `BoundedSampleBuffer` is the blocking FIFO between exactly one producer and
// one consumer. `CircularBuffer` is the small non-blocking queue the estimator
// parks finished spectra in until they are published.

use crate::streaming::types::{StreamError, StreamResult};
use crate::types::SampleBlock;
use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Metrics for buffer performance monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BufferMetrics {
    pub total_pushed: u64,
    pub total_popped: u64,
    pub total_discarded: u64,
    pub current_size: usize,
    pub peak_size: usize,
    pub capacity: usize,
}

struct QueueState {
    blocks: VecDeque<SampleBlock>,
    released: bool,
}

/// Fixed-capacity blocking queue of sample blocks
///
/// `push` waits while the queue is full and `pop` waits while it is empty.
/// `release` wakes both sides; from then on every `push`/`pop` returns
/// `StreamError::Released` without blocking until `reset` is called.
pub struct BoundedSampleBuffer {
    state: Mutex<QueueState>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,

    total_pushed: AtomicU64,
    total_popped: AtomicU64,
    total_discarded: AtomicU64,
    peak_size: AtomicUsize,
}

impl BoundedSampleBuffer {
    pub fn new(capacity: usize) -> StreamResult<Self> {
        if capacity == 0 {
            return Err(StreamError::InvalidConfig(
                "buffer capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            state: Mutex::new(QueueState {
                blocks: VecDeque::with_capacity(capacity),
                released: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
            total_pushed: AtomicU64::new(0),
            total_popped: AtomicU64::new(0),
            total_discarded: AtomicU64::new(0),
            peak_size: AtomicUsize::new(0),
        })
    }

    /// Append a block, waiting for space if the queue is full
    pub fn push(&self, block: SampleBlock) -> StreamResult<()> {
        let mut state = self.state.lock();
        while state.blocks.len() >= self.capacity && !state.released {
            self.not_full.wait(&mut state);
        }
        if state.released {
            return Err(StreamError::Released);
        }

        state.blocks.push_back(block);
        let size = state.blocks.len();
        drop(state);

        self.record_push(size);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append a block without waiting; hands the block back if full or released
    pub fn try_push(&self, block: SampleBlock) -> Result<(), SampleBlock> {
        let mut state = self.state.lock();
        if state.released || state.blocks.len() >= self.capacity {
            return Err(block);
        }

        state.blocks.push_back(block);
        let size = state.blocks.len();
        drop(state);

        self.record_push(size);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest block, waiting while the queue is empty
    pub fn pop(&self) -> StreamResult<SampleBlock> {
        let mut state = self.state.lock();
        loop {
            if state.released {
                return Err(StreamError::Released);
            }
            if let Some(block) = state.blocks.pop_front() {
                drop(state);
                self.total_popped.fetch_add(1, Ordering::Relaxed);
                self.not_full.notify_one();
                return Ok(block);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Like `pop`, but gives up after `timeout` and returns `Ok(None)`
    pub fn pop_timeout(&self, timeout: Duration) -> StreamResult<Option<SampleBlock>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.released {
                return Err(StreamError::Released);
            }
            if let Some(block) = state.blocks.pop_front() {
                drop(state);
                self.total_popped.fetch_add(1, Ordering::Relaxed);
                self.not_full.notify_one();
                return Ok(Some(block));
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return Ok(None);
            }
        }
    }

    /// Remove the oldest block if one is queued and the buffer is not released
    pub fn try_pop(&self) -> Option<SampleBlock> {
        let mut state = self.state.lock();
        if state.released {
            return None;
        }
        let block = state.blocks.pop_front()?;
        drop(state);

        self.total_popped.fetch_add(1, Ordering::Relaxed);
        self.not_full.notify_one();
        Some(block)
    }

    /// Wake every waiting producer and consumer for shutdown
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        drop(state);

        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Re-arm a released buffer for a new session
    pub fn reset(&self) {
        self.state.lock().released = false;
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Drop every queued block
    ///
    /// Only valid while no thread is pushing or popping; the pipeline calls it
    /// after its workers have been joined.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = state.blocks.len();
        state.blocks.clear();
        drop(state);

        if discarded > 0 {
            self.total_discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
            log::debug!("Discarded {} queued blocks", discarded);
        }
        self.not_full.notify_all();
        discarded
    }

    pub fn len(&self) -> usize {
        self.state.lock().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().blocks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().blocks.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get_metrics(&self) -> BufferMetrics {
        BufferMetrics {
            total_pushed: self.total_pushed.load(Ordering::Relaxed),
            total_popped: self.total_popped.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
            current_size: self.len(),
            peak_size: self.peak_size.load(Ordering::Relaxed),
            capacity: self.capacity,
        }
    }

    /// Reset metrics (useful for testing or session restart)
    pub fn reset_metrics(&self) {
        self.total_pushed.store(0, Ordering::Relaxed);
        self.total_popped.store(0, Ordering::Relaxed);
        self.total_discarded.store(0, Ordering::Relaxed);
        self.peak_size.store(0, Ordering::Relaxed);
    }

    fn record_push(&self, size: usize) {
        self.total_pushed.fetch_add(1, Ordering::Relaxed);
        self.peak_size.fetch_max(size, Ordering::Relaxed);
    }
}

/// Strategy for handling overflow in a `CircularBuffer`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum OverflowStrategy {
    /// Drop oldest items (ring buffer behavior) - best for real-time
    DropOldest,

    /// Refuse new items while full
    DropNewest,
}

/// Lock-free bounded queue that never blocks
pub struct CircularBuffer<T> {
    buffer: ArrayQueue<T>,
    overflow_strategy: OverflowStrategy,
    total_pushed: AtomicU64,
    total_dropped: AtomicU64,
}

impl<T> CircularBuffer<T> {
    /// Panics if `capacity` is zero
    pub fn new(capacity: usize, strategy: OverflowStrategy) -> Self {
        Self {
            buffer: ArrayQueue::new(capacity),
            overflow_strategy: strategy,
            total_pushed: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
        }
    }

    /// Returns the item that did not make it into the queue, if any
    pub fn push(&self, item: T) -> Option<T> {
        let rejected = match self.overflow_strategy {
            OverflowStrategy::DropOldest => self.buffer.force_push(item),
            OverflowStrategy::DropNewest => self.buffer.push(item).err(),
        };

        // With DropOldest the new item always lands; the rejected one is the evicted head
        if rejected.is_none() || self.overflow_strategy == OverflowStrategy::DropOldest {
            self.total_pushed.fetch_add(1, Ordering::Relaxed);
        }
        if rejected.is_some() {
            self.total_dropped.fetch_add(1, Ordering::Relaxed);
        }

        rejected
    }

    pub fn pop(&self) -> Option<T> {
        self.buffer.pop()
    }

    /// Drain up to max_items, ordered oldest to newest
    pub fn drain(&self, max_items: usize) -> Vec<T> {
        let mut items = Vec::with_capacity(max_items.min(self.buffer.len()));
        for _ in 0..max_items {
            if let Some(item) = self.pop() {
                items.push(item);
            } else {
                break;
            }
        }
        items
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn total_pushed(&self) -> u64 {
        self.total_pushed.load(Ordering::Relaxed)
    }

    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        while self.buffer.pop().is_some() {}
    }
}
