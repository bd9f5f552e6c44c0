//! Bounded frame queue between the audio callback and the recognition consumer
//!
//! The capture callback runs on a thread owned by the audio backend and must
//! never block, so `push` is non-blocking and drops the incoming frame when
//! the queue is full. The consumer drains opportunistically: one blocking wait
//! for the first frame, then everything else currently buffered is coalesced
//! into a single batch so the recognition service sees fewer, larger messages.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Default queue capacity in frames (~10 seconds at 100 ms per frame)
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// One fixed-duration slice of mono linear PCM samples
pub type AudioFrame = Vec<i16>;

/// Outcome of a [`FrameQueue::next_batch`] call
#[derive(Debug, PartialEq, Eq)]
pub enum BatchRead {
    /// At least one frame arrived; all frames available at the time of the
    /// read are concatenated in arrival order
    Batch(Vec<i16>),
    /// Nothing arrived within the poll timeout and the queue is still open
    Pending,
    /// The queue is closed and fully drained
    Closed,
}

struct QueueState {
    frames: VecDeque<AudioFrame>,
    closed: bool,
    dropped: u64,
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
}

/// Fixed-capacity frame queue with drop-on-full backpressure
///
/// Clones share the same underlying queue; one clone lives in the capture
/// callback, the other with the recognition consumer.
#[derive(Clone)]
pub struct FrameQueue {
    shared: Arc<Shared>,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    frames: VecDeque::with_capacity(capacity),
                    closed: false,
                    dropped: 0,
                }),
                available: Condvar::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Enqueue a frame without blocking
    ///
    /// Returns `false` if the frame was dropped (queue full or closed). A
    /// drop is diagnostic only, never fatal: near stream end we prefer fresh
    /// audio over completeness.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let mut state = match self.shared.state.lock() {
            Ok(state) => state,
            Err(_) => return false,
        };

        if state.closed || state.frames.len() >= self.shared.capacity {
            state.dropped += 1;
            return false;
        }

        state.frames.push_back(frame);
        drop(state);
        self.shared.available.notify_one();
        true
    }

    /// Wait up to `poll_timeout` for audio, then drain everything available
    ///
    /// Returns [`BatchRead::Pending`] when the timeout elapses with the queue
    /// still open (caller retries) and [`BatchRead::Closed`] once the queue
    /// is closed and empty. A returned batch is never empty.
    pub fn next_batch(&self, poll_timeout: Duration) -> BatchRead {
        let Ok(mut state) = self.shared.state.lock() else {
            return BatchRead::Closed;
        };

        if state.frames.is_empty() {
            if state.closed {
                return BatchRead::Closed;
            }
            let (next, timed_out) = match self
                .shared
                .available
                .wait_timeout_while(state, poll_timeout, |s| {
                    s.frames.is_empty() && !s.closed
                }) {
                Ok((guard, timeout)) => (guard, timeout.timed_out()),
                Err(_) => return BatchRead::Closed,
            };
            state = next;

            if state.frames.is_empty() {
                return if state.closed {
                    BatchRead::Closed
                } else {
                    debug_assert!(timed_out);
                    BatchRead::Pending
                };
            }
        }

        let mut batch = Vec::new();
        while let Some(frame) = state.frames.pop_front() {
            batch.extend_from_slice(&frame);
        }
        BatchRead::Batch(batch)
    }

    /// Close the queue, waking any blocked consumer. Idempotent.
    ///
    /// Already-buffered frames remain readable; pushes after close are
    /// dropped.
    pub fn close(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.closed = true;
        }
        self.shared.available.notify_all();
    }

    /// Drop any buffered frames (used when releasing the audio device)
    pub fn drain(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.frames.clear();
        }
    }

    /// Number of frames currently buffered
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().map_or(0, |s| s.frames.len())
    }

    /// Whether the queue is currently empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total frames dropped since construction
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.state.lock().map_or(0, |s| s.dropped)
    }

    /// Whether the queue has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().map_or(true, |s| s.closed)
    }
}
