/// Frame queue - single-producer / single-consumer hand-off from capture
///
/// - `enqueue` never blocks beyond the push itself
/// - `dequeue_blocking` parks on a condition variable until a frame or
///   shutdown arrives
/// - shutdown wakes a parked consumer immediately, no polling
use crate::types::Frame;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Outcome of a blocking dequeue
#[derive(Debug)]
pub enum Dequeued {
    Frame(Frame),
    /// Shutdown was signalled; the consumer must exit
    Stop,
}

struct QueueState {
    frames: VecDeque<Frame>,
    stopped: bool,
    next_sequence: u64,
    dropped: u64,
}

/// FIFO of captured frames shared between capture and the worker loop
pub struct FrameQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    max_depth: Option<usize>,
}

impl FrameQueue {
    /// Unbounded queue
    pub fn new() -> Self {
        Self::with_max_depth(None)
    }

    /// Queue that evicts the oldest frame once `max_depth` frames are waiting.
    /// A depth of zero is treated as one.
    pub fn with_max_depth(max_depth: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                stopped: false,
                next_sequence: 0,
                dropped: 0,
            }),
            available: Condvar::new(),
            max_depth: max_depth.map(|depth| depth.max(1)),
        }
    }

    // A panic while holding this lock cannot leave the deque half-updated,
    // so a poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a frame to the tail and wake the consumer.
    /// Returns the sequence number stamped on the frame.
    pub fn enqueue(&self, mut frame: Frame) -> u64 {
        let sequence = {
            let mut state = self.lock();
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            frame.sequence = sequence;

            if let Some(max_depth) = self.max_depth {
                while state.frames.len() >= max_depth {
                    let Some(evicted) = state.frames.pop_front() else {
                        break;
                    };
                    state.dropped += 1;
                    log::debug!(
                        "Frame queue full ({}), dropping frame {}",
                        max_depth,
                        evicted.sequence
                    );
                }
            }

            state.frames.push_back(frame);
            sequence
        };
        self.available.notify_one();
        sequence
    }

    /// Remove the head, parking while the queue is empty.
    /// Returns `Stop` as soon as shutdown has been signalled.
    pub fn dequeue_blocking(&self) -> Dequeued {
        let mut state = self.lock();
        loop {
            if state.stopped {
                return Dequeued::Stop;
            }
            if let Some(frame) = state.frames.pop_front() {
                return Dequeued::Frame(frame);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Non-blocking variant, `None` when empty or stopped
    pub fn try_dequeue(&self) -> Option<Frame> {
        let mut state = self.lock();
        if state.stopped {
            return None;
        }
        state.frames.pop_front()
    }

    /// Signal shutdown and wake every parked consumer
    pub fn shutdown(&self) {
        self.lock().stopped = true;
        self.available.notify_all();
    }

    /// Clear the shutdown flag so a consumer can run again
    pub fn reopen(&self) {
        self.lock().stopped = false;
    }

    /// Remove and return every waiting frame in enqueue order
    pub fn drain(&self) -> Vec<Frame> {
        self.lock().frames.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Frames evicted by the depth bound so far
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageFormat;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn frame(tag: u8) -> Frame {
        Frame::filled(2, 2, ImageFormat::Bgr, [tag, tag, tag])
    }

    fn expect_frame(dequeued: Dequeued) -> Frame {
        match dequeued {
            Dequeued::Frame(frame) => frame,
            Dequeued::Stop => panic!("expected a frame, got Stop"),
        }
    }

    #[test]
    fn test_fifo_order_and_sequence() {
        let queue = FrameQueue::new();
        for tag in 0..5 {
            assert_eq!(queue.enqueue(frame(tag)), tag as u64);
        }
        assert_eq!(queue.len(), 5);

        for tag in 0..5 {
            let frame = expect_frame(queue.dequeue_blocking());
            assert_eq!(frame.sequence, tag as u64);
            assert_eq!(frame.data[0], tag);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_blocked_consumer_wakes_on_enqueue() {
        let queue = Arc::new(FrameQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || expect_frame(queue.dequeue_blocking()).data[0])
        };

        thread::sleep(Duration::from_millis(20));
        queue.enqueue(frame(7));
        assert_eq!(consumer.join().unwrap(), 7);
    }

    #[test]
    fn test_shutdown_wakes_blocked_consumer() {
        let queue = Arc::new(FrameQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || matches!(queue.dequeue_blocking(), Dequeued::Stop))
        };

        thread::sleep(Duration::from_millis(20));
        queue.shutdown();
        assert!(consumer.join().unwrap());
    }

    #[test]
    fn test_shutdown_wins_over_waiting_frames() {
        let queue = FrameQueue::new();
        queue.enqueue(frame(1));
        queue.enqueue(frame(2));
        queue.shutdown();

        assert!(matches!(queue.dequeue_blocking(), Dequeued::Stop));
        assert!(queue.try_dequeue().is_none());

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].data[0], 1);
        assert_eq!(drained[1].data[0], 2);
    }

    #[test]
    fn test_reopen_after_shutdown() {
        let queue = FrameQueue::new();
        queue.enqueue(frame(2));
        queue.shutdown();
        assert!(matches!(queue.dequeue_blocking(), Dequeued::Stop));

        queue.reopen();
        queue.enqueue(frame(3));
        assert_eq!(expect_frame(queue.dequeue_blocking()).data[0], 2);
        assert_eq!(expect_frame(queue.dequeue_blocking()).data[0], 3);
    }

    #[test]
    fn test_bounded_queue_drops_oldest() {
        let queue = FrameQueue::with_max_depth(Some(2));
        for tag in 0..5 {
            queue.enqueue(frame(tag));
        }

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 3);
        assert_eq!(expect_frame(queue.dequeue_blocking()).data[0], 3);
        assert_eq!(expect_frame(queue.dequeue_blocking()).data[0], 4);
    }

    #[test]
    fn test_zero_depth_keeps_latest_frame() {
        let queue = FrameQueue::with_max_depth(Some(0));
        assert_eq!(queue.max_depth(), Some(1));

        for tag in 0..3 {
            queue.enqueue(frame(tag));
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(expect_frame(queue.dequeue_blocking()).data[0], 2);
    }
}
