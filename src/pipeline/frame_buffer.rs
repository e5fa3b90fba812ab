use parking_lot::Mutex;
use std::collections::VecDeque;

/// Result of taking from a [`FrameBuffer`]
#[derive(Debug, PartialEq)]
pub enum Take<T> {
    Item(T),
    Empty,
    /// Closed by the producer and fully drained
    Closed,
}

/// Bounded latest-K queue between ingestion and streaming.
///
/// `push` never blocks: when full, the oldest item is evicted to make room,
/// so the buffer always holds the most recent frames.
pub struct FrameBuffer<T> {
    capacity: usize,
    state: Mutex<State<T>>,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
    evicted: u64,
}

impl<T> FrameBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                evicted: 0,
            }),
        }
    }

    /// Insert `item`, returning the evicted oldest item if the buffer was full
    pub fn push(&self, item: T) -> Option<T> {
        let mut state = self.state.lock();
        let evicted = if state.items.len() >= self.capacity {
            state.evicted += 1;
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(item);
        evicted
    }

    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Like [`FrameBuffer::try_pop`] but reports a closed, drained buffer
    pub fn take(&self) -> Take<T> {
        let mut state = self.state.lock();
        match state.items.pop_front() {
            Some(item) => Take::Item(item),
            None if state.closed => Take::Closed,
            None => Take::Empty,
        }
    }

    /// No more frames will arrive; buffered ones can still be taken
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total frames dropped to make room
    pub fn evicted(&self) -> u64 {
        self.state.lock().evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_latest_k_in_order() {
        let buffer = FrameBuffer::new(3);
        for seq in 1..=5u64 {
            buffer.push(seq);
            assert!(buffer.len() <= 3);
        }

        let popped: Vec<u64> = std::iter::from_fn(|| buffer.try_pop()).collect();
        assert_eq!(popped, vec![3, 4, 5]);
        assert_eq!(buffer.evicted(), 2);
    }

    #[test]
    fn push_when_full_evicts_oldest() {
        let buffer = FrameBuffer::new(2);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), Some(1));
        assert_eq!(buffer.push(4), Some(2));
    }

    #[test]
    fn pop_yields_last_k_for_any_push_count() {
        for capacity in 1..5usize {
            for pushes in 0..12u64 {
                let buffer = FrameBuffer::new(capacity);
                for seq in 1..=pushes {
                    buffer.push(seq);
                }
                let popped: Vec<u64> = std::iter::from_fn(|| buffer.try_pop()).collect();
                let first = pushes.saturating_sub(capacity as u64) + 1;
                let expected: Vec<u64> = (first..=pushes).collect();
                assert_eq!(popped, expected, "capacity {capacity}, pushes {pushes}");
            }
        }
    }

    #[test]
    fn closed_buffer_drains_before_reporting_closed() {
        let buffer = FrameBuffer::new(3);
        buffer.push(7);
        buffer.close();
        assert_eq!(buffer.take(), Take::Item(7));
        assert_eq!(buffer.take(), Take::Closed);
    }

    #[test]
    fn open_empty_buffer_is_empty() {
        let buffer: FrameBuffer<u8> = FrameBuffer::new(1);
        assert_eq!(buffer.take(), Take::Empty);
        assert!(buffer.is_empty());
    }
}
