use super::cancel::CancelToken;
use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use std::time::Duration;

/// Result of waiting on an [`AlertBuffer`]
#[derive(Debug, PartialEq)]
pub enum Pop<T> {
    Item(T),
    /// Nothing arrived within the poll interval
    Empty,
    /// Producer closed the buffer and every item was taken
    Closed,
    Cancelled,
}

/// Unbounded FIFO between ingestion and enrichment
pub struct AlertBuffer<T> {
    tx: Mutex<Option<Sender<T>>>,
    rx: Receiver<T>,
}

impl<T> AlertBuffer<T> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Never blocks. Returns false only if the buffer was already closed.
    pub fn push(&self, item: T) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    /// Stop accepting items; queued ones can still be popped
    pub fn close(&self) {
        self.tx.lock().take();
    }

    /// Wait up to `poll` for the next item, waking early on cancellation
    pub fn pop(&self, cancel: &CancelToken, poll: Duration) -> Pop<T> {
        if cancel.is_cancelled() {
            return Pop::Cancelled;
        }
        select! {
            recv(self.rx) -> msg => match msg {
                Ok(item) => Pop::Item(item),
                Err(_) => Pop::Closed,
            },
            recv(cancel.done()) -> _ => Pop::Cancelled,
            default(poll) => Pop::Empty,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Default for AlertBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    const POLL: Duration = Duration::from_millis(10);

    #[test]
    fn pops_in_fifo_order() {
        let buffer = AlertBuffer::new();
        let cancel = CancelToken::new();
        for i in 0..3 {
            assert!(buffer.push(i));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.pop(&cancel, POLL), Pop::Item(0));
        assert_eq!(buffer.pop(&cancel, POLL), Pop::Item(1));
        assert_eq!(buffer.pop(&cancel, POLL), Pop::Item(2));
        assert_eq!(buffer.pop(&cancel, POLL), Pop::Empty);
    }

    #[test]
    fn closed_buffer_drains_then_reports_closed() {
        let buffer = AlertBuffer::new();
        let cancel = CancelToken::new();
        buffer.push("a");
        buffer.close();
        assert!(!buffer.push("b"));
        assert_eq!(buffer.pop(&cancel, POLL), Pop::Item("a"));
        assert_eq!(buffer.pop(&cancel, POLL), Pop::Closed);
    }

    #[test]
    fn cancellation_wakes_blocked_pop() {
        let buffer: Arc<AlertBuffer<u8>> = Arc::new(AlertBuffer::new());
        let cancel = CancelToken::new();

        let waiter = {
            let buffer = Arc::clone(&buffer);
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                let started = Instant::now();
                let result = buffer.pop(&cancel, Duration::from_secs(10));
                (result, started.elapsed())
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        cancel.cancel();

        let (result, waited) = waiter.join().unwrap();
        assert_eq!(result, Pop::Cancelled);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let buffer = AlertBuffer::new();
        let cancel = CancelToken::new();
        buffer.push(1);
        cancel.cancel();
        assert_eq!(buffer.pop(&cancel, POLL), Pop::Cancelled);
    }
}
