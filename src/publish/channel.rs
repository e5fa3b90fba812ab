use super::{Event, Publisher};
use crate::error::PublishError;
use crossbeam_channel::{Receiver, Sender};

/// Delivers events to an in-process receiver
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: Sender<Event>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, Receiver<Event>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        self.tx.send(event).map_err(|_| PublishError::Closed)
    }
}
