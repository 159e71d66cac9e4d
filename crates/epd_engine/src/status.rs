use std::sync::mpsc;
use std::time::{Duration, Instant};

use epd_core::StatusEvent;

/// Fans status events out to any number of observers.
///
/// Observers come and go at any time; a dropped receiver is pruned on the
/// next send. Throttled events arriving within `interval` of the previous
/// delivery are dropped; unthrottled ones always go through.
#[derive(Debug)]
pub struct StatusBroadcaster {
    subscribers: Vec<mpsc::Sender<StatusEvent>>,
    interval: Duration,
    last_sent: Option<Instant>,
}

impl StatusBroadcaster {
    pub fn new(interval: Duration) -> Self {
        Self {
            subscribers: Vec::new(),
            interval,
            last_sent: None,
        }
    }

    pub fn subscribe(&mut self) -> mpsc::Receiver<StatusEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns whether the event was delivered.
    pub fn publish(&mut self, event: &StatusEvent, throttle: bool) -> bool {
        let now = Instant::now();
        if throttle
            && self
                .last_sent
                .is_some_and(|last| now.duration_since(last) < self.interval)
        {
            return false;
        }
        self.last_sent = Some(now);
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        true
    }
}
