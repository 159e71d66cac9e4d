use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use crate::types::ControlCommand;

/// What a worker should do at its next record boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Stop,
}

/// Pause/stop flags shared by every worker of one job.
///
/// Only the controller writes the flags. Workers read them once per record
/// through [`ControlSignal::checkpoint`], which blocks while paused.
#[derive(Debug, Default)]
pub struct ControlSignal {
    paused: AtomicBool,
    stopped: AtomicBool,
    save: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl ControlSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.paused.store(false, Ordering::SeqCst);
        self.wake.notify_all();
    }

    pub fn stop(&self, save: bool) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.save.store(save, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_all();
    }

    pub fn apply(&self, command: ControlCommand) {
        match command {
            ControlCommand::Pause => self.pause(),
            ControlCommand::Resume => self.resume(),
            ControlCommand::Stop => self.stop(true),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Whether partial output should be kept after a stop.
    pub fn save(&self) -> bool {
        self.save.load(Ordering::SeqCst)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        if self.is_paused() && !self.is_stopped() {
            let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            while self.is_paused() && !self.is_stopped() {
                guard = self
                    .wake
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        if self.is_stopped() {
            Checkpoint::Stop
        } else {
            Checkpoint::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn stop_wakes_a_paused_worker() {
        let signal = Arc::new(ControlSignal::new());
        signal.pause();
        let worker = {
            let signal = signal.clone();
            thread::spawn(move || signal.checkpoint())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!worker.is_finished());
        signal.stop(false);
        assert_eq!(worker.join().unwrap(), Checkpoint::Stop);
        assert!(!signal.save());
    }

    #[test]
    fn resume_lets_the_worker_continue() {
        let signal = Arc::new(ControlSignal::new());
        signal.pause();
        let worker = {
            let signal = signal.clone();
            thread::spawn(move || signal.checkpoint())
        };
        signal.resume();
        assert_eq!(worker.join().unwrap(), Checkpoint::Continue);
    }
}
