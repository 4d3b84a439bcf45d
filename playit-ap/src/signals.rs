//! Platform system signals
//!
//! Stand-in for the OS broadcast bus. Receivers register for signals and get
//! their own channel; unregistering twice reports
//! [`SignalError::NotRegistered`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// System broadcast the session reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemSignal {
    /// Output is about to move to the device speaker (headphones unplugged)
    AudioBecomingNoisy,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("receiver {0} is not registered")]
    NotRegistered(u64),
}

/// Registration token returned by [`SystemSignals::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(u64);

/// Broadcast bus for system signals
#[derive(Clone, Default)]
pub struct SystemSignals {
    receivers: Arc<Mutex<HashMap<ReceiverId, mpsc::UnboundedSender<SystemSignal>>>>,
    next_id: Arc<AtomicU64>,
}

impl SystemSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a receiver for all signals
    pub fn register(&self) -> (ReceiverId, mpsc::UnboundedReceiver<SystemSignal>) {
        let id = ReceiverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        debug!("Signal receiver {:?} registered", id);
        (id, rx)
    }

    pub fn unregister(&self, id: ReceiverId) -> Result<(), SignalError> {
        match self.lock().remove(&id) {
            Some(_) => {
                debug!("Signal receiver {:?} unregistered", id);
                Ok(())
            }
            None => Err(SignalError::NotRegistered(id.0)),
        }
    }

    /// Deliver `signal` to every registered receiver; returns how many got it
    pub fn broadcast(&self, signal: SystemSignal) -> usize {
        let mut receivers = self.lock();
        // Receivers whose channel closed are pruned
        receivers.retain(|_, tx| tx.send(signal).is_ok());
        receivers.len()
    }

    pub fn receiver_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<ReceiverId, mpsc::UnboundedSender<SystemSignal>>> {
        self.receivers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
