//! Shared connection state: the ready/busy flag and the message-id counter.
//!
//! Both fields are mutated from the message-handling thread (on request
//! acceptance) and from worker threads (on completing responses), so they
//! live behind one mutex and are exposed only as atomic operations.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    Ready,
    Busy,
}

impl EndpointState {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointState::Ready => "ready",
            EndpointState::Busy => "busy",
        }
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Inner {
    state: EndpointState,
    next_message_id: u64,
}

/// Lock-guarded endpoint state shared between the connection thread and
/// worker threads.
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<Inner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: EndpointState::Ready,
                next_message_id: 1,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("endpoint state lock poisoned")
    }

    /// Returns the next message id. Ids start at 1 and increase by one for
    /// every outbound message on this connection.
    pub fn allocate_message_id(&self) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_message_id;
        inner.next_message_id += 1;
        id
    }

    pub fn state(&self) -> EndpointState {
        self.lock().state
    }

    /// Transitions ready -> busy. Returns false if already busy.
    pub fn try_set_busy(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == EndpointState::Busy {
            return false;
        }
        inner.state = EndpointState::Busy;
        true
    }

    /// Transitions back to ready. Idempotent: completion, cancellation, and
    /// connection loss may race, and any of them may have reset the state
    /// already.
    pub fn set_ready(&self) {
        self.lock().state = EndpointState::Ready;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative cancellation flag handed to a worker's execution thread.
/// Cancellation is advisory: long-running work checks the token at natural
/// yield points.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_start_at_one_and_increase() {
        let shared = SharedState::new();
        assert_eq!(shared.allocate_message_id(), 1);
        assert_eq!(shared.allocate_message_id(), 2);
        assert_eq!(shared.allocate_message_id(), 3);
    }

    #[test]
    fn busy_transition_is_exclusive() {
        let shared = SharedState::new();
        assert_eq!(shared.state(), EndpointState::Ready);
        assert!(shared.try_set_busy());
        assert!(!shared.try_set_busy());
        assert_eq!(shared.state(), EndpointState::Busy);
    }

    #[test]
    fn set_ready_is_idempotent() {
        let shared = SharedState::new();
        shared.try_set_busy();
        shared.set_ready();
        shared.set_ready();
        assert_eq!(shared.state(), EndpointState::Ready);
    }

    #[test]
    fn cancel_token_is_sticky_across_clones() {
        let token = CancelToken::new();
        let seen_by_worker = token.clone();
        assert!(!seen_by_worker.is_cancelled());
        token.cancel();
        assert!(seen_by_worker.is_cancelled());
    }
}
