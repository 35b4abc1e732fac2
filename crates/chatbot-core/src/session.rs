//! Voice call session state

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Cancellation token for one voice call
///
/// Clones share the same flag: the UI keeps one to call [`stop`](Self::stop)
/// and the capture worker keeps another to poll [`is_active`](Self::is_active).
#[derive(Debug, Clone)]
pub struct CallSession {
    id: u64,
    active: Arc<AtomicBool>,
}

impl CallSession {
    /// Start a new, active session with a fresh id
    pub fn start() -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::info!(session = id, "voice call started");
        Self {
            id,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// End the call; the worker notices on its next iteration
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::info!(session = self.id, "voice call ended");
        }
    }
}

/// Status label shown while a call is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallStatus {
    Waiting,
    Listening,
    Processing,
    Ready,
    Error(String),
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Waiting => f.write_str("Say something..."),
            CallStatus::Listening => f.write_str("Listening... Speak now."),
            CallStatus::Processing => f.write_str("Processing..."),
            CallStatus::Ready => f.write_str("Say something or end call."),
            CallStatus::Error(details) => write!(f, "Error: {details}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_starts_active_and_stops() {
        let session = CallSession::start();
        let worker_view = session.clone();
        assert!(worker_view.is_active());

        session.stop();
        assert!(!worker_view.is_active());

        // Stopping twice is harmless
        session.stop();
        assert!(!session.is_active());
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        let a = CallSession::start();
        let b = CallSession::start();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(CallStatus::Waiting.to_string(), "Say something...");
        assert_eq!(CallStatus::Listening.to_string(), "Listening... Speak now.");
        assert_eq!(CallStatus::Ready.to_string(), "Say something or end call.");
        assert_eq!(
            CallStatus::Error("timed out".to_string()).to_string(),
            "Error: timed out"
        );
    }
}
