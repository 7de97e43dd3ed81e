//! Link session bookkeeping

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Connectivity and handshake status for the one server session.
pub struct LinkSession {
    session_id: String,
    connected: AtomicBool,
    handshake_complete: AtomicBool,
    endpoint: RwLock<String>,
}

impl LinkSession {
    pub fn new(endpoint: String) -> Self {
        Self {
            session_id: format!("dev-{}", Uuid::new_v4().simple()),
            connected: AtomicBool::new(false),
            handshake_complete: AtomicBool::new(false),
            endpoint: RwLock::new(endpoint),
        }
    }

    /// Unique per-process session id, stamped into every control record.
    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.handshake_complete.load(Ordering::Acquire)
    }

    pub fn set_handshake_complete(&self, complete: bool) {
        self.handshake_complete.store(complete, Ordering::Release);
    }

    pub fn endpoint(&self) -> String {
        self.endpoint.read().clone()
    }

    pub fn set_endpoint(&self, url: String) {
        *self.endpoint.write() = url;
    }

    /// On disconnect the handshake must be redone.
    pub fn reset(&self) {
        self.connected.store(false, Ordering::Release);
        self.handshake_complete.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_handshake() {
        let session = LinkSession::new("ws://127.0.0.1:8000/ws".to_string());
        assert!(!session.is_connected());

        session.set_connected(true);
        session.set_handshake_complete(true);
        assert!(session.is_handshake_complete());

        session.reset();
        assert!(!session.is_connected());
        assert!(!session.is_handshake_complete());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = LinkSession::new(String::new());
        let b = LinkSession::new(String::new());
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("dev-"));
    }
}
