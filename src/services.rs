use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Polling posture extensions should adopt toward the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standby {
    /// Pause all periodic polling.
    Always,
    /// Poll only while the surface is visible.
    WhenHidden,
}

/// Narrow handle onto the backend service manager. The connection state
/// is shared; the protocol itself lives elsewhere.
#[derive(Clone)]
pub struct ServiceConnection {
    connected: Arc<AtomicBool>,
}

impl ServiceConnection {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(connected)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn standby(&self) -> Standby {
        if self.is_connected() {
            Standby::WhenHidden
        } else {
            Standby::Always
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standby_follows_connection_state() {
        let services = ServiceConnection::new(true);
        assert_eq!(services.standby(), Standby::WhenHidden);

        let shared = services.clone();
        shared.set_connected(false);
        assert!(!services.is_connected());
        assert_eq!(services.standby(), Standby::Always);
    }
}
