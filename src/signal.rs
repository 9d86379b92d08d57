use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// A single-resolution, multicast completion signal.
///
/// Clones share the same underlying state: any clone may be waited on, and
/// every clone — including ones created after the fact — observes the
/// resolution. Resolution is terminal; there is no re-arming.
#[derive(Clone, Default)]
pub struct Signal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    resolved: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the signal. The first call wins; later calls are no-ops.
    /// Returns whether this call performed the resolution.
    pub fn resolve(&self) -> bool {
        let mut resolved = lock(&self.inner.resolved);
        if *resolved {
            return false;
        }
        *resolved = true;
        self.inner.cond.notify_all();
        true
    }

    pub fn is_resolved(&self) -> bool {
        *lock(&self.inner.resolved)
    }

    /// Block until the signal resolves.
    #[allow(dead_code)] // extensions awaiting full readiness block here
    pub fn wait(&self) {
        let mut resolved = lock(&self.inner.resolved);
        while !*resolved {
            resolved = self
                .inner
                .cond
                .wait(resolved)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the signal resolves or the timeout elapses. Returns
    /// whether the signal is resolved.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut resolved = lock(&self.inner.resolved);
        if *resolved {
            return true;
        }
        let (guard, _) = self
            .inner
            .cond
            .wait_timeout(resolved, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        resolved = guard;
        *resolved
    }
}

fn lock(mutex: &Mutex<bool>) -> std::sync::MutexGuard<'_, bool> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
