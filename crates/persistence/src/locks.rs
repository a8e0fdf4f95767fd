//! Distributed mutex over the shared KV store.
//!
//! Two use sites with different shapes:
//!
//! - the per-ride dispatch lock (`lock:ride:{ride_id}`) is acquired with a
//!   bounded wait and a lease, and released explicitly when the dispatch
//!   attempt finishes; a crashed holder releases via lease expiry (no
//!   watchdog renewal, a crash must release);
//! - the offer TTL sentinel (`offer:ttl:{ride}:{driver}`) is acquired for
//!   exactly the offer TTL and never released; its existence signals that
//!   the offer is still open.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::kv::KvStore;

/// Poll interval while waiting for a contended lock.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Key for a ride's dispatch lock.
pub fn ride_lock_key(ride_id: &uuid::Uuid) -> String {
    format!("lock:ride:{}", ride_id)
}

/// Key for an offer's TTL sentinel.
pub fn offer_sentinel_key(ride_id: &uuid::Uuid, driver_id: &str) -> String {
    format!("offer:ttl:{}:{}", ride_id, driver_id)
}

/// A held lock. Dropping the guard does not release; call
/// [`DistributedMutex::release`] so release failures are observable.
#[derive(Debug)]
pub struct LockGuard {
    pub name: String,
    token: u64,
}

/// Named mutex with wait/lease semantics.
#[derive(Clone)]
pub struct DistributedMutex {
    kv: Arc<KvStore>,
}

impl DistributedMutex {
    /// Create a mutex facility over the shared KV store.
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    /// Try to acquire `name`, polling for up to `wait`. The lease bounds
    /// how long a crashed holder can block others.
    pub async fn try_acquire(&self, name: &str, wait: Duration, lease: Duration) -> Option<LockGuard> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(token) = self.kv.try_lock(name, lease) {
                return Some(LockGuard {
                    name: name.to_string(),
                    token,
                });
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::debug!(lock = name, "Lock acquisition wait exhausted");
                return None;
            }
            sleep(ACQUIRE_POLL_INTERVAL.min(deadline - tokio::time::Instant::now())).await;
        }
    }

    /// Release a held lock. Returns false if the lease already expired and
    /// another holder took over.
    pub fn release(&self, guard: LockGuard) -> bool {
        self.kv.unlock(&guard.name, guard.token)
    }

    /// Acquire a sentinel that expires on its own and is never released.
    /// Returns false if the sentinel already exists.
    pub fn acquire_sentinel(&self, name: &str, ttl: Duration) -> bool {
        self.kv.try_lock(name, ttl).is_some()
    }

    /// Whether a sentinel (or lock) is currently live.
    pub fn is_held(&self, name: &str) -> bool {
        self.kv.is_locked(name)
    }
}
