use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Process-wide cache for derived configuration (route tables, field maps).
/// Owned by the composition root and injected, never a hidden module
/// global. Entries expire after the TTL (default 1 hour) and can be dropped
/// eagerly through [`ConfigCache::invalidate`].
pub struct ConfigCache<T> {
    slot: RwLock<Option<(Instant, T)>>,
    ttl: Duration,
}

impl<T: Clone> ConfigCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(3600))
    }

    /// Current value, loading through `load` when the slot is empty or
    /// expired.
    pub fn get_or_load(&self, load: impl FnOnce() -> T) -> T {
        {
            let slot = self.slot.read().unwrap();
            if let Some((stored_at, value)) = slot.as_ref() {
                if stored_at.elapsed() < self.ttl {
                    return value.clone();
                }
            }
        }

        let value = load();
        let mut slot = self.slot.write().unwrap();
        *slot = Some((Instant::now(), value.clone()));
        value
    }

    pub fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap();
        *slot = None;
    }
}
