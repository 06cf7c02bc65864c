// ABOUTME: Lazily refreshed per-adapter domain cache with a fixed TTL.
// ABOUTME: Stores (value, expiry); reads return the cached value while fresh.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a resolved site domain stays fresh before it is recomputed.
pub const DOMAIN_CACHE_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Per-adapter cache for the site's current domain.
///
/// Staleness merely causes one extra redundant refresh, never incorrect
/// output, so reads take the lock only long enough to copy the value.
#[derive(Debug)]
pub struct CachedDomain {
    base: String,
    ttl: Duration,
    state: Mutex<Option<(String, Instant)>>,
}

impl CachedDomain {
    pub fn new(base: impl Into<String>, ttl: Duration) -> Self {
        Self {
            base: base.into(),
            ttl,
            state: Mutex::new(None),
        }
    }

    /// Current domain, refreshed lazily after the TTL expires.
    pub fn get(&self) -> String {
        let mut state = self.state.lock().expect("domain cache poisoned");
        if let Some((value, stamp)) = state.as_ref() {
            if stamp.elapsed() < self.ttl {
                return value.clone();
            }
        }
        let value = self.refresh();
        *state = Some((value.clone(), Instant::now()));
        value
    }

    /// Replace the cached value, resetting the expiry. Used when a site
    /// announces a new domain mid-session.
    pub fn set(&self, value: impl Into<String>) {
        let mut state = self.state.lock().expect("domain cache poisoned");
        *state = Some((value.into(), Instant::now()));
    }

    // Hook for real domain discovery; currently the configured base is
    // always the answer.
    fn refresh(&self) -> String {
        self.base.clone()
    }
}
