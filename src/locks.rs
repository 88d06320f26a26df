//! Per-resource asynchronous locks.
//!
//! The backend offers no atomic increment, so the only way to keep two
//! read-modify-write sequences on the same counter from overlapping is to
//! serialize them on the client side. [`StripedLocks`] maps every resource
//! name onto one of a fixed number of async mutexes:
//!
//! ```text
//!   "blog"   ──hash──► stripe 17 ─┐
//!   "about"  ──hash──► stripe 42  │  64 mutexes, allocated once
//!   "news"   ──hash──► stripe 17 ─┘  ("blog" and "news" share a stripe)
//! ```
//!
//! Resource names come from request paths, so the set of locks must not grow
//! with them. Two names sharing a stripe wait on each other; that costs some
//! concurrency but never correctness, as long as a caller never holds two
//! guards at once.
//!
//! The exclusion only holds inside one process. Several collector instances
//! sharing a spreadsheet can still lose updates.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Number of stripes used by [`StripedLocks::new`].
pub const DEFAULT_STRIPES: usize = 64;

/// A fixed array of async mutexes indexed by a hash of the key.
pub struct StripedLocks {
    stripes: Box<[Arc<Mutex<()>>]>,
}

impl Default for StripedLocks {
    fn default() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }
}

impl StripedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `stripes` mutexes (at least one).
    pub fn with_stripes(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Arc::new(Mutex::new(()))).collect(),
        }
    }

    /// Number of stripes; fixed for the lifetime of the set.
    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }

    /// Stripe index guarding `key`.
    pub fn stripe_of(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Waits until the lock guarding `key` is free and returns its guard.
    ///
    /// The guard is owned, so it can be held across `.await` points and
    /// moved into spawned tasks.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.stripes[self.stripe_of(key)].clone().lock_owned().await
    }
}
