//! Short-TTL read cache for dashboard and report aggregates.
//!
//! Entries are best effort: staleness is bounded by the TTL, and writers
//! invalidate through [`Cache::invalidate`] with the keys listed by
//! [`CacheKeys::for_change`]. Keeping the key list in one place means a write
//! path cannot forget a dependent key.

use crate::model::Role;
use chrono::{Datelike, NaiveDate};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

#[derive(Default)]
pub struct Cache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("entries", &self.len()).finish()
    }
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves at worst a stale entry; keep serving.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh cached value for `key`, if any.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let entries = self.entries();
        let entry = entries.get(key)?;
        if !entry.is_fresh() {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    pub fn put<T: Send + Sync + 'static>(&self, key: &str, value: T, ttl: Duration) {
        self.entries().insert(
            key.to_string(),
            CacheEntry {
                value: Arc::new(value),
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// The lock is not held while `compute` runs; two concurrent misses both
    /// compute and the later write wins.
    pub fn remember<T, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
    {
        if let Some(value) = self.get::<T>(key) {
            #[cfg(feature = "metrics")]
            METRICS.record_cache_hit();
            log::trace!(target: "jaspel::cache", "hit {}", key);
            return Ok(value);
        }

        #[cfg(feature = "metrics")]
        METRICS.record_cache_miss();
        log::trace!(target: "jaspel::cache", "miss {}", key);

        let value = compute()?;
        self.put(key, value.clone(), ttl);
        Ok(value)
    }

    pub fn forget(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Drop every key starting with `prefix`. Returns the number removed.
    pub fn forget_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub fn invalidate(&self, keys: &[CacheKey]) -> usize {
        let removed: usize = keys
            .iter()
            .map(|key| match key {
                CacheKey::Exact(key) => usize::from(self.forget(key)),
                CacheKey::Prefix(prefix) => self.forget_prefix(prefix),
            })
            .sum();
        log::debug!(target: "jaspel::cache", "invalidated {} entries", removed);
        removed
    }

    /// Drop everything. Returns the number of entries removed.
    pub fn flush(&self) -> usize {
        let mut entries = self.entries();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    Exact(String),
    Prefix(String),
}

/// Users and month affected by a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeScope {
    pub date: NaiveDate,
    pub users: Vec<u64>,
}

/// Names of every cached read model.
pub struct CacheKeys;

impl CacheKeys {
    pub const VALIDATION_COUNTS: &'static str = "validation_counts";
    const SUMMARY_PREFIX: &'static str = "dashboard_summary:";
    const USER_SUMMARY_PREFIX: &'static str = "jaspel_summary:";

    pub fn role_counts(role: Role) -> String {
        format!("{}:{}", Self::VALIDATION_COUNTS, role.as_str())
    }

    pub fn monthly_summary(year: i32, month: u32) -> String {
        format!("{}{:04}-{:02}", Self::SUMMARY_PREFIX, year, month)
    }

    /// Per-user summary; `period` is `(year, month)` or the whole history.
    pub fn user_summary(user_id: u64, period: Option<(i32, u32)>) -> String {
        match period {
            Some((year, month)) => format!(
                "{}{}:{:04}-{:02}",
                Self::USER_SUMMARY_PREFIX,
                user_id,
                year,
                month
            ),
            None => format!("{}{}:all", Self::USER_SUMMARY_PREFIX, user_id),
        }
    }

    fn user_summary_prefix(user_id: u64) -> String {
        format!("{}{}:", Self::USER_SUMMARY_PREFIX, user_id)
    }

    /// Every key whose value can change when a record in `scope` is written.
    pub fn for_change(scope: &ChangeScope) -> Vec<CacheKey> {
        // global and per-role counts share the prefix
        let mut keys = vec![
            CacheKey::Prefix(Self::VALIDATION_COUNTS.to_string()),
            CacheKey::Exact(Self::monthly_summary(scope.date.year(), scope.date.month())),
        ];
        keys.extend(
            scope
                .users
                .iter()
                .map(|user| CacheKey::Prefix(Self::user_summary_prefix(*user))),
        );
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_remember_computes_once_within_ttl() {
        let cache = Cache::new();
        let calls = Cell::new(0);
        for _ in 0..3 {
            let value: Result<u32, ()> = cache.remember("k", Duration::from_secs(60), || {
                calls.set(calls.get() + 1);
                Ok(42)
            });
            assert_eq!(value, Ok(42));
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_zero_ttl_always_recomputes() {
        let cache = Cache::new();
        let calls = Cell::new(0);
        for _ in 0..2 {
            let _: Result<u32, ()> = cache.remember("k", Duration::ZERO, || {
                calls.set(calls.get() + 1);
                Ok(1)
            });
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_compute_error_is_not_cached() {
        let cache = Cache::new();
        let failed: Result<u32, &str> = cache.remember("k", Duration::from_secs(60), || Err("db"));
        assert!(failed.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_type_mismatch_is_a_miss() {
        let cache = Cache::new();
        cache.put("k", 5u32, Duration::from_secs(60));
        assert_eq!(cache.get::<String>("k"), None);
        assert_eq!(cache.get::<u32>("k"), Some(5));
    }

    #[test]
    fn test_invalidation_covers_counts_summary_and_users() {
        let cache = Cache::new();
        let ttl = Duration::from_secs(60);
        cache.put(CacheKeys::VALIDATION_COUNTS, 1u32, ttl);
        cache.put(&CacheKeys::role_counts(Role::Doctor), 1u32, ttl);
        cache.put(&CacheKeys::monthly_summary(2024, 3), 1u32, ttl);
        cache.put(&CacheKeys::monthly_summary(2024, 4), 1u32, ttl);
        cache.put(&CacheKeys::user_summary(7, None), 1u32, ttl);
        cache.put(&CacheKeys::user_summary(70, None), 1u32, ttl);
        cache.put(&CacheKeys::user_summary(8, Some((2024, 3))), 1u32, ttl);

        let scope = ChangeScope {
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            users: vec![7],
        };
        let removed = cache.invalidate(&CacheKeys::for_change(&scope));

        assert_eq!(removed, 4);
        assert!(cache.get::<u32>(&CacheKeys::monthly_summary(2024, 4)).is_some());
        assert!(cache.get::<u32>(&CacheKeys::user_summary(8, Some((2024, 3)))).is_some());
        assert!(cache.get::<u32>(&CacheKeys::user_summary(70, None)).is_some());
        assert!(cache.get::<u32>(CacheKeys::VALIDATION_COUNTS).is_none());
    }

    #[test]
    fn test_flush() {
        let cache = Cache::new();
        cache.put("a", 1u8, Duration::from_secs(1));
        cache.put("b", 2u8, Duration::from_secs(1));
        assert_eq!(cache.flush(), 2);
        assert!(cache.is_empty());
    }
}
