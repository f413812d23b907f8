//! Time-bucketed memoization for resolved quotes.
//!
//! Entries are keyed by `(key, unix_secs / ttl)`, so a value lives until the
//! wall clock crosses into the next bucket. Each entry is a `OnceLock`: concurrent
//! callers asking for the same key in the same bucket block on one fetch instead
//! of issuing their own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{BondQuerySpec, SourceKind, YieldQuote};
use crate::error::ResolutionFailure;
use crate::resolver::YieldResolver;

type Slot<V> = Arc<OnceLock<V>>;

pub struct QuoteCache<V> {
    ttl_secs: u64,
    slots: Mutex<HashMap<(String, u64), Slot<V>>>,
}

impl<V: Clone> QuoteCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl_secs: ttl.as_secs().max(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn bucket(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from(now.timestamp()).unwrap_or(0) / self.ttl_secs
    }

    /// Return the cached value for `key` in `now`'s bucket, running `fetch` at most
    /// once per bucket.
    pub fn get_or_fetch_at<F>(&self, key: &str, now: DateTime<Utc>, fetch: F) -> V
    where
        F: FnOnce() -> V,
    {
        let bucket = self.bucket(now);
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if !slots.contains_key(&(key.to_string(), bucket)) {
                slots.retain(|(_, b), _| *b >= bucket);
            }
            slots
                .entry((key.to_string(), bucket))
                .or_insert_with(|| Arc::new(OnceLock::new()))
                .clone()
        };
        // The map lock is released here; only callers of this key wait on the cell.
        slot.get_or_init(fetch).clone()
    }

    /// Number of live entries, filled or in flight.
    fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// `YieldResolver` behind a `QuoteCache`. Failures are cached for the bucket too,
/// so a dead source chain is not hammered on every refresh.
pub struct CachedResolver {
    resolver: YieldResolver,
    cache: QuoteCache<Result<YieldQuote, ResolutionFailure>>,
}

impl CachedResolver {
    pub fn new(resolver: YieldResolver, ttl: Duration) -> Self {
        Self {
            resolver,
            cache: QuoteCache::new(ttl),
        }
    }

    pub fn sources(&self) -> Vec<SourceKind> {
        self.resolver.sources()
    }

    pub fn resolve(&self, spec: &BondQuerySpec) -> Result<YieldQuote, ResolutionFailure> {
        self.resolve_at(spec, Utc::now())
    }

    pub fn resolve_at(&self, spec: &BondQuerySpec, now: DateTime<Utc>) -> Result<YieldQuote, ResolutionFailure> {
        self.cache.get_or_fetch_at(spec.key(), now, || {
            debug!(instrument = spec.key(), live_entries = self.cache.len(), "cache miss");
            self.resolver.resolve(spec)
        })
    }
}
