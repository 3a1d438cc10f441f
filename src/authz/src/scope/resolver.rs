//! Scope resolver with cached fallback chains
//!
//! Snapshot export resolves the same few scopes over and over; their chains
//! are kept in a bounded concurrent map with a TTL.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::types::{ScopeKey, ScopeResult};
use crate::types::DataDomain;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
const DEFAULT_CAPACITY: usize = 4096;

type Chain = Arc<Vec<ScopeKey>>;

/// Resolver cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Lookups that found an entry past its TTL
    pub expirations: usize,
    /// Entries dropped to stay under capacity
    pub evictions: usize,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.expirations;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    expirations: AtomicUsize,
    evictions: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [&self.hits, &self.misses, &self.expirations, &self.evictions] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Resolves scope keys to their fallback chains
///
/// # Examples
///
/// ```
/// use abac_authz::scope::{ScopeKey, ScopeResolver};
///
/// let resolver = ScopeResolver::new();
/// let key = ScopeKey::new("acme", "A1", "t-1", "0", "u1");
///
/// let chain = resolver.fallback_chain(&key);
/// assert_eq!(chain.len(), 5);
/// assert!(chain[4].is_global());
/// ```
#[derive(Debug)]
pub struct ScopeResolver {
    chains: DashMap<ScopeKey, (Chain, Instant)>,
    ttl: Duration,
    capacity: usize,
    counters: Counters,
}

impl ScopeResolver {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_capacity_and_ttl(DEFAULT_CAPACITY, ttl)
    }

    /// Resolver holding at most `capacity` chains (minimum one)
    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            chains: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
            counters: Counters::default(),
        }
    }

    /// The five widenings of `key`, most specific first
    pub fn fallback_chain(&self, key: &ScopeKey) -> Chain {
        if let Some(entry) = self.chains.get(key) {
            let (chain, cached_at) = entry.value();
            if cached_at.elapsed() <= self.ttl {
                Counters::bump(&self.counters.hits);
                return Arc::clone(chain);
            }
            Counters::bump(&self.counters.expirations);
        } else {
            Counters::bump(&self.counters.misses);
        }

        let chain: Chain = Arc::new(key.fallback_chain());
        if !self.chains.contains_key(key) && self.chains.len() >= self.capacity {
            self.make_room();
        }
        self.chains
            .insert(key.clone(), (Arc::clone(&chain), Instant::now()));
        chain
    }

    /// Drop expired chains, then up to a tenth of the rest if still full
    fn make_room(&self) {
        self.cleanup_expired();
        if self.chains.len() < self.capacity {
            return;
        }

        let to_remove = (self.capacity / 10).max(1);
        let mut removed = 0;
        self.chains.retain(|_, _| {
            if removed < to_remove {
                removed += 1;
                false
            } else {
                true
            }
        });
        self.counters.evictions.fetch_add(removed, Ordering::Relaxed);
    }

    /// Key for a data domain together with its fallback chain
    pub fn resolve(&self, domain: &DataDomain) -> (ScopeKey, Chain) {
        let key = ScopeKey::from_data_domain(domain);
        let chain = self.fallback_chain(&key);
        (key, chain)
    }

    /// Parse a key string and return it followed by its widenings
    pub fn scope_chain_str(&self, key: &str) -> ScopeResult<Vec<ScopeKey>> {
        let key = ScopeKey::parse(key)?;
        let fallback = self.fallback_chain(&key);
        Ok(std::iter::once(key)
            .chain(fallback.iter().cloned())
            .collect())
    }

    /// Drop every cached chain and zero the counters
    pub fn clear_cache(&self) {
        self.chains.clear();
        self.counters.reset();
    }

    pub fn cleanup_expired(&self) {
        let ttl = self.ttl;
        self.chains
            .retain(|_, (_, cached_at)| cached_at.elapsed() <= ttl);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.chains.len(),
        }
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cache_size(&self) -> usize {
        self.chains.len()
    }
}

impl Default for ScopeResolver {
    fn default() -> Self {
        Self::new()
    }
}
