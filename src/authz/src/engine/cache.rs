//! Server-side decision cache

use blake3::Hasher;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::decision::SecurityCheckResponse;
use crate::types::{DataDomain, PrincipalContext, ResourceContext};

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache
    pub capacity: usize,

    /// Time-to-live for cached decisions
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(60),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Cache key type (BLAKE3 hash)
type CacheKey = [u8; 32];

#[derive(Clone)]
struct CachedEntry {
    response: SecurityCheckResponse,
    cached_at: Instant,
}

impl CachedEntry {
    fn new(response: SecurityCheckResponse) -> Self {
        Self {
            response,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Decision cache keyed by the full request and index version
///
/// A reload bumps the index version, so entries computed against an older
/// index are never returned.
pub struct DecisionCache {
    entries: DashMap<CacheKey, CachedEntry>,
    config: CacheConfig,
    stats: DashMap<&'static str, usize>,
}

impl DecisionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            stats: DashMap::new(),
        }
    }

    /// Get a cached decision
    pub fn get(
        &self,
        principal: &PrincipalContext,
        resource: &ResourceContext,
        index_version: u64,
    ) -> Option<SecurityCheckResponse> {
        let key = Self::compute_key(principal, resource, index_version);

        if let Some(entry) = self.entries.get(&key) {
            if entry.is_expired(self.config.ttl) {
                drop(entry);
                self.entries.remove(&key);
                self.increment_stat("expirations");
                return None;
            }

            self.increment_stat("hits");
            return Some(entry.response.clone());
        }

        self.increment_stat("misses");
        None
    }

    /// Store a decision
    pub fn put(
        &self,
        principal: &PrincipalContext,
        resource: &ResourceContext,
        index_version: u64,
        response: SecurityCheckResponse,
    ) {
        if self.config.capacity == 0 {
            return;
        }

        let key = Self::compute_key(principal, resource, index_version);

        if self.entries.len() >= self.config.capacity {
            self.evict();
        }

        self.entries.insert(key, CachedEntry::new(response));
    }

    /// Clear the entire cache
    pub fn clear(&self) {
        self.entries.clear();
        self.stats.clear();
    }

    /// Drop expired entries
    pub fn cleanup_expired(&self) {
        let ttl = self.config.ttl;
        self.entries.retain(|_, entry| !entry.is_expired(ttl));
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            evictions: self.get_stat("evictions"),
            entries: self.entries.len(),
            max_entries: self.config.capacity,
        }
    }

    fn compute_key(
        principal: &PrincipalContext,
        resource: &ResourceContext,
        index_version: u64,
    ) -> CacheKey {
        let mut hasher = Hasher::new();
        hasher.update(&index_version.to_le_bytes());

        // Principal
        update_str(&mut hasher, &principal.user_id);
        let mut roles: Vec<&str> = principal.roles.iter().map(String::as_str).collect();
        roles.sort_unstable();
        roles.dedup();
        hasher.update(&(roles.len() as u64).to_le_bytes());
        for role in roles {
            update_str(&mut hasher, role);
        }
        update_domain(&mut hasher, &principal.data_domain);
        update_str(&mut hasher, &principal.default_realm);
        hasher.update(&(principal.properties.len() as u64).to_le_bytes());
        for (k, v) in &principal.properties {
            update_str(&mut hasher, k);
            update_str(&mut hasher, v);
        }

        // Resource
        update_str(&mut hasher, &resource.area);
        update_str(&mut hasher, &resource.functional_domain);
        update_str(&mut hasher, &resource.action);
        update_opt(&mut hasher, resource.resource_id.as_deref());
        update_opt(&mut hasher, resource.owner_id.as_deref());
        update_opt(&mut hasher, resource.realm.as_deref());
        match &resource.data_domain {
            Some(domain) => {
                hasher.update(&[1]);
                update_domain(&mut hasher, domain);
            }
            None => {
                hasher.update(&[0]);
            }
        }

        *hasher.finalize().as_bytes()
    }

    /// Remove up to 10% of entries
    fn evict(&self) {
        let to_remove = (self.config.capacity / 10).max(1);
        let mut removed = 0;

        self.entries.retain(|_, _| {
            if removed < to_remove {
                removed += 1;
                false
            } else {
                true
            }
        });

        self.stats
            .entry("evictions")
            .and_modify(|count| *count += removed)
            .or_insert(removed);
    }

    fn increment_stat(&self, key: &'static str) {
        self.stats
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

// Length-prefixed so adjacent fields cannot collide.
fn update_str(hasher: &mut Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn update_opt(hasher: &mut Hasher, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update(&[1]);
            update_str(hasher, value);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn update_domain(hasher: &mut Hasher, domain: &DataDomain) {
    update_str(hasher, &domain.org_ref_name);
    update_str(hasher, &domain.account_number);
    update_str(hasher, &domain.tenant_id);
    update_str(hasher, &domain.data_segment);
    update_str(hasher, &domain.owner_id);
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub evictions: usize,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Effect;

    fn request() -> (PrincipalContext, ResourceContext) {
        (
            PrincipalContext::new("alice").with_roles(["user", "auditor"]),
            ResourceContext::new("sales", "order", "view").with_owner("alice"),
        )
    }

    fn response(p: &PrincipalContext, r: &ResourceContext) -> SecurityCheckResponse {
        SecurityCheckResponse::new(p, r, Effect::Allow, None, 1)
    }

    #[test]
    fn test_cache_put_get() {
        let cache = DecisionCache::new(CacheConfig::default());
        let (p, r) = request();

        assert!(cache.get(&p, &r, 1).is_none());
        cache.put(&p, &r, 1, response(&p, &r));

        let cached = cache.get(&p, &r, 1).unwrap();
        assert_eq!(cached.final_effect, Effect::Allow);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_index_version_is_part_of_key() {
        let cache = DecisionCache::new(CacheConfig::default());
        let (p, r) = request();

        cache.put(&p, &r, 1, response(&p, &r));
        assert!(cache.get(&p, &r, 2).is_none());
    }

    #[test]
    fn test_role_order_does_not_matter() {
        let cache = DecisionCache::new(CacheConfig::default());
        let (p, r) = request();
        cache.put(&p, &r, 1, response(&p, &r));

        let reordered = PrincipalContext::new("alice").with_roles(["auditor", "user"]);
        assert!(cache.get(&reordered, &r, 1).is_some());
    }

    #[test]
    fn test_resource_owner_changes_key() {
        let cache = DecisionCache::new(CacheConfig::default());
        let (p, r) = request();
        cache.put(&p, &r, 1, response(&p, &r));

        let other = ResourceContext::new("sales", "order", "view").with_owner("bob");
        assert!(cache.get(&p, &other, 1).is_none());
    }

    #[test]
    fn test_cache_ttl() {
        let cache = DecisionCache::new(CacheConfig {
            ttl: Duration::from_millis(20),
            ..Default::default()
        });
        let (p, r) = request();
        cache.put(&p, &r, 1, response(&p, &r));

        std::thread::sleep(Duration::from_millis(50));

        assert!(cache.get(&p, &r, 1).is_none());
        assert!(cache.stats().expirations > 0);
    }

    #[test]
    fn test_capacity_eviction() {
        let cache = DecisionCache::new(CacheConfig {
            capacity: 10,
            ..Default::default()
        });
        let p = PrincipalContext::new("alice");

        for i in 0..25 {
            let r = ResourceContext::new("sales", "order", "view").with_resource_id(i.to_string());
            cache.put(&p, &r, 1, response(&p, &r));
        }

        let stats = cache.stats();
        assert!(stats.entries <= 10);
        assert!(stats.evictions > 0);
    }

    #[test]
    fn test_cache_clear() {
        let cache = DecisionCache::new(CacheConfig::default());
        let (p, r) = request();
        cache.put(&p, &r, 1, response(&p, &r));

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_config_ttl_in_seconds() {
        let config: CacheConfig = serde_yaml::from_str("capacity: 5\nttl: 30\n").unwrap();
        assert_eq!(config.capacity, 5);
        assert_eq!(config.ttl, Duration::from_secs(30));
    }
}
