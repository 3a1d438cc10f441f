//! Scope keys and fallback chains
//!
//! A data domain (org, account, tenant, segment, owner) is encoded as a
//! canonical scope key. Decisions exported for a client are grouped by scope
//! key, and a lookup that finds nothing at one key widens along the fallback
//! chain until it reaches the global key.
//!
//! # Examples
//!
//! ```
//! use abac_authz::scope::{fallback_chain, scope_key, GLOBAL_SCOPE_KEY};
//! use abac_authz::types::DataDomain;
//!
//! let key = scope_key(&DataDomain::new("acme", "A1", "t-1", "0", "u1"));
//! let chain = fallback_chain(&key).unwrap();
//! assert_eq!(chain.last().map(String::as_str), Some(GLOBAL_SCOPE_KEY));
//! ```

mod types;
mod resolver;

#[cfg(test)]
mod tests;

pub use types::{
    fallback_chain, scope_chain, scope_key, ScopeError, ScopeField, ScopeKey, ScopeResult,
    GLOBAL_SCOPE_KEY, WIDENING_ORDER,
};
pub use resolver::{CacheStats, ScopeResolver};
