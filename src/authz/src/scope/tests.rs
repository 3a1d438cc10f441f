//! Test suite for the scope module
//!
//! Tests cover:
//! - Key formatting and parsing
//! - Fallback chain shape
//! - Resolver caching
//! - Concurrent access

use super::*;
use crate::types::DataDomain;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

fn acme() -> DataDomain {
    DataDomain::new("acme", "A1", "t-1", "0", "u1")
}

// ============================================================================
// Scope Key Tests
// ============================================================================

#[test]
fn test_scope_key_from_data_domain() {
    assert_eq!(scope_key(&acme()), "org=acme|acct=A1|tenant=t-1|seg=0|owner=u1");
}

#[test]
fn test_scope_key_is_verbatim() {
    // no case folding or pattern handling at this stage
    let key = scope_key(&DataDomain::new("ACME", "a*", "t-1", "0", "U1"));
    assert_eq!(key, "org=ACME|acct=a*|tenant=t-1|seg=0|owner=U1");
}

#[test]
fn test_scope_key_round_trip() {
    let key = ScopeKey::from_data_domain(&acme());
    let parsed = ScopeKey::parse(&key.to_string()).unwrap();
    assert_eq!(parsed, key);
    assert_eq!(parsed.to_data_domain(), acme());
}

// ============================================================================
// Fallback Chain Tests
// ============================================================================

#[test]
fn test_fallback_chain_shape() {
    let key = scope_key(&acme());
    let chain = fallback_chain(&key).unwrap();

    assert_eq!(
        chain,
        vec![
            "org=acme|acct=A1|tenant=t-1|seg=0|owner=*",
            "org=acme|acct=A1|tenant=t-1|seg=*|owner=*",
            "org=acme|acct=A1|tenant=*|seg=*|owner=*",
            "org=acme|acct=*|tenant=*|seg=*|owner=*",
            "org=*|acct=*|tenant=*|seg=*|owner=*",
        ]
    );
}

#[test]
fn test_scope_chain_has_six_entries() {
    let key = scope_key(&acme());
    let chain = scope_chain(&key).unwrap();

    assert_eq!(chain.len(), 6);
    assert_eq!(chain[0], key);
    assert_eq!(chain[1], "org=acme|acct=A1|tenant=t-1|seg=0|owner=*");
    assert_eq!(chain[5], GLOBAL_SCOPE_KEY);
}

#[test]
fn test_chain_from_global_key() {
    let chain = fallback_chain(GLOBAL_SCOPE_KEY).unwrap();
    assert_eq!(chain.len(), 5);
    assert!(chain.iter().all(|k| k == GLOBAL_SCOPE_KEY));
}

#[test]
fn test_chain_of_invalid_key() {
    assert!(matches!(fallback_chain("not-a-key"), Err(ScopeError::InvalidFormat(_))));
    assert!(matches!(scope_chain(""), Err(ScopeError::EmptyScope)));
}

#[test]
fn test_widening_order() {
    let labels: Vec<&str> = WIDENING_ORDER.iter().map(|f| f.label()).collect();
    assert_eq!(labels, vec!["owner", "seg", "tenant", "acct", "org"]);
}

proptest! {
    #[test]
    fn prop_each_step_widens_one_more_field(
        org in "[a-z]{1,6}",
        acct in "[A-Z0-9]{1,6}",
        tenant in "t-[0-9]{1,3}",
        seg in "[0-9]",
        owner in "u[0-9]{1,3}",
    ) {
        let key = ScopeKey::new(&org, &acct, &tenant, &seg, &owner);
        let chain = key.scope_chain();
        prop_assert_eq!(chain.len(), 6);

        for (step, scope) in chain.iter().enumerate() {
            let wildcarded = WIDENING_ORDER.iter().filter(|f| scope.get(**f) == "*").count();
            prop_assert_eq!(wildcarded, step);
        }
    }
}

// ============================================================================
// Resolver Tests
// ============================================================================

#[test]
fn test_resolver_matches_free_functions() {
    let resolver = ScopeResolver::new();
    let (key, chain) = resolver.resolve(&acme());

    let expected = fallback_chain(&key.to_string()).unwrap();
    let actual: Vec<String> = chain.iter().map(ToString::to_string).collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_resolver_stats() {
    let resolver = ScopeResolver::new();
    let key = ScopeKey::from_data_domain(&acme());

    resolver.fallback_chain(&key);
    resolver.fallback_chain(&key);
    resolver.fallback_chain(&ScopeKey::global());

    let stats = resolver.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.entries, 2);
    assert!(stats.hit_rate() > 0.0);

    resolver.reset_stats();
    assert_eq!(resolver.stats().hits, 0);
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[test]
fn test_concurrent_access() {
    let resolver = Arc::new(ScopeResolver::new());
    let mut handles = vec![];

    for i in 0..10 {
        let resolver = Arc::clone(&resolver);
        handles.push(thread::spawn(move || {
            let key = ScopeKey::new("acme", "A1", format!("t-{}", i), "0", "u1");
            resolver.fallback_chain(&key).len()
        }));
    }

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 5);
    }

    let stats = resolver.stats();
    assert_eq!(stats.hits + stats.misses, 10);
}
