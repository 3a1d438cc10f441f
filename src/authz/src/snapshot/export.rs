//! Server-side snapshot export
//!
//! For each exported scope the rules whose body matches that scope are
//! evaluated over every cell of `areas x domains x actions`, where each axis
//! holds the literal header tokens seen in the scope plus `*`. Each cell runs
//! the same precedence walk as a live check.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use super::types::{Outcome, ScopeEntry, Snapshot, SNAPSHOT_VERSION};
use crate::config::EngineConfig;
use crate::engine::index::{evaluate, Applicability, IndexedRule, RuleIndex};
use crate::scope::ScopeKey;
use crate::types::{PrincipalContext, ResourceContext};
use crate::uri::SecurityUriHeader;
use crate::wildcard::{self, CaseSensitivity, WILDCARD};

/// Export decision matrices for `principal` around `requested`
///
/// Scopes covered: the requested key, its fallback chain, and every scope
/// named by a candidate rule body that is literal or `*` in all fields.
pub(crate) fn build_snapshot(
    index: &RuleIndex,
    config: &EngineConfig,
    principal: &PrincipalContext,
    requested: &ScopeKey,
    fallback: &[ScopeKey],
) -> Snapshot {
    let case = config.case_sensitivity;
    let candidates = index.candidates(principal, config.tie_break);

    let mut keys: BTreeSet<ScopeKey> = BTreeSet::new();
    keys.insert(requested.clone());
    keys.extend(fallback.iter().cloned());
    keys.extend(
        candidates
            .iter()
            .filter_map(|r| ScopeKey::from_body(r.rule().body())),
    );

    let mut scopes = BTreeMap::new();
    for key in &keys {
        let entry = export_scope(&candidates, principal, key, case);
        debug!(
            scope = %key,
            cells = entry.cell_count(),
            requires_server = entry.requires_server,
            "Exported scope"
        );
        scopes.insert(key.to_string(), entry);
    }

    info!(
        user = %principal.user_id,
        scopes = scopes.len(),
        candidates = candidates.len(),
        index_version = index.version(),
        "Snapshot exported"
    );

    Snapshot {
        version: SNAPSHOT_VERSION,
        index_version: index.version(),
        case_sensitive: !case.is_insensitive(),
        enabled: config.snapshot_enabled,
        scopes,
        requested_scope: requested.to_string(),
        requested_fallback: fallback.iter().map(ToString::to_string).collect(),
    }
}

fn export_scope(
    candidates: &[Arc<IndexedRule>],
    principal: &PrincipalContext,
    key: &ScopeKey,
    case: CaseSensitivity,
) -> ScopeEntry {
    // Tenancy is the same for every cell of a scope
    let probe = ResourceContext::default().with_data_domain(key.to_data_domain());
    let tenancy = probe.tenancy(principal);

    let in_scope: Vec<Arc<IndexedRule>> = candidates
        .iter()
        .filter(|r| r.rule().body().matches(&tenancy, case))
        .cloned()
        .collect();

    let mut entry = ScopeEntry {
        requires_server: in_scope.iter().any(|r| r.needs_server()),
        ..Default::default()
    };

    let areas = axis(&in_scope, SecurityUriHeader::area, case);
    let domains = axis(&in_scope, SecurityUriHeader::functional_domain, case);
    let actions = axis(&in_scope, SecurityUriHeader::action, case);

    for area in &areas {
        for domain in &domains {
            for action in &actions {
                let eval = evaluate(&in_scope, |r| {
                    if !r.needs_server()
                        && r.rule().header().matches_triple(area, domain, action, case)
                    {
                        Applicability::Applies
                    } else {
                        Applicability::Ignored
                    }
                });

                if let (Some(effect), Some(winner)) = (eval.effect, eval.winner) {
                    let rule = winner.rule();
                    entry.insert(
                        area,
                        domain,
                        action,
                        Outcome {
                            effect,
                            priority: rule.priority(),
                            final_rule: rule.is_final(),
                            rule: rule.name().to_string(),
                            source: winner.source().to_string(),
                        },
                    );
                }
            }
        }
    }

    entry
}

/// Literal tokens of one header field, normalized, plus `*`
fn axis(
    rules: &[Arc<IndexedRule>],
    field: fn(&SecurityUriHeader) -> &str,
    case: CaseSensitivity,
) -> BTreeSet<String> {
    let mut tokens: BTreeSet<String> = rules
        .iter()
        .filter(|r| !r.needs_server())
        .map(|r| field(r.rule().header()))
        .filter(|token| wildcard::is_literal(token))
        .map(|token| case.normalize(token).into_owned())
        .collect();
    tokens.insert(WILDCARD.to_string());
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Effect, Rule};
    use crate::types::DataDomain;
    use crate::uri::SecurityUriBody;

    fn header(identity: &str, area: &str, domain: &str, action: &str) -> SecurityUriHeader {
        SecurityUriHeader::builder()
            .identity(identity)
            .area(area)
            .functional_domain(domain)
            .action(action)
            .build()
    }

    fn index(rules: Vec<Rule>) -> RuleIndex {
        RuleIndex::build(
            CaseSensitivity::Insensitive,
            rules
                .into_iter()
                .map(|r| (r.header().identity().to_string(), r)),
        )
        .unwrap()
    }

    fn export(idx: &RuleIndex, config: &EngineConfig, requested: &ScopeKey) -> Snapshot {
        build_snapshot(idx, config, &alice(), requested, &requested.fallback_chain())
    }

    fn alice() -> PrincipalContext {
        PrincipalContext::new("alice")
            .with_role("user")
            .with_data_domain(DataDomain::new("acme", "A1", "t-1", "0", "alice"))
    }

    #[test]
    fn test_matrix_cells_and_axes() {
        let idx = index(vec![
            Rule::builder("view orders")
                .header(header("user", "Sales", "order", "view"))
                .build()
                .unwrap(),
            Rule::builder("no deletes")
                .header(header("user", "*", "*", "delete"))
                .effect(Effect::Deny)
                .build()
                .unwrap(),
        ]);
        let requested = ScopeKey::from_data_domain(&alice().data_domain);
        let snapshot = export(&idx, &EngineConfig::default(), &requested);

        let entry = snapshot.scope(&requested.to_string()).unwrap();
        assert!(!entry.requires_server);
        assert_eq!(
            entry.get("sales", "order", "view").map(|o| o.rule.as_str()),
            Some("view orders")
        );
        assert_eq!(
            entry.get("*", "*", "delete").map(|o| o.effect),
            Some(Effect::Deny)
        );
        assert!(entry.get("sales", "order", "*").is_none());
        assert_eq!(snapshot.requested_fallback.len(), 5);
    }

    #[test]
    fn test_guarded_rule_requires_server() {
        let idx = index(vec![Rule::builder("owner only")
            .header(header("user", "*", "*", "*"))
            .guard("principal.userId == resource.ownerId")
            .build()
            .unwrap()]);
        let requested = ScopeKey::from_data_domain(&alice().data_domain);
        let snapshot = export(&idx, &EngineConfig::default(), &requested);

        let entry = snapshot.scope(&requested.to_string()).unwrap();
        assert!(entry.requires_server);
        assert_eq!(entry.cell_count(), 0);
    }

    #[test]
    fn test_body_scopes_exported() {
        let body = SecurityUriBody::builder().org_ref_name("globex").build();
        let idx = index(vec![Rule::builder("globex viewers")
            .header(header("user", "*", "*", "view"))
            .body(body)
            .build()
            .unwrap()]);
        let requested = ScopeKey::from_data_domain(&alice().data_domain);
        let snapshot = export(&idx, &EngineConfig::default(), &requested);

        let globex = snapshot
            .scope("org=globex|acct=*|tenant=*|seg=*|owner=*")
            .unwrap();
        assert!(globex.get("*", "*", "view").is_some());

        // The rule does not apply to the caller's own tenancy
        let own = snapshot.scope(&requested.to_string()).unwrap();
        assert_eq!(own.cell_count(), 0);
    }

    #[test]
    fn test_disabled_flag_follows_config() {
        let config = EngineConfig {
            snapshot_enabled: false,
            ..Default::default()
        };
        let global = ScopeKey::global();
        let snapshot = build_snapshot(
            &index(vec![]),
            &config,
            &alice(),
            &global,
            &global.fallback_chain(),
        );
        assert!(!snapshot.enabled);
        assert_eq!(snapshot.scopes.len(), 1);
    }
}
