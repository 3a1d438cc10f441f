//! Snapshot conformance
//!
//! A client decision over an exported snapshot must match a live server
//! check for the same principal, scope and request, unless the client is
//! told to defer.

use abac_authz::{
    snapshot::{decide, decide_outcome, Resolution},
    CaseSensitivity, ClientDecision, DataDomain, Effect, EngineConfig, PrincipalContext,
    ResourceContext, Rule, RuleContext, ScopeKey, SecurityUriBody, SecurityUriHeader, Snapshot,
    TieBreak,
};
use proptest::prelude::*;

fn alice() -> PrincipalContext {
    PrincipalContext::new("alice")
        .with_role("user")
        .with_data_domain(DataDomain::new("acme", "A1", "t-1", "0", "alice"))
}

fn header(identity: &str, area: &str, domain: &str, action: &str) -> SecurityUriHeader {
    SecurityUriHeader::builder()
        .identity(identity)
        .area(area)
        .functional_domain(domain)
        .action(action)
        .build()
}

/// Live decision for a request placed in `key`'s tenancy
fn server(ctx: &RuleContext, key: &ScopeKey, area: &str, domain: &str, action: &str) -> Effect {
    let resource =
        ResourceContext::new(area, domain, action).with_data_domain(key.to_data_domain());
    ctx.check_rules(&alice(), &resource).unwrap().final_effect
}

// ============================================================================
// FIXTURES
// ============================================================================

const STOREFRONT: &str = r#"
- name: staff browse
  identity: user
  action: [view, list]
  effect: ALLOW
- name: own orders
  identity: user
  area: sales
  functionalDomain: order
  ownerId: alice
  effect: ALLOW
  priority: 20
- name: order lock
  identity: "*"
  area: sales
  functionalDomain: order
  action: delete
  effect: DENY
  priority: 50
  finalRule: true
- name: globex partners
  identity: user
  orgRefName: globex
  action: view
  effect: ALLOW
  postconditionScript: "principal.tenantId in ['t-1', 't-2']"
"#;

fn storefront() -> (RuleContext, Snapshot) {
    let ctx = RuleContext::default();
    ctx.reload_from_yaml(STOREFRONT).unwrap();
    let snapshot = ctx.export_snapshot(&alice(), None);
    (ctx, snapshot)
}

#[test]
fn test_storefront_snapshot_shape() {
    let (ctx, snapshot) = storefront();
    assert!(snapshot.enabled);
    assert_eq!(snapshot.index_version, ctx.index_version());
    assert_eq!(
        snapshot.requested_scope,
        "org=acme|acct=A1|tenant=t-1|seg=0|owner=alice"
    );
    assert_eq!(
        snapshot.requested_fallback.last().map(String::as_str),
        Some("org=*|acct=*|tenant=*|seg=*|owner=*")
    );

    let own = snapshot.scope(&snapshot.requested_scope).unwrap();
    assert!(!own.requires_server);
    assert_eq!(own.get("sales", "order", "delete").unwrap().rule, "order lock");

    let globex = snapshot
        .scope("org=globex|acct=*|tenant=*|seg=*|owner=*")
        .unwrap();
    assert!(globex.requires_server);
}

#[test]
fn test_storefront_client_matches_server() {
    let (ctx, snapshot) = storefront();
    let own = ScopeKey::parse(&snapshot.requested_scope).unwrap();

    for (area, domain, action) in [
        ("sales", "order", "view"),
        ("sales", "order", "update"),
        ("sales", "order", "delete"),
        ("sales", "invoice", "list"),
        ("hr", "payslip", "update"),
        ("Sales", "ORDER", "Update"),
    ] {
        let client = decide(&snapshot, None, area, domain, action);
        assert_eq!(
            client,
            ClientDecision::from(server(&ctx, &own, area, domain, action)),
            "{area}:{domain}:{action}"
        );
    }
}

#[test]
fn test_storefront_guarded_scope_defers() {
    let (_, snapshot) = storefront();
    let globex = DataDomain::new("globex", "", "", "", "");
    assert_eq!(
        decide(&snapshot, Some(&globex), "sales", "order", "view"),
        ClientDecision::Defer {
            scope: "org=globex|acct=*|tenant=*|seg=*|owner=*".to_string()
        }
    );
}

#[test]
fn test_snapshot_survives_json() {
    let (_, snapshot) = storefront();
    let json = snapshot.to_json().unwrap();
    assert!(json.contains("\"requiresServer\""));
    assert!(json.contains("\"requestedFallback\""));

    let restored = Snapshot::from_json(&json).unwrap();
    assert_eq!(restored, snapshot);
    assert_eq!(
        decide(&restored, None, "sales", "order", "delete"),
        ClientDecision::Deny
    );
}

#[test]
fn test_disabled_snapshot_denies_everything() {
    let config = EngineConfig {
        snapshot_enabled: false,
        ..Default::default()
    };
    let ctx = RuleContext::new(config);
    ctx.reload_from_yaml(STOREFRONT).unwrap();
    let snapshot = ctx.export_snapshot(&alice(), None);

    assert_eq!(
        decide_outcome(&snapshot, None, "sales", "order", "view"),
        Resolution::Disabled
    );
    assert_eq!(
        decide(&snapshot, None, "sales", "order", "view"),
        ClientDecision::Deny
    );
}

#[test]
fn test_reload_changes_next_snapshot() {
    let (ctx, before) = storefront();
    ctx.reload_from_yaml(
        r#"
- name: read only
  identity: user
  action: view
  effect: ALLOW
"#,
    )
    .unwrap();
    let after = ctx.export_snapshot(&alice(), None);

    assert!(after.index_version > before.index_version);
    assert_eq!(
        decide(&before, None, "sales", "order", "list"),
        ClientDecision::Allow
    );
    assert_eq!(
        decide(&after, None, "sales", "order", "list"),
        ClientDecision::Deny
    );
}

// ============================================================================
// PROPERTY: CLIENT == SERVER
// ============================================================================

const IDENTITIES: [&str; 3] = ["user", "admin", "*"];
const AREAS: [&str; 4] = ["sales", "Sales", "hr", "*"];
const DOMAINS: [&str; 4] = ["order", "Order", "invoice", "*"];
const ACTIONS: [&str; 4] = ["view", "list", "delete", "*"];
const ORGS: [&str; 3] = ["*", "acme", "globex"];
const OWNERS: [&str; 3] = ["*", "alice", "bob"];

fn tie_break() -> impl Strategy<Value = TieBreak> {
    prop_oneof![
        Just(TieBreak::LastDeclared),
        Just(TieBreak::DenyOverrides),
        Just(TieBreak::AllowOverrides),
    ]
}

fn case_mode() -> impl Strategy<Value = CaseSensitivity> {
    prop_oneof![
        Just(CaseSensitivity::Sensitive),
        Just(CaseSensitivity::Insensitive),
    ]
}

#[derive(Debug, Clone)]
struct RuleShape {
    identity: usize,
    area: usize,
    domain: usize,
    action: usize,
    allow: bool,
    priority: i32,
    final_rule: bool,
    org: usize,
    owner: usize,
    guarded: bool,
}

fn rule_shape() -> impl Strategy<Value = RuleShape> {
    (
        (0..IDENTITIES.len(), 0..AREAS.len(), 0..DOMAINS.len(), 0..ACTIONS.len()),
        (any::<bool>(), 0..3i32, prop::bool::weighted(0.2)),
        (0..ORGS.len(), 0..OWNERS.len(), prop::bool::weighted(0.1)),
    )
        .prop_map(
            |((identity, area, domain, action), (allow, priority, final_rule), (org, owner, guarded))| {
                RuleShape {
                    identity,
                    area,
                    domain,
                    action,
                    allow,
                    priority,
                    final_rule,
                    org,
                    owner,
                    guarded,
                }
            },
        )
}

fn build(i: usize, shape: &RuleShape) -> Rule {
    let body = SecurityUriBody::builder()
        .org_ref_name(ORGS[shape.org])
        .owner_id(OWNERS[shape.owner])
        .build();
    let mut builder = Rule::builder(format!("rule-{i}"))
        .header(header(
            IDENTITIES[shape.identity],
            AREAS[shape.area],
            DOMAINS[shape.domain],
            ACTIONS[shape.action],
        ))
        .body(body)
        .effect(if shape.allow { Effect::Allow } else { Effect::Deny })
        .priority(shape.priority)
        .final_rule(shape.final_rule);
    if shape.guarded {
        builder = builder.guard("principal.userId == resource.ownerId");
    }
    builder.build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_client_agrees_with_server(
        shapes in prop::collection::vec(rule_shape(), 0..12),
        tie_break in tie_break(),
        case_sensitivity in case_mode(),
    ) {
        let rules: Vec<Rule> = shapes.iter().enumerate().map(|(i, s)| build(i, s)).collect();
        let config = EngineConfig {
            tie_break,
            case_sensitivity,
            ..Default::default()
        };
        let ctx = RuleContext::with_rules(config, rules).unwrap();
        let snapshot = ctx.export_snapshot(&alice(), None);

        let queries_area = ["sales", "Sales", "SALES", "hr", "billing"];
        let queries_domain = ["order", "Order", "invoice", "ledger"];
        let queries_action = ["view", "list", "delete", "approve"];

        for scope in snapshot.scopes.keys() {
            let key = ScopeKey::parse(scope).unwrap();
            let domain_override = key.to_data_domain();

            for area in queries_area {
                for domain in queries_domain {
                    for action in queries_action {
                        let client = decide(&snapshot, Some(&domain_override), area, domain, action);
                        if matches!(client, ClientDecision::Defer { .. }) {
                            continue;
                        }
                        let expected = server(&ctx, &key, area, domain, action);
                        prop_assert_eq!(
                            client,
                            ClientDecision::from(expected),
                            "scope {} request {}:{}:{}",
                            scope, area, domain, action
                        );
                    }
                }
            }
        }
    }
}
