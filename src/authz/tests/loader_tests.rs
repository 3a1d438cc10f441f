//! Declarative rule loading through files, stores and the rule context

use abac_authz::{
    loader, AuthzError, Effect, EngineConfig, InMemoryPolicyStore, PolicyStore, PrincipalContext,
    ResourceContext, RuleContext,
};
use std::io::Write;
use tempfile::NamedTempFile;

const SALES: &str = r#"
rules:
  - name: sales staff
    identities: [admin, manager]
    area: sales
    functionalDomains: [order, invoice]
    actions: [read, write]
    effect: ALLOW
    priority: 5
  - name: interns read
    identity: intern
    area: sales
    action: read
    effect: allow
"#;

#[test]
fn test_expansion_is_cartesian_and_ordered() {
    let rules = loader::load_str(SALES).unwrap();
    assert_eq!(rules.len(), 9);

    let staff: Vec<String> = rules[..8]
        .iter()
        .map(|r| {
            let h = r.header();
            format!(
                "{}:{}:{}:{}",
                h.identity(),
                h.area(),
                h.functional_domain(),
                h.action()
            )
        })
        .collect();
    assert_eq!(staff[0], "admin:sales:order:read");
    assert_eq!(staff[1], "admin:sales:order:write");
    assert_eq!(staff[2], "admin:sales:invoice:read");
    assert_eq!(staff[7], "manager:sales:invoice:write");
    assert!(rules[..8]
        .iter()
        .all(|r| r.name() == "sales staff" && r.priority() == 5 && r.effect() == Effect::Allow));

    let intern = &rules[8];
    assert_eq!(intern.header().functional_domain(), "*");
    assert_eq!(intern.priority(), loader::DEFAULT_PRIORITY);
}

#[test]
fn test_two_loads_are_identical() {
    assert_eq!(
        loader::load_str(SALES).unwrap(),
        loader::load_str(SALES).unwrap()
    );
}

#[test]
fn test_load_from_file_and_reload() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(SALES.as_bytes()).unwrap();

    let rules = loader::load_path(file.path()).unwrap();
    assert_eq!(rules.len(), 9);

    let ctx = RuleContext::default();
    ctx.reload_from_path(file.path()).unwrap();
    assert_eq!(ctx.rule_count(), 9);
    assert_eq!(ctx.rules_for_identity("manager").len(), 4);

    let manager = PrincipalContext::new("mia").with_role("manager");
    assert!(ctx
        .check_rules(&manager, &ResourceContext::new("sales", "invoice", "write"))
        .unwrap()
        .is_allowed());
    assert!(!ctx
        .check_rules(&manager, &ResourceContext::new("sales", "invoice", "delete"))
        .unwrap()
        .is_allowed());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RuleContext::default();
    let err = ctx
        .reload_from_path(dir.path().join("absent.yaml"))
        .unwrap_err();
    assert!(matches!(err, AuthzError::Io(_)));
    assert_eq!(ctx.index_version(), 0);
}

#[test]
fn test_bad_documents_are_rejected() {
    let unknown_effect = r#"
- name: typo
  identity: user
  effect: PERMIT
"#;
    assert!(matches!(
        loader::load_str(unknown_effect),
        Err(AuthzError::InvalidRule { .. })
    ));

    let unknown_field = r#"
- name: typo
  identity: user
  efect: ALLOW
"#;
    assert!(loader::load_str(unknown_field).is_err());
}

#[test]
fn test_policies_document() {
    let yaml = r#"
policies:
  - principalId: manager
    description: Sales managers
    realm: emea
    rules:
      - name: approve orders
        area: sales
        functionalDomain: order
        action: approve
        effect: ALLOW
"#;
    let policies = loader::load_policies_str(yaml).unwrap();
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0].realm.as_deref(), Some("emea"));
    assert_eq!(policies[0].rules[0].header().identity(), "manager");
}

#[tokio::test]
async fn test_reload_from_store_filters_realm() {
    let yaml = r#"
policies:
  - principalId: manager
    realm: emea
    rules:
      - name: emea approvals
        area: sales
        action: approve
        effect: ALLOW
  - principalId: clerk
    realm: apac
    rules:
      - name: apac entry
        area: sales
        action: create
        effect: ALLOW
  - principalId: auditor
    rules:
      - name: audit everywhere
        action: view
        effect: ALLOW
"#;
    let store = InMemoryPolicyStore::new();
    for policy in loader::load_policies_str(yaml).unwrap() {
        store.put(policy).await.unwrap();
    }

    let ctx = RuleContext::new(EngineConfig::default());
    ctx.reload_from_store(&store, "emea").await.unwrap();

    assert_eq!(ctx.rule_count(), 2);
    assert!(ctx.rules_for_identity("clerk").is_empty());
    assert_eq!(ctx.rules_for_identity("auditor").len(), 1);
}
