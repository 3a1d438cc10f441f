//! Snapshot wire format (version 1)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::policy::Effect;

/// Current wire format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Winning rule for one matrix cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub effect: Effect,
    pub priority: i32,
    pub final_rule: bool,
    /// Rule name; written as `rule`, `ruleName` is accepted on input
    #[serde(alias = "ruleName")]
    pub rule: String,
    /// Identity bucket the rule came from
    pub source: String,
}

/// `area -> functionalDomain -> action -> outcome`
pub type Matrix = BTreeMap<String, BTreeMap<String, BTreeMap<String, Outcome>>>;

/// Decisions precomputed for one scope key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeEntry {
    /// A guarded or partial-glob rule applies here; the client must ask the server
    #[serde(default)]
    pub requires_server: bool,
    #[serde(default)]
    pub matrix: Matrix,
}

impl ScopeEntry {
    pub fn get(&self, area: &str, functional_domain: &str, action: &str) -> Option<&Outcome> {
        self.matrix.get(area)?.get(functional_domain)?.get(action)
    }

    pub(crate) fn insert(
        &mut self,
        area: &str,
        functional_domain: &str,
        action: &str,
        outcome: Outcome,
    ) {
        self.matrix
            .entry(area.to_string())
            .or_default()
            .entry(functional_domain.to_string())
            .or_default()
            .insert(action.to_string(), outcome);
    }

    /// Number of materialized cells
    pub fn cell_count(&self) -> usize {
        self.matrix
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeMap::len)
            .sum()
    }
}

/// Exported decision matrices for one principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub index_version: u64,
    pub case_sensitive: bool,
    pub enabled: bool,
    #[serde(default)]
    pub scopes: BTreeMap<String, ScopeEntry>,
    pub requested_scope: String,
    /// Widenings of `requested_scope`, most specific first
    #[serde(default)]
    pub requested_fallback: Vec<String>,
}

impl Snapshot {
    /// A snapshot that denies everything
    pub fn disabled() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            index_version: 0,
            case_sensitive: false,
            enabled: false,
            scopes: BTreeMap::new(),
            requested_scope: String::new(),
            requested_fallback: Vec::new(),
        }
    }

    pub fn scope(&self, key: &str) -> Option<&ScopeEntry> {
        self.scopes.get(key)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(effect: Effect) -> Outcome {
        Outcome {
            effect,
            priority: 10,
            final_rule: false,
            rule: "r".to_string(),
            source: "user".to_string(),
        }
    }

    #[test]
    fn test_outcome_accepts_rule_name_field() {
        let json = r#"{"effect":"DENY","priority":50,"finalRule":true,"ruleName":"order lock","source":"*"}"#;
        let parsed: Outcome = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.rule, "order lock");
        assert!(parsed.final_rule);

        let written = serde_json::to_value(&parsed).unwrap();
        assert_eq!(written["rule"], "order lock");
        assert!(written.get("ruleName").is_none());
    }

    #[test]
    fn test_scope_entry_cells() {
        let mut entry = ScopeEntry::default();
        entry.insert("sales", "order", "view", outcome(Effect::Allow));
        entry.insert("sales", "order", "*", outcome(Effect::Deny));
        entry.insert("*", "*", "*", outcome(Effect::Deny));

        assert_eq!(entry.cell_count(), 3);
        assert_eq!(entry.get("sales", "order", "view").map(|o| o.effect), Some(Effect::Allow));
        assert!(entry.get("sales", "invoice", "view").is_none());
    }

    #[test]
    fn test_wire_shape() {
        let mut snapshot = Snapshot::disabled();
        snapshot.enabled = true;
        snapshot.requested_scope = "org=acme|acct=*|tenant=*|seg=*|owner=*".to_string();
        let mut entry = ScopeEntry::default();
        entry.insert("sales", "order", "view", outcome(Effect::Allow));
        snapshot
            .scopes
            .insert(snapshot.requested_scope.clone(), entry);

        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["caseSensitive"], false);
        let scope = &json["scopes"]["org=acme|acct=*|tenant=*|seg=*|owner=*"];
        assert_eq!(scope["requiresServer"], false);
        assert_eq!(scope["matrix"]["sales"]["order"]["view"]["effect"], "ALLOW");
        assert_eq!(scope["matrix"]["sales"]["order"]["view"]["finalRule"], false);

        let back = Snapshot::from_json(&snapshot.to_json_pretty().unwrap()).unwrap();
        assert_eq!(back, snapshot);
    }
}
