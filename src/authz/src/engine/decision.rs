//! Decision output and evaluation trace

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::filter::FilterExpr;
use crate::policy::Effect;
use crate::types::{Impersonation, PrincipalContext, ResourceContext};

/// Whether a rule decided or the default effect applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionScope {
    Exact,
    Default,
}

/// Stage at which a header-matched rule dropped out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchPhase {
    Body,
    Guard,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Body => f.write_str("BODY"),
            Self::Guard => f.write_str("GUARD"),
        }
    }
}

/// The rule that determined the final effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinningRule {
    pub name: String,
    pub priority: i32,
    pub final_rule: bool,
    /// Identity bucket the rule was found under (user id, role or `*`)
    pub source: String,
    /// Canonical security URI of the rule
    pub uri: String,
}

/// One applicable rule, in evaluation order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub name: String,
    pub source: String,
    pub priority: i32,
    pub effect: Effect,
    pub final_rule: bool,
    /// Running effect after this rule was applied
    pub determined_effect: Effect,
}

/// A rule whose header matched but which did not apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotApplicable {
    pub rule_name: String,
    pub phase: MatchPhase,
    pub reason: String,
}

/// Result of a rule check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityCheckResponse {
    pub decision_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub principal_id: String,
    /// `area:functionalDomain:action` of the request
    pub request: String,
    pub final_effect: Effect,
    pub decision_scope: DecisionScope,
    /// `NA-DENY` / `NA-ALLOW` when the default effect applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub na_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_rule: Option<WinningRule>,
    #[serde(default)]
    pub rule_results: Vec<RuleResult>,
    #[serde(default)]
    pub not_applicable: Vec<NotApplicable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_filter: Option<FilterExpr>,
    pub index_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonation: Option<Impersonation>,
}

impl SecurityCheckResponse {
    pub(crate) fn new(
        principal: &PrincipalContext,
        resource: &ResourceContext,
        final_effect: Effect,
        winning_rule: Option<WinningRule>,
        index_version: u64,
    ) -> Self {
        let (decision_scope, na_label) = match winning_rule {
            Some(_) => (DecisionScope::Exact, None),
            None => (DecisionScope::Default, Some(format!("NA-{final_effect}"))),
        };

        Self {
            decision_id: Uuid::new_v4(),
            evaluated_at: Utc::now(),
            principal_id: principal.user_id.clone(),
            request: format!(
                "{}:{}:{}",
                resource.area, resource.functional_domain, resource.action
            ),
            final_effect,
            decision_scope,
            na_label,
            winning_rule,
            rule_results: Vec::new(),
            not_applicable: Vec::new(),
            row_filter: None,
            index_version,
            impersonation: principal.impersonation.clone(),
        }
    }

    /// Reissue a cached decision for the current caller
    ///
    /// The decision id, timestamp and impersonation trail always describe
    /// the live request, never the one that populated the cache.
    pub(crate) fn reissued_for(mut self, principal: &PrincipalContext) -> Self {
        self.decision_id = Uuid::new_v4();
        self.evaluated_at = Utc::now();
        self.impersonation = principal.impersonation.clone();
        self
    }

    pub fn is_allowed(&self) -> bool {
        self.final_effect.is_allow()
    }

    pub fn is_default(&self) -> bool {
        self.decision_scope == DecisionScope::Default
    }

    pub fn winning_rule_name(&self) -> Option<&str> {
        self.winning_rule.as_ref().map(|w| w.name.as_str())
    }

    /// One-line explanation for logs and error messages
    pub fn summary(&self) -> String {
        match &self.winning_rule {
            Some(rule) => format!(
                "{} for '{}' on {} by rule '{}' (priority {}{})",
                self.final_effect,
                self.principal_id,
                self.request,
                rule.name,
                rule.priority,
                if rule.final_rule { ", final" } else { "" }
            ),
            None => format!(
                "{} for '{}' on {}: no applicable rule",
                self.final_effect, self.principal_id, self.request
            ),
        }
    }
}
