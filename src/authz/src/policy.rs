//! Rule and policy definition and storage

use crate::error::{AuthzError, Result};
use crate::uri::{SecurityUri, SecurityUriBody, SecurityUriHeader};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Rule effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action
    Deny,
}

impl Effect {
    pub fn is_allow(self) -> bool {
        matches!(self, Effect::Allow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Effect::Allow => "ALLOW",
            Effect::Deny => "DENY",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rule's filter fragments compose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinOp {
    #[default]
    And,
    Or,
}

/// A security URI bound to an effect and precedence
///
/// Rules are immutable; use [`Rule::to_builder`] to derive a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(rename = "securityURI")]
    security_uri: SecurityUri,

    effect: Effect,

    /// Lower value is evaluated first
    #[serde(default)]
    priority: i32,

    #[serde(default)]
    final_rule: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    and_filter_string: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    or_filter_string: Option<String>,

    #[serde(default)]
    join_op: JoinOp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    postcondition_script: Option<String>,
}

impl Rule {
    /// Start building a rule with the given name
    pub fn builder(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(name)
    }

    /// Builder seeded with this rule's values
    pub fn to_builder(&self) -> RuleBuilder {
        RuleBuilder {
            name: self.name.clone(),
            description: self.description.clone(),
            header: self.security_uri.header.clone(),
            body: self.security_uri.body.clone(),
            effect: self.effect,
            priority: self.priority,
            final_rule: self.final_rule,
            and_filter_string: self.and_filter_string.clone(),
            or_filter_string: self.or_filter_string.clone(),
            join_op: self.join_op,
            postcondition_script: self.postcondition_script.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn security_uri(&self) -> &SecurityUri {
        &self.security_uri
    }

    pub fn header(&self) -> &SecurityUriHeader {
        &self.security_uri.header
    }

    pub fn body(&self) -> &SecurityUriBody {
        &self.security_uri.body
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_final(&self) -> bool {
        self.final_rule
    }

    pub fn and_filter_string(&self) -> Option<&str> {
        self.and_filter_string.as_deref()
    }

    pub fn or_filter_string(&self) -> Option<&str> {
        self.or_filter_string.as_deref()
    }

    pub fn join_op(&self) -> JoinOp {
        self.join_op
    }

    pub fn postcondition_script(&self) -> Option<&str> {
        self.postcondition_script.as_deref()
    }

    /// Whether the rule carries a guard predicate
    pub fn has_guard(&self) -> bool {
        self.postcondition_script.is_some()
    }
}

/// Builder for [`Rule`]
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    name: String,
    description: Option<String>,
    header: SecurityUriHeader,
    body: SecurityUriBody,
    effect: Effect,
    priority: i32,
    final_rule: bool,
    and_filter_string: Option<String>,
    or_filter_string: Option<String>,
    join_op: JoinOp,
    postcondition_script: Option<String>,
}

impl RuleBuilder {
    /// New builder: wildcard URI, ALLOW, priority 0, not final
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            header: SecurityUriHeader::builder().build(),
            body: SecurityUriBody::default(),
            effect: Effect::Allow,
            priority: 0,
            final_rule: false,
            and_filter_string: None,
            or_filter_string: None,
            join_op: JoinOp::And,
            postcondition_script: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn header(mut self, header: SecurityUriHeader) -> Self {
        self.header = header;
        self
    }

    pub fn body(mut self, body: SecurityUriBody) -> Self {
        self.body = body;
        self
    }

    pub fn security_uri(mut self, uri: SecurityUri) -> Self {
        self.header = uri.header;
        self.body = uri.body;
        self
    }

    pub fn effect(mut self, effect: Effect) -> Self {
        self.effect = effect;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn final_rule(mut self, final_rule: bool) -> Self {
        self.final_rule = final_rule;
        self
    }

    pub fn and_filter(mut self, fragment: impl Into<String>) -> Self {
        self.and_filter_string = Some(fragment.into());
        self
    }

    pub fn or_filter(mut self, fragment: impl Into<String>) -> Self {
        self.or_filter_string = Some(fragment.into());
        self
    }

    pub fn join_op(mut self, join_op: JoinOp) -> Self {
        self.join_op = join_op;
        self
    }

    pub fn guard(mut self, script: impl Into<String>) -> Self {
        self.postcondition_script = Some(script.into());
        self
    }

    /// Clear the guard (used when deriving an unguarded variant)
    pub fn without_guard(mut self) -> Self {
        self.postcondition_script = None;
        self
    }

    /// Build the rule; the name must not be blank
    pub fn build(self) -> Result<Rule> {
        if self.name.trim().is_empty() {
            return Err(AuthzError::InvalidRule {
                name: self.name,
                reason: "rule name must not be empty".to_string(),
            });
        }

        let blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());

        Ok(Rule {
            name: self.name,
            description: self.description,
            security_uri: SecurityUri::new(self.header, self.body),
            effect: self.effect,
            priority: self.priority,
            final_rule: self.final_rule,
            and_filter_string: blank(self.and_filter_string),
            or_filter_string: blank(self.or_filter_string),
            join_op: self.join_op,
            postcondition_script: blank(self.postcondition_script),
        })
    }
}

/// Rules grouped under a principal (user id or role name)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Literal identity or role name
    pub principal_id: String,

    #[serde(default)]
    pub description: String,

    /// Realm this policy belongs to; `None` applies to every realm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,

    /// Ordered rules
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Policy {
    pub fn new(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            description: String::new(),
            realm: None,
            rules: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Whether this policy is active in `realm`
    pub fn applies_to_realm(&self, realm: &str) -> bool {
        self.realm.as_deref().map_or(true, |r| r == realm)
    }
}

/// Policy store trait
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Get a policy by principal id
    async fn get(&self, principal_id: &str) -> Result<Option<Policy>>;

    /// Store a policy, replacing any with the same principal id
    async fn put(&self, policy: Policy) -> Result<()>;

    /// List all policies ordered by principal id
    async fn list(&self) -> Result<Vec<Policy>>;

    /// Delete a policy
    async fn delete(&self, principal_id: &str) -> Result<()>;

    /// Policies active in a realm, ordered by principal id
    async fn list_for_realm(&self, realm: &str) -> Result<Vec<Policy>>;
}

/// In-memory policy store implementation
pub struct InMemoryPolicyStore {
    policies: Arc<RwLock<BTreeMap<String, Policy>>>,
}

impl InMemoryPolicyStore {
    /// Create a new in-memory policy store
    pub fn new() -> Self {
        Self {
            policies: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get(&self, principal_id: &str) -> Result<Option<Policy>> {
        let policies = self.policies.read().await;
        Ok(policies.get(principal_id).cloned())
    }

    async fn put(&self, policy: Policy) -> Result<()> {
        if policy.principal_id.trim().is_empty() {
            return Err(AuthzError::InvalidInput(
                "policy principal id must not be empty".to_string(),
            ));
        }
        let mut policies = self.policies.write().await;
        policies.insert(policy.principal_id.clone(), policy);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Policy>> {
        let policies = self.policies.read().await;
        Ok(policies.values().cloned().collect())
    }

    async fn delete(&self, principal_id: &str) -> Result<()> {
        let mut policies = self.policies.write().await;
        policies
            .remove(principal_id)
            .map(|_| ())
            .ok_or_else(|| AuthzError::PolicyNotFound(principal_id.to_string()))
    }

    async fn list_for_realm(&self, realm: &str) -> Result<Vec<Policy>> {
        let policies = self.policies.read().await;
        Ok(policies
            .values()
            .filter(|p| p.applies_to_realm(realm))
            .cloned()
            .collect())
    }
}
