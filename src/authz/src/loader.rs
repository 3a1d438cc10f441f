//! Declarative rule loading
//!
//! Rule templates are YAML mappings whose header fields may be scalars or
//! lists. Each template expands to the cartesian product of its header lists
//! (identity, then area, then functional domain, then action), so the same
//! document always yields the same rules in the same order.
//!
//! Accepted document shapes:
//!
//! ```yaml
//! # a bare list of templates
//! - name: sales-readers
//!   identities: [admin, manager]
//!   area: sales
//!   functionalDomains: [order, invoice]
//!   actions: [read, write]
//!   effect: ALLOW
//! ```
//!
//! `{ rules: [...] }` is the same list under a key, and
//! `{ policies: [{ principalId, description, realm, rules: [...] }] }` groups
//! templates into policies.

use serde::Deserialize;
use serde_yaml::Value;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::guard::Guard;
use crate::policy::{Effect, JoinOp, Policy, Rule};
use crate::uri::{SecurityUriBody, SecurityUriHeader};
use crate::wildcard::{or_wildcard, WILDCARD};

/// Priority given to templates that do not set one
pub const DEFAULT_PRIORITY: i32 = 10;

/// A YAML scalar read as text (`dataSegment: 0` is the string "0")
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// A header field given as one value or a list
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl OneOrMany {
    fn values(&self) -> Vec<String> {
        match self.clone() {
            OneOrMany::One(value) => vec![or_wildcard(Some(&value.into_text()))],
            OneOrMany::Many(values) => values
                .into_iter()
                .map(|v| or_wildcard(Some(&v.into_text())))
                .collect(),
        }
    }
}

/// One declarative rule before expansion
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleTemplate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub identity: Option<OneOrMany>,
    #[serde(default)]
    pub identities: Option<OneOrMany>,
    #[serde(default)]
    pub area: Option<OneOrMany>,
    #[serde(default)]
    pub areas: Option<OneOrMany>,
    #[serde(default)]
    pub functional_domain: Option<OneOrMany>,
    #[serde(default)]
    pub functional_domains: Option<OneOrMany>,
    #[serde(default)]
    pub action: Option<OneOrMany>,
    #[serde(default)]
    pub actions: Option<OneOrMany>,

    #[serde(default)]
    pub org_ref_name: Option<Scalar>,
    #[serde(default)]
    pub account_number: Option<Scalar>,
    #[serde(default)]
    pub realm: Option<Scalar>,
    #[serde(default)]
    pub tenant_id: Option<Scalar>,
    #[serde(default)]
    pub owner_id: Option<Scalar>,
    #[serde(default)]
    pub data_segment: Option<Scalar>,

    /// `ALLOW` or `DENY` in any case; absent means DENY
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub final_rule: Option<bool>,
    #[serde(default)]
    pub and_filter_string: Option<String>,
    #[serde(default)]
    pub or_filter_string: Option<String>,
    #[serde(default)]
    pub join_op: Option<String>,
    #[serde(default)]
    pub postcondition_script: Option<String>,
}

fn axis(single: &Option<OneOrMany>, plural: &Option<OneOrMany>) -> Vec<String> {
    match (single, plural) {
        (None, None) => vec![WILDCARD.to_string()],
        _ => single
            .iter()
            .chain(plural.iter())
            .flat_map(OneOrMany::values)
            .collect(),
    }
}

fn text(value: &Option<Scalar>) -> Option<String> {
    value.clone().map(Scalar::into_text)
}

impl RuleTemplate {
    fn invalid(&self, reason: impl Into<String>) -> AuthzError {
        AuthzError::InvalidRule {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn parsed_effect(&self) -> Result<Effect> {
        match self.effect.as_deref().map(str::trim) {
            None | Some("") => Ok(Effect::Deny),
            Some(s) if s.eq_ignore_ascii_case("allow") => Ok(Effect::Allow),
            Some(s) if s.eq_ignore_ascii_case("deny") => Ok(Effect::Deny),
            Some(other) => Err(self.invalid(format!("unknown effect '{other}'"))),
        }
    }

    fn parsed_join_op(&self) -> Result<JoinOp> {
        match self.join_op.as_deref().map(str::trim) {
            None | Some("") => Ok(JoinOp::And),
            Some(s) if s.eq_ignore_ascii_case("and") => Ok(JoinOp::And),
            Some(s) if s.eq_ignore_ascii_case("or") => Ok(JoinOp::Or),
            Some(other) => Err(self.invalid(format!("unknown joinOp '{other}'"))),
        }
    }

    /// Expand into concrete rules
    pub fn expand(&self) -> Result<Vec<Rule>> {
        self.expand_with_identity(None)
    }

    /// Expand, using `default_identity` when the template names none
    pub fn expand_with_identity(&self, default_identity: Option<&str>) -> Result<Vec<Rule>> {
        let identities = match (&self.identity, &self.identities, default_identity) {
            (None, None, Some(id)) => vec![or_wildcard(Some(id))],
            _ => axis(&self.identity, &self.identities),
        };
        let areas = axis(&self.area, &self.areas);
        let domains = axis(&self.functional_domain, &self.functional_domains);
        let actions = axis(&self.action, &self.actions);

        if [&identities, &areas, &domains, &actions]
            .iter()
            .any(|values| values.is_empty())
        {
            return Err(AuthzError::EmptyExpansion(self.name.clone()));
        }

        if let Some(script) = self.postcondition_script.as_deref() {
            if !script.trim().is_empty() {
                Guard::compile(script).map_err(|source| AuthzError::InvalidGuard {
                    rule: self.name.clone(),
                    source,
                })?;
            }
        }

        let mut body = SecurityUriBody::builder();
        if let Some(v) = text(&self.org_ref_name) {
            body = body.org_ref_name(v);
        }
        if let Some(v) = text(&self.account_number) {
            body = body.account_number(v);
        }
        if let Some(v) = text(&self.realm) {
            body = body.realm(v);
        }
        if let Some(v) = text(&self.tenant_id) {
            body = body.tenant_id(v);
        }
        if let Some(v) = text(&self.owner_id) {
            body = body.owner_id(v);
        }
        if let Some(v) = text(&self.data_segment) {
            body = body.data_segment(v);
        }

        let mut template = Rule::builder(self.name.clone())
            .body(body.build())
            .effect(self.parsed_effect()?)
            .priority(self.priority.unwrap_or(DEFAULT_PRIORITY))
            .final_rule(self.final_rule.unwrap_or(false))
            .join_op(self.parsed_join_op()?);
        if let Some(description) = &self.description {
            template = template.description(description.clone());
        }
        if let Some(fragment) = &self.and_filter_string {
            template = template.and_filter(fragment.clone());
        }
        if let Some(fragment) = &self.or_filter_string {
            template = template.or_filter(fragment.clone());
        }
        if let Some(script) = &self.postcondition_script {
            template = template.guard(script.clone());
        }

        let mut rules =
            Vec::with_capacity(identities.len() * areas.len() * domains.len() * actions.len());
        for identity in &identities {
            for area in &areas {
                for domain in &domains {
                    for action in &actions {
                        let header = SecurityUriHeader::builder()
                            .identity(identity.as_str())
                            .area(area.as_str())
                            .functional_domain(domain.as_str())
                            .action(action.as_str())
                            .build();
                        rules.push(template.clone().header(header).build()?);
                    }
                }
            }
        }

        debug!(template = %self.name, expanded = rules.len(), "Expanded rule template");
        Ok(rules)
    }
}

/// A policy whose rules are templates
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyTemplate {
    pub principal_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleTemplate>,
}

impl PolicyTemplate {
    /// Expand every rule; templates without identity use the principal id
    pub fn expand(&self) -> Result<Policy> {
        let mut rules = Vec::new();
        for template in &self.rules {
            rules.extend(template.expand_with_identity(Some(&self.principal_id))?);
        }
        Ok(Policy {
            principal_id: self.principal_id.clone(),
            description: self.description.clone(),
            realm: self.realm.clone(),
            rules,
        })
    }
}

enum Document {
    Rules(Vec<RuleTemplate>),
    Policies(Vec<PolicyTemplate>),
}

fn parse_document(yaml: &str) -> Result<Document> {
    let value: Value = serde_yaml::from_str(yaml)?;
    match value {
        Value::Null => Ok(Document::Rules(Vec::new())),
        Value::Sequence(_) => Ok(Document::Rules(serde_yaml::from_value(value)?)),
        Value::Mapping(mut map) => {
            if let Some(policies) = map.remove("policies") {
                Ok(Document::Policies(serde_yaml::from_value(policies)?))
            } else if let Some(rules) = map.remove("rules") {
                Ok(Document::Rules(serde_yaml::from_value(rules)?))
            } else {
                // a single template
                Ok(Document::Rules(vec![serde_yaml::from_value(Value::Mapping(map))?]))
            }
        }
        _ => Err(AuthzError::InvalidInput(
            "rule document must be a list or a mapping".to_string(),
        )),
    }
}

/// Load and expand all rules in a YAML document
pub fn load_str(yaml: &str) -> Result<Vec<Rule>> {
    match parse_document(yaml)? {
        Document::Rules(templates) => {
            let mut rules = Vec::new();
            for template in &templates {
                rules.extend(template.expand()?);
            }
            Ok(rules)
        }
        Document::Policies(policies) => {
            let mut rules = Vec::new();
            for policy in &policies {
                rules.extend(policy.expand()?.rules);
            }
            Ok(rules)
        }
    }
}

/// Load a YAML document as policies
///
/// A plain rule list becomes one policy per distinct header identity, in
/// first-seen order.
pub fn load_policies_str(yaml: &str) -> Result<Vec<Policy>> {
    match parse_document(yaml)? {
        Document::Policies(policies) => policies.iter().map(PolicyTemplate::expand).collect(),
        Document::Rules(templates) => {
            let mut policies: Vec<Policy> = Vec::new();
            for template in &templates {
                for rule in template.expand()? {
                    let identity = rule.header().identity().to_string();
                    match policies.iter_mut().find(|p| p.principal_id == identity) {
                        Some(policy) => policy.rules.push(rule),
                        None => policies.push(Policy::new(identity).with_rule(rule)),
                    }
                }
            }
            Ok(policies)
        }
    }
}

/// Load rules from a reader
pub fn load_reader<R: Read>(mut reader: R) -> Result<Vec<Rule>> {
    let mut yaml = String::new();
    reader.read_to_string(&mut yaml)?;
    load_str(&yaml)
}

/// Load rules from a file
pub fn load_path(path: impl AsRef<Path>) -> Result<Vec<Rule>> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path)?;
    let rules = load_str(&yaml)?;
    debug!(path = %path.display(), rules = rules.len(), "Loaded rule file");
    Ok(rules)
}
