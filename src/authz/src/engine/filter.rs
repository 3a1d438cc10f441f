//! Row filter composition for list operations
//!
//! Rules carry optional `andFilterString` / `orFilterString` fragments with
//! `${var}` placeholders. After a decision, the fragments of every applicable
//! rule are substituted and folded into one predicate of the form
//! `(conjunction) || alt1 || alt2 ...`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{AuthzError, Result};
use crate::policy::{JoinOp, Rule};
use crate::types::{PrincipalContext, ResourceContext};

/// Composed row filter predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterExpr {
    /// Substituted filter fragment, opaque to the engine
    Fragment(String),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    fn join(op: JoinOp, mut terms: Vec<FilterExpr>) -> Self {
        if terms.len() == 1 {
            if let Some(term) = terms.pop() {
                return term;
            }
        }
        match op {
            JoinOp::And => Self::And(terms),
            JoinOp::Or => Self::Or(terms),
        }
    }

    /// Fragments in rendering order
    pub fn fragments(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fragments(&mut out);
        out
    }

    fn collect_fragments<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Fragment(text) => out.push(text),
            Self::And(terms) | Self::Or(terms) => {
                terms.iter().for_each(|term| term.collect_fragments(out))
            }
        }
    }

    fn fmt_term(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fragment(_) => write!(f, "{self}"),
            _ => write!(f, "({self})"),
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (terms, sep) = match self {
            Self::Fragment(text) => return f.write_str(text),
            Self::And(terms) => (terms, " && "),
            Self::Or(terms) => (terms, " || "),
        };
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                f.write_str(sep)?;
            }
            term.fmt_term(f)?;
        }
        Ok(())
    }
}

/// Values available to `${var}` placeholders
#[derive(Debug, Clone, Default)]
pub struct FilterVariables {
    values: BTreeMap<String, String>,
}

impl FilterVariables {
    /// Standard variables for a request, then the principal's custom properties
    pub fn from_contexts(principal: &PrincipalContext, resource: &ResourceContext) -> Self {
        let domain = &principal.data_domain;
        let mut values = BTreeMap::new();
        values.insert("principalId".to_string(), principal.user_id.clone());
        values.insert("pAccountId".to_string(), domain.account_number.clone());
        values.insert("pTenantId".to_string(), domain.tenant_id.clone());
        values.insert("ownerId".to_string(), domain.owner_id.clone());
        values.insert("orgRefName".to_string(), domain.org_ref_name.clone());
        values.insert("defaultRealm".to_string(), principal.default_realm.clone());
        values.insert("action".to_string(), resource.action.clone());
        values.insert("functionalDomain".to_string(), resource.functional_domain.clone());
        values.insert("area".to_string(), resource.area.clone());
        if let Some(resource_id) = &resource.resource_id {
            values.insert("resourceId".to_string(), resource_id.clone());
        }

        for (key, value) in &principal.properties {
            values.entry(key.clone()).or_insert_with(|| value.clone());
        }

        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Replace every `${name}` in `fragment`
    ///
    /// An unterminated `${` is kept as literal text.
    pub fn substitute(&self, rule: &str, fragment: &str) -> Result<String> {
        let mut out = String::with_capacity(fragment.len());
        let mut rest = fragment;

        while let Some(start) = rest.find("${") {
            let Some(len) = rest[start + 2..].find('}') else {
                break;
            };
            let name = &rest[start + 2..start + 2 + len];
            let value = self
                .get(name)
                .ok_or_else(|| AuthzError::UnresolvedFilterVariable {
                    rule: rule.to_string(),
                    variable: name.to_string(),
                })?;
            out.push_str(&rest[..start]);
            out.push_str(value);
            rest = &rest[start + 3 + len..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Accumulates rule fragments in evaluation order
#[derive(Debug, Default)]
pub struct FilterComposer {
    conjunction: Vec<FilterExpr>,
    alternatives: Vec<FilterExpr>,
}

impl FilterComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one applicable rule into the aggregate
    pub fn push(&mut self, rule: &Rule, vars: &FilterVariables) -> Result<()> {
        let and = rule
            .and_filter_string()
            .map(|f| vars.substitute(rule.name(), f))
            .transpose()?;
        let or = rule
            .or_filter_string()
            .map(|f| vars.substitute(rule.name(), f))
            .transpose()?;

        let (expr, op) = match (and, or) {
            (Some(and), Some(or)) => {
                let op = rule.join_op();
                let expr =
                    FilterExpr::join(op, vec![FilterExpr::Fragment(and), FilterExpr::Fragment(or)]);
                (expr, op)
            }
            (Some(and), None) => (FilterExpr::Fragment(and), JoinOp::And),
            (None, Some(or)) => (FilterExpr::Fragment(or), JoinOp::Or),
            (None, None) => return Ok(()),
        };

        let target = match op {
            JoinOp::And => &mut self.conjunction,
            JoinOp::Or => &mut self.alternatives,
        };
        if !target.contains(&expr) {
            target.push(expr);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.conjunction.is_empty() && self.alternatives.is_empty()
    }

    /// Aggregate predicate, `None` when no rule constrained the rows
    pub fn finish(self) -> Option<FilterExpr> {
        let mut terms = Vec::with_capacity(self.alternatives.len() + 1);
        if !self.conjunction.is_empty() {
            terms.push(FilterExpr::join(JoinOp::And, self.conjunction));
        }
        terms.extend(self.alternatives);

        if terms.is_empty() {
            None
        } else {
            Some(FilterExpr::join(JoinOp::Or, terms))
        }
    }
}
