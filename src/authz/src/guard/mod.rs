//! Guard expressions attached to rules
//!
//! A guard is a small closed boolean language over a fixed attribute
//! namespace (`principal.*`, `resource.*`). It is compiled once when a rule
//! enters an index, so an unknown attribute or a syntax error is a load-time
//! failure, and evaluation never re-parses.
//!
//! ```
//! use abac_authz::guard::{Guard, GuardContext};
//! use abac_authz::types::{PrincipalContext, ResourceContext};
//! use abac_authz::wildcard::CaseSensitivity;
//!
//! let guard = Guard::compile("principal.userId == resource.ownerId").unwrap();
//! let alice = PrincipalContext::new("alice");
//! let doc = ResourceContext::new("sales", "order", "view").with_owner("alice");
//! let ctx = GuardContext::new(&alice, &doc, CaseSensitivity::Insensitive);
//! assert_eq!(guard.evaluate(&ctx), Ok(true));
//! ```

pub mod context;
pub mod error;
pub mod parser;

pub use context::{GuardContext, Value};
pub use error::{GuardError, Result};
pub use parser::{Attribute, Expr, Operand};

use std::fmt;

/// A compiled guard predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    source: String,
    expr: Expr,
}

impl Guard {
    /// Parse and validate a guard expression
    pub fn compile(source: &str) -> Result<Self> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against a request
    ///
    /// An error means the guard could not be decided (e.g. the resource has
    /// no owner); callers treat that as the rule not applying.
    pub fn evaluate(&self, ctx: &GuardContext<'_>) -> Result<bool> {
        eval(&self.expr, ctx)
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval(expr: &Expr, ctx: &GuardContext<'_>) -> Result<bool> {
    match expr {
        Expr::Bool(value) => Ok(*value),
        Expr::Not(inner) => Ok(!eval(inner, ctx)?),
        Expr::And(terms) => {
            for term in terms {
                if !eval(term, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Expr::Or(terms) => {
            for term in terms {
                if eval(term, ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Expr::Eq(lhs, rhs) => compare(lhs, rhs, ctx),
        Expr::Ne(lhs, rhs) => Ok(!compare(lhs, rhs, ctx)?),
        Expr::In(needle, haystack) => {
            let needle = scalar(needle, ctx)?;
            match ctx.operand(haystack)? {
                Value::List(items) => Ok(items.iter().any(|item| ctx.same(needle, item))),
                Value::Str(_) => Err(GuardError::InRequiresList),
            }
        }
    }
}

fn compare(lhs: &Operand, rhs: &Operand, ctx: &GuardContext<'_>) -> Result<bool> {
    let lhs = scalar(lhs, ctx)?;
    let rhs = scalar(rhs, ctx)?;
    Ok(ctx.same(lhs, rhs))
}

fn scalar<'e>(operand: &'e Operand, ctx: &GuardContext<'e>) -> Result<&'e str> {
    match ctx.operand(operand)? {
        Value::Str(value) => Ok(value),
        Value::List(_) => Err(GuardError::ListOutsideIn(format!("{operand:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataDomain, PrincipalContext, ResourceContext};
    use crate::wildcard::CaseSensitivity;

    fn eval_with(src: &str, principal: &PrincipalContext, resource: &ResourceContext) -> Result<bool> {
        let guard = Guard::compile(src)?;
        guard.evaluate(&GuardContext::new(principal, resource, CaseSensitivity::Insensitive))
    }

    #[test]
    fn test_owner_guard() {
        let alice = PrincipalContext::new("alice").with_role("user");
        let own = ResourceContext::new("sales", "order", "view").with_owner("alice");
        let other = ResourceContext::new("sales", "order", "view").with_owner("bob");

        let src = "principal.userId == resource.ownerId";
        assert_eq!(eval_with(src, &alice, &own), Ok(true));
        assert_eq!(eval_with(src, &alice, &other), Ok(false));
    }

    #[test]
    fn test_missing_owner_is_an_error() {
        let alice = PrincipalContext::new("alice");
        let bare = ResourceContext::new("sales", "order", "view");

        let result = eval_with("principal.userId == resource.ownerId", &alice, &bare);
        assert!(matches!(result, Err(ref e) if e.is_runtime()));
    }

    #[test]
    fn test_short_circuit_skips_missing_attribute() {
        let alice = PrincipalContext::new("alice");
        let bare = ResourceContext::new("sales", "order", "view");

        let src = "resource.action == 'view' || resource.ownerId == 'x'";
        assert_eq!(eval_with(src, &alice, &bare), Ok(true));
    }

    #[test]
    fn test_roles_membership() {
        let manager = PrincipalContext::new("m1").with_roles(["user", "Manager"]);
        let doc = ResourceContext::new("sales", "order", "approve");

        assert_eq!(eval_with("'manager' in principal.roles", &manager, &doc), Ok(true));
        assert_eq!(eval_with("'admin' in principal.roles", &manager, &doc), Ok(false));
        assert_eq!(
            eval_with("resource.action in ['approve', 'reject']", &manager, &doc),
            Ok(true)
        );
    }

    #[test]
    fn test_tenancy_and_properties() {
        let principal = PrincipalContext::new("alice")
            .with_data_domain(DataDomain::new("acme", "A1", "t-1", "0", "alice"))
            .with_property("region", "emea");
        let resource = ResourceContext::new("sales", "order", "view")
            .with_data_domain(DataDomain::new("acme", "A1", "t-1", "0", "bob"));

        assert_eq!(
            eval_with(
                "principal.tenantId == resource.tenantId && principal.properties.region != 'apac'",
                &principal,
                &resource
            ),
            Ok(true)
        );
        assert_eq!(
            eval_with("!(principal.orgRefName == resource.orgRefName)", &principal, &resource),
            Ok(false)
        );
    }

    #[test]
    fn test_compile_rejects_unknown_attribute() {
        assert!(matches!(
            Guard::compile("principal.ssn == '1'"),
            Err(GuardError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn test_display_keeps_source() {
        let guard = Guard::compile("true").unwrap();
        assert_eq!(guard.to_string(), "true");
        assert_eq!(guard.expr(), &Expr::Bool(true));
    }
}
