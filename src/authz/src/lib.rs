//! # ABAC Authorization Engine
//!
//! Attribute-based access control for multi-tenant applications.
//!
//! ## Features
//!
//! - **Wildcard rules** over a security URI (`identity:area:domain:action`
//!   plus tenancy body)
//! - **Priority and final-rule precedence** with an explicit tie-break policy
//! - **Declarative YAML rules** with cartesian expansion of list fields
//! - **Compiled guard expressions** over a closed attribute namespace
//! - **Row filters** composed for list operations
//! - **Scope keys and fallback chains** across the tenancy hierarchy
//! - **Client snapshots** that reproduce server decisions without a round trip
//!
//! ## Example
//!
//! ```rust
//! use abac_authz::{PrincipalContext, ResourceContext, RuleContext};
//!
//! let ctx = RuleContext::default();
//! ctx.reload_from_yaml(r#"
//! - name: owners manage their records
//!   identity: user
//!   effect: ALLOW
//!   finalRule: true
//!   postconditionScript: "principal.userId == resource.ownerId"
//! - name: admins manage everything
//!   identity: admin
//!   effect: ALLOW
//!   finalRule: true
//! "#)?;
//!
//! let alice = PrincipalContext::new("alice").with_role("user");
//! let own = ResourceContext::new("sales", "order", "view").with_owner("alice");
//! let other = ResourceContext::new("sales", "order", "view").with_owner("bob");
//!
//! assert!(ctx.check_rules(&alice, &own)?.is_allowed());
//! assert!(!ctx.check_rules(&alice, &other)?.is_allowed());
//! # Ok::<(), abac_authz::AuthzError>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod loader;
pub mod policy;
pub mod scope;
pub mod snapshot;
pub mod types;
pub mod uri;
pub mod wildcard;

// Re-export commonly used types
pub use config::{EngineConfig, TieBreak};
pub use engine::{FilterExpr, RuleContext, SecurityCheckResponse};
pub use error::{AuthzError, Result};
pub use policy::{Effect, InMemoryPolicyStore, JoinOp, Policy, PolicyStore, Rule, RuleBuilder};
pub use scope::{ScopeKey, ScopeResolver};
pub use snapshot::{ClientDecision, Snapshot};
pub use types::{DataDomain, Impersonation, PrincipalContext, ResourceContext};
pub use uri::{SecurityUri, SecurityUriBody, SecurityUriHeader};
pub use wildcard::CaseSensitivity;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
