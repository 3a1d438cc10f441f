//! Precomputed decision snapshots
//!
//! The server exports, per scope key, a matrix of
//! `area -> functionalDomain -> action -> outcome` computed with the same
//! precedence walk as a live check. An untrusted client evaluates requests
//! against the snapshot without a round trip:
//!
//! 1. A disabled snapshot denies everything.
//! 2. Scopes are visited from the requested key through its fallback chain.
//!    The first scope holding a cell for the request decides, trying
//!    `(a,d,c)`, `(a,d,*)`, `(a,*,c)`, `(a,*,*)`, `(*,d,c)`, `(*,d,*)`,
//!    `(*,*,c)`, `(*,*,*)` in that order.
//! 3. A scope flagged `requiresServer` defers to a live check.
//! 4. Nothing found means DENY.
//!
//! ```
//! use abac_authz::engine::RuleContext;
//! use abac_authz::snapshot::{decide, ClientDecision};
//! use abac_authz::types::PrincipalContext;
//!
//! let ctx = RuleContext::default();
//! ctx.reload_from_yaml(r#"
//! - name: users view orders
//!   identity: user
//!   area: sales
//!   functionalDomain: order
//!   action: view
//!   effect: ALLOW
//! "#).unwrap();
//!
//! let alice = PrincipalContext::new("alice").with_role("user");
//! let snapshot = ctx.export_snapshot(&alice, None);
//! assert_eq!(decide(&snapshot, None, "sales", "order", "view"), ClientDecision::Allow);
//! assert_eq!(decide(&snapshot, None, "sales", "order", "delete"), ClientDecision::Deny);
//! ```

pub mod client;
pub(crate) mod export;
pub mod types;

pub use client::{decide, decide_or_deny, decide_outcome, ClientDecision, Resolution};
pub use types::{Matrix, Outcome, ScopeEntry, Snapshot, SNAPSHOT_VERSION};
