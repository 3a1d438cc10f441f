//! Client-side decisions over an exported snapshot
//!
//! Everything here is a pure function of its inputs. A client decision is an
//! optimization only; the server re-checks any state-changing operation.

use std::borrow::Cow;

use super::types::{Outcome, ScopeEntry, Snapshot};
use crate::policy::Effect;
use crate::scope::ScopeKey;
use crate::types::DataDomain;
use crate::wildcard::{self, WILDCARD};

/// Client verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientDecision {
    Allow,
    Deny,
    /// The named scope needs a live server check
    Defer { scope: String },
}

impl ClientDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Collapse to an effect, treating `Defer` as DENY
    pub fn or_deny(&self) -> Effect {
        match self {
            Self::Allow => Effect::Allow,
            Self::Deny | Self::Defer { .. } => Effect::Deny,
        }
    }
}

impl From<Effect> for ClientDecision {
    fn from(effect: Effect) -> Self {
        match effect {
            Effect::Allow => Self::Allow,
            Effect::Deny => Self::Deny,
        }
    }
}

/// Detailed lookup result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'s> {
    /// Snapshot is disabled
    Disabled,
    Matched {
        scope: &'s str,
        outcome: &'s Outcome,
    },
    RequiresServer {
        scope: &'s str,
    },
    /// No scope in the chain has a cell for the request
    NoMatch,
}

/// Cell lookup order inside one scope
const LOOKUP_ORDER: [(bool, bool, bool); 8] = [
    (true, true, true),
    (true, true, false),
    (true, false, true),
    (true, false, false),
    (false, true, true),
    (false, true, false),
    (false, false, true),
    (false, false, false),
];

/// Find the outcome for a request
///
/// `data_domain` selects the scope to start from; `None` uses the
/// snapshot's requested scope and its precomputed fallback.
pub fn decide_outcome<'s>(
    snapshot: &'s Snapshot,
    data_domain: Option<&DataDomain>,
    area: &str,
    functional_domain: &str,
    action: &str,
) -> Resolution<'s> {
    if !snapshot.enabled {
        return Resolution::Disabled;
    }

    let area = token(snapshot, area);
    let domain = token(snapshot, functional_domain);
    let action = token(snapshot, action);

    let chain: Vec<Cow<'s, str>> = match data_domain {
        Some(dd) => ScopeKey::from_data_domain(dd)
            .scope_chain()
            .into_iter()
            .map(|key| Cow::Owned(key.to_string()))
            .collect(),
        None => std::iter::once(snapshot.requested_scope.as_str())
            .chain(snapshot.requested_fallback.iter().map(String::as_str))
            .map(Cow::Borrowed)
            .collect(),
    };

    for key in &chain {
        let Some((scope, entry)) = snapshot.scopes.get_key_value(&**key) else {
            continue;
        };
        if entry.requires_server {
            return Resolution::RequiresServer {
                scope: scope.as_str(),
            };
        }
        if let Some(outcome) = lookup(entry, &area, &domain, &action) {
            return Resolution::Matched {
                scope: scope.as_str(),
                outcome,
            };
        }
    }

    Resolution::NoMatch
}

/// Decide a request: ALLOW, DENY or defer to the server
pub fn decide(
    snapshot: &Snapshot,
    data_domain: Option<&DataDomain>,
    area: &str,
    functional_domain: &str,
    action: &str,
) -> ClientDecision {
    match decide_outcome(snapshot, data_domain, area, functional_domain, action) {
        Resolution::Matched { outcome, .. } => outcome.effect.into(),
        Resolution::RequiresServer { scope } => ClientDecision::Defer {
            scope: scope.to_string(),
        },
        Resolution::Disabled | Resolution::NoMatch => ClientDecision::Deny,
    }
}

/// Fail-closed variant for callers that cannot reach the server
pub fn decide_or_deny(
    snapshot: &Snapshot,
    data_domain: Option<&DataDomain>,
    area: &str,
    functional_domain: &str,
    action: &str,
) -> Effect {
    decide(snapshot, data_domain, area, functional_domain, action).or_deny()
}

fn lookup<'s>(entry: &'s ScopeEntry, area: &str, domain: &str, action: &str) -> Option<&'s Outcome> {
    LOOKUP_ORDER.iter().find_map(|&(a, d, c)| {
        entry.get(
            if a { area } else { WILDCARD },
            if d { domain } else { WILDCARD },
            if c { action } else { WILDCARD },
        )
    })
}

fn token<'a>(snapshot: &Snapshot, value: &'a str) -> Cow<'a, str> {
    let value = value.trim();
    if value.is_empty() {
        return Cow::Borrowed(WILDCARD);
    }
    if snapshot.case_sensitive {
        Cow::Borrowed(value)
    } else {
        wildcard::CaseSensitivity::Insensitive.normalize(value)
    }
}
