//! Immutable rule index and the shared precedence walk
//!
//! Rules are bucketed by their header identity (user id, role name or `*`).
//! An index is never mutated once published; adding a rule produces a new
//! index.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::decision::{MatchPhase, NotApplicable, RuleResult, WinningRule};
use crate::config::TieBreak;
use crate::error::{AuthzError, Result};
use crate::guard::Guard;
use crate::policy::{Effect, Rule};
use crate::types::PrincipalContext;
use crate::wildcard::{self, CaseSensitivity, WILDCARD};

/// A rule together with its compiled guard
#[derive(Debug)]
pub struct IndexedRule {
    rule: Rule,
    guard: Option<Guard>,
    /// Identity the rule was added under, as written
    source: String,
    seq: u64,
}

impl IndexedRule {
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn guard(&self) -> Option<&Guard> {
        self.guard.as_ref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Declaration sequence number within the index
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Rules a snapshot cannot materialize
    pub fn needs_server(&self) -> bool {
        self.guard.is_some() || self.rule.header().has_partial_glob()
    }

    pub(crate) fn winning(&self) -> WinningRule {
        WinningRule {
            name: self.rule.name().to_string(),
            priority: self.rule.priority(),
            final_rule: self.rule.is_final(),
            source: self.source.clone(),
            uri: self.rule.security_uri().to_string(),
        }
    }
}

/// Identity-bucketed rule index
#[derive(Debug, Clone)]
pub struct RuleIndex {
    /// Literal identities (normalized) and `*`
    buckets: HashMap<String, Vec<Arc<IndexedRule>>>,
    /// Identities written as partial globs such as `sales-*`
    glob_buckets: Vec<(String, Vec<Arc<IndexedRule>>)>,
    case: CaseSensitivity,
    version: u64,
    next_seq: u64,
}

impl RuleIndex {
    pub fn new(case: CaseSensitivity) -> Self {
        Self {
            buckets: HashMap::new(),
            glob_buckets: Vec::new(),
            case,
            version: 0,
            next_seq: 0,
        }
    }

    /// Build an index from `(identity, rule)` pairs in declaration order
    pub fn build<I>(case: CaseSensitivity, rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Rule)>,
    {
        let mut index = Self::new(case);
        for (identity, rule) in rules {
            index.insert(&identity, rule)?;
        }
        Ok(index)
    }

    /// Add a rule under `identity`, compiling its guard
    pub fn insert(&mut self, identity: &str, rule: Rule) -> Result<()> {
        let guard = rule
            .postcondition_script()
            .map(Guard::compile)
            .transpose()
            .map_err(|source| AuthzError::InvalidGuard {
                rule: rule.name().to_string(),
                source,
            })?;

        let source = wildcard::or_wildcard(Some(identity));
        let key = self.case.normalize(&source).into_owned();
        let entry = Arc::new(IndexedRule {
            rule,
            guard,
            source,
            seq: self.next_seq,
        });
        self.next_seq += 1;

        if wildcard::is_partial_glob(&key) {
            match self.glob_buckets.iter_mut().find(|(pattern, _)| *pattern == key) {
                Some((_, bucket)) => bucket.push(entry),
                None => self.glob_buckets.push((key, vec![entry])),
            }
        } else {
            self.buckets.entry(key).or_default().push(entry);
        }
        Ok(())
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn case(&self) -> CaseSensitivity {
        self.case
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum::<usize>()
            + self.glob_buckets.iter().map(|(_, b)| b.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rules declared directly under `identity`, in declaration order
    pub fn rules_for_identity(&self, identity: &str) -> Vec<&Rule> {
        let key = self.case.normalize(identity);
        let literal = self.buckets.get(&*key).into_iter().flatten();
        let globbed = self
            .glob_buckets
            .iter()
            .filter(|(pattern, _)| pattern.as_str() == &*key)
            .flat_map(|(_, bucket)| bucket);
        literal.chain(globbed).map(|r| r.rule()).collect()
    }

    /// Every rule in declaration order
    pub fn all_rules(&self) -> Vec<Arc<IndexedRule>> {
        let mut rules: Vec<_> = self
            .buckets
            .values()
            .chain(self.glob_buckets.iter().map(|(_, b)| b))
            .flatten()
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.seq);
        rules
    }

    /// Rules reachable from the principal's identities, in evaluation order
    ///
    /// Keys are the user id, each role and `*`. Order is priority ascending,
    /// then the tie-break rank, then declaration order.
    pub fn candidates(
        &self,
        principal: &PrincipalContext,
        tie_break: TieBreak,
    ) -> Vec<Arc<IndexedRule>> {
        let identities: Vec<String> = principal
            .identities()
            .filter(|id| !id.trim().is_empty())
            .map(|id| self.case.normalize(id).into_owned())
            .collect();

        let mut keys: Vec<&str> = identities.iter().map(String::as_str).collect();
        keys.push(WILDCARD);
        let mut seen_keys = HashSet::new();
        keys.retain(|key| seen_keys.insert(*key));

        let mut out: Vec<Arc<IndexedRule>> = Vec::new();
        for key in &keys {
            if let Some(bucket) = self.buckets.get(*key) {
                out.extend(bucket.iter().cloned());
            }
        }
        for (pattern, bucket) in &self.glob_buckets {
            if identities
                .iter()
                .any(|id| wildcard::matches(id, pattern, self.case))
            {
                out.extend(bucket.iter().cloned());
            }
        }

        out.sort_by_key(|r| {
            (
                r.rule.priority(),
                tie_break.rank(r.rule.effect(), r.rule.is_final()),
                r.seq,
            )
        });
        out
    }
}

/// Per-rule verdict supplied by the caller of [`evaluate`]
pub(crate) enum Applicability {
    /// Header, body and guard all matched
    Applies,
    /// Header matched but the rule dropped out; recorded in the trace
    Skipped(MatchPhase, String),
    /// Header did not match; not traced
    Ignored,
}

/// Outcome of the precedence walk
#[derive(Debug, Default)]
pub(crate) struct Evaluation {
    pub effect: Option<Effect>,
    pub winner: Option<Arc<IndexedRule>>,
    /// Applicable rules in visit order, including the short-circuiting one
    pub applied: Vec<Arc<IndexedRule>>,
    pub rule_results: Vec<RuleResult>,
    pub not_applicable: Vec<NotApplicable>,
}

/// Walk candidates in order and apply final-rule short-circuit
///
/// Shared by the server check and the snapshot export so both produce the
/// same winner for the same applicable rules. The last applicable rule wins
/// unless a final rule stops the walk first.
pub(crate) fn evaluate<F>(candidates: &[Arc<IndexedRule>], mut applies: F) -> Evaluation
where
    F: FnMut(&IndexedRule) -> Applicability,
{
    let mut eval = Evaluation::default();

    for candidate in candidates {
        match applies(candidate) {
            Applicability::Ignored => continue,
            Applicability::Skipped(phase, reason) => {
                eval.not_applicable.push(NotApplicable {
                    rule_name: candidate.rule.name().to_string(),
                    phase,
                    reason,
                });
            }
            Applicability::Applies => {
                let rule = &candidate.rule;
                eval.effect = Some(rule.effect());
                eval.winner = Some(Arc::clone(candidate));
                eval.applied.push(Arc::clone(candidate));
                eval.rule_results.push(RuleResult {
                    name: rule.name().to_string(),
                    source: candidate.source.clone(),
                    priority: rule.priority(),
                    effect: rule.effect(),
                    final_rule: rule.is_final(),
                    determined_effect: rule.effect(),
                });
                if rule.is_final() {
                    break;
                }
            }
        }
    }

    eval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::SecurityUriHeader;

    fn rule(name: &str, identity: &str, priority: i32, effect: Effect, final_rule: bool) -> Rule {
        Rule::builder(name)
            .header(SecurityUriHeader::builder().identity(identity).build())
            .priority(priority)
            .effect(effect)
            .final_rule(final_rule)
            .build()
            .unwrap()
    }

    fn index(rules: Vec<Rule>) -> RuleIndex {
        RuleIndex::build(
            CaseSensitivity::Insensitive,
            rules
                .into_iter()
                .map(|r| (r.header().identity().to_string(), r)),
        )
        .unwrap()
    }

    fn names(rules: &[Arc<IndexedRule>]) -> Vec<&str> {
        rules.iter().map(|r| r.rule().name()).collect()
    }

    #[test]
    fn test_candidates_by_identity() {
        let idx = index(vec![
            rule("user rule", "user", 10, Effect::Allow, false),
            rule("admin rule", "admin", 10, Effect::Allow, false),
            rule("anyone", "*", 5, Effect::Deny, false),
            rule("alice only", "ALICE", 1, Effect::Allow, false),
        ]);
        let alice = PrincipalContext::new("alice").with_role("user");

        let c = idx.candidates(&alice, TieBreak::LastDeclared);
        assert_eq!(names(&c), vec!["alice only", "anyone", "user rule"]);
        assert_eq!(idx.len(), 4);
    }

    #[test]
    fn test_role_equal_to_user_id_not_duplicated() {
        let idx = index(vec![rule("r", "ops", 1, Effect::Allow, false)]);
        let p = PrincipalContext::new("ops").with_role("ops");
        assert_eq!(idx.candidates(&p, TieBreak::LastDeclared).len(), 1);
    }

    #[test]
    fn test_glob_identity_bucket() {
        let idx = index(vec![rule("sales roles", "sales-*", 1, Effect::Allow, false)]);
        let rep = PrincipalContext::new("carol").with_role("sales-rep");
        let other = PrincipalContext::new("dave").with_role("support");

        assert_eq!(idx.candidates(&rep, TieBreak::LastDeclared).len(), 1);
        assert!(idx.candidates(&other, TieBreak::LastDeclared).is_empty());
        assert_eq!(idx.rules_for_identity("sales-*").len(), 1);
    }

    #[test]
    fn test_tie_break_ordering() {
        let idx = index(vec![
            rule("deny", "*", 1, Effect::Deny, false),
            rule("allow", "*", 1, Effect::Allow, false),
            rule("final", "*", 1, Effect::Allow, true),
        ]);
        let p = PrincipalContext::new("x");

        let last = idx.candidates(&p, TieBreak::LastDeclared);
        assert_eq!(names(&last), vec!["deny", "allow", "final"]);

        let deny = idx.candidates(&p, TieBreak::DenyOverrides);
        assert_eq!(names(&deny), vec!["final", "allow", "deny"]);

        let allow = idx.candidates(&p, TieBreak::AllowOverrides);
        assert_eq!(names(&allow), vec!["final", "deny", "allow"]);
    }

    #[test]
    fn test_evaluate_final_short_circuit() {
        let idx = index(vec![
            rule("r1", "*", 1, Effect::Allow, true),
            rule("r2", "*", 2, Effect::Deny, false),
        ]);
        let c = idx.candidates(&PrincipalContext::new("x"), TieBreak::LastDeclared);

        let eval = evaluate(&c, |_| Applicability::Applies);
        assert_eq!(eval.effect, Some(Effect::Allow));
        assert_eq!(eval.winner.map(|w| w.rule().name().to_string()).as_deref(), Some("r1"));
        assert_eq!(eval.rule_results.len(), 1);
    }

    #[test]
    fn test_evaluate_last_non_final_wins() {
        let idx = index(vec![
            rule("r1", "*", 1, Effect::Allow, false),
            rule("r2", "*", 2, Effect::Deny, false),
        ]);
        let c = idx.candidates(&PrincipalContext::new("x"), TieBreak::LastDeclared);

        let eval = evaluate(&c, |_| Applicability::Applies);
        assert_eq!(eval.effect, Some(Effect::Deny));
        assert_eq!(eval.applied.len(), 2);
    }

    #[test]
    fn test_evaluate_records_skipped() {
        let idx = index(vec![rule("r1", "*", 1, Effect::Allow, false)]);
        let c = idx.candidates(&PrincipalContext::new("x"), TieBreak::LastDeclared);

        let eval = evaluate(&c, |_| {
            Applicability::Skipped(MatchPhase::Body, "tenant differs".to_string())
        });
        assert_eq!(eval.effect, None);
        assert_eq!(eval.not_applicable.len(), 1);
        assert_eq!(eval.not_applicable[0].phase, MatchPhase::Body);
    }

    #[test]
    fn test_invalid_guard_rejected_at_insert() {
        let bad = Rule::builder("bad")
            .guard("principal.nope == 'x'")
            .build()
            .unwrap();
        let mut idx = RuleIndex::new(CaseSensitivity::Insensitive);
        let err = idx.insert("*", bad).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidGuard { .. }));
        assert!(idx.is_empty());
    }
}
