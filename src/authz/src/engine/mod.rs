//! Rule context: the server-side evaluator
//!
//! Rules are held in an immutable [`RuleIndex`] published through an
//! `ArcSwap`. Decisions load the current index once and never observe a
//! partially built one; writers build a complete replacement and swap it in.

pub mod cache;
pub mod decision;
pub mod filter;
pub mod index;
pub mod metrics;
pub mod system;

pub use cache::{CacheConfig, CacheStats, DecisionCache};
pub use decision::{
    DecisionScope, MatchPhase, NotApplicable, RuleResult, SecurityCheckResponse, WinningRule,
};
pub use filter::{FilterComposer, FilterExpr, FilterVariables};
pub use index::{IndexedRule, RuleIndex};
pub use metrics::{EngineMetrics, MetricsCollector};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{AuthzError, Result};
use crate::guard::GuardContext;
use crate::loader;
use crate::policy::{Policy, PolicyStore, Rule};
use crate::scope::ScopeResolver;
use crate::snapshot::{export::build_snapshot, Snapshot};
use crate::types::{DataDomain, PrincipalContext, ResourceContext};
use crate::uri::SecurityUriHeader;
use index::Applicability;

/// Server-side rule evaluator
///
/// # Pipeline
///
/// ```text
/// principal ─┬─> identity buckets (userId, roles, *) ─> priority order
///            │                                              │
/// resource ──┴─> header match ─> body match ─> guard ─> final short-circuit
///                                                           │
///                                   [Cache] <── response ───┴──> row filter
/// ```
pub struct RuleContext {
    index: ArcSwap<RuleIndex>,

    /// Serializes writers; readers never take it
    writer: Mutex<()>,

    scope_resolver: ScopeResolver,

    cache: Option<DecisionCache>,

    metrics: Option<Arc<MetricsCollector>>,

    config: EngineConfig,
}

impl RuleContext {
    /// Create an empty rule context
    pub fn new(config: EngineConfig) -> Self {
        let cache = config
            .enable_cache
            .then(|| DecisionCache::new(config.cache.clone()));
        let metrics = config
            .enable_metrics
            .then(|| Arc::new(MetricsCollector::new()));

        info!(
            cache = config.enable_cache,
            metrics = config.enable_metrics,
            tie_break = ?config.tie_break,
            "RuleContext initialized"
        );

        let index = if config.seed_system_rules {
            seeded_index(&config)
        } else {
            RuleIndex::new(config.case_sensitivity)
        };

        Self {
            index: ArcSwap::from_pointee(index),
            writer: Mutex::new(()),
            scope_resolver: ScopeResolver::new(),
            cache,
            metrics,
            config,
        }
    }

    /// Create a context and load `rules` as its first index
    pub fn with_rules<I>(config: EngineConfig, rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = Rule>,
    {
        let ctx = Self::new(config);
        ctx.reload(rules)?;
        Ok(ctx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The index currently serving decisions
    pub fn index(&self) -> Arc<RuleIndex> {
        self.index.load_full()
    }

    pub fn index_version(&self) -> u64 {
        self.index.load().version()
    }

    pub fn rule_count(&self) -> usize {
        self.index.load().len()
    }

    /// Rules declared under `identity`, in declaration order
    pub fn rules_for_identity(&self, identity: &str) -> Vec<Rule> {
        self.index
            .load()
            .rules_for_identity(identity)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Add one rule under `header.identity` (copy-on-write)
    pub fn add_rule(&self, header: &SecurityUriHeader, rule: Rule) -> Result<u64> {
        let _writer = self.writer.lock();
        let mut next = RuleIndex::clone(&self.index.load());
        if let Err(e) = next.insert(header.identity(), rule) {
            self.reject(&e);
            return Err(e);
        }
        Ok(self.publish(next))
    }

    /// Replace every rule, keyed by each rule's header identity
    ///
    /// The new index is fully built before it is published; on error the
    /// current index keeps serving.
    pub fn reload<I>(&self, rules: I) -> Result<u64>
    where
        I: IntoIterator<Item = Rule>,
    {
        let _writer = self.writer.lock();
        let rules: Vec<Rule> = rules.into_iter().collect();
        let rules = if self.config.seed_system_rules {
            match system::with_system_rules(&self.config.system_user_id, rules) {
                Ok(rules) => rules,
                Err(e) => {
                    self.reject(&e);
                    return Err(e);
                }
            }
        } else {
            rules
        };
        let keyed = rules
            .into_iter()
            .map(|rule| (rule.header().identity().to_string(), rule));
        match RuleIndex::build(self.config.case_sensitivity, keyed) {
            Ok(next) => Ok(self.publish(next)),
            Err(e) => {
                self.reject(&e);
                Err(e)
            }
        }
    }

    /// Replace every rule with the rules of `policies`, in order
    pub fn reload_policies(&self, policies: &[Policy]) -> Result<u64> {
        self.reload(policies.iter().flat_map(|p| p.rules.iter().cloned()))
    }

    /// Load and expand a YAML rule document, then reload
    pub fn reload_from_yaml(&self, yaml: &str) -> Result<u64> {
        match loader::load_str(yaml) {
            Ok(rules) => self.reload(rules),
            Err(e) => {
                self.reject(&e);
                Err(e)
            }
        }
    }

    /// Load a YAML rule file, then reload
    pub fn reload_from_path(&self, path: impl AsRef<Path>) -> Result<u64> {
        match loader::load_path(path) {
            Ok(rules) => self.reload(rules),
            Err(e) => {
                self.reject(&e);
                Err(e)
            }
        }
    }

    /// Reload from the policies a store holds for `realm`
    pub async fn reload_from_store(&self, store: &dyn PolicyStore, realm: &str) -> Result<u64> {
        let policies = store.list_for_realm(realm).await?;
        debug!(realm, policies = policies.len(), "Fetched policies for reload");
        self.reload_policies(&policies)
    }

    /// Publish `next` as the new index; caller holds the writer lock
    fn publish(&self, next: RuleIndex) -> u64 {
        let version = self.index.load().version() + 1;
        let rules = next.len();
        self.index.store(Arc::new(next.with_version(version)));

        if let Some(cache) = &self.cache {
            cache.clear();
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_index_swap();
        }

        info!(version, rules, "Rule index swapped");
        version
    }

    fn reject(&self, error: &AuthzError) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rejected_reload();
        }
        warn!(
            error = %error,
            version = self.index.load().version(),
            "Rejected rule change; keeping current index"
        );
    }

    /// Decide a request
    ///
    /// A DENY is a normal outcome here; use [`RuleContext::authorize`] for an
    /// error on DENY. Errors are programming or configuration faults: a
    /// principal without a user id, a resource without area, domain or
    /// action, or a filter placeholder with no value.
    #[instrument(
        skip_all,
        fields(
            user = %principal.user_id,
            area = %resource.area,
            domain = %resource.functional_domain,
            action = %resource.action
        )
    )]
    pub fn check_rules(
        &self,
        principal: &PrincipalContext,
        resource: &ResourceContext,
    ) -> Result<SecurityCheckResponse> {
        let start = Instant::now();
        let result = self.check_inner(principal, resource);

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(response) => {
                    metrics.record_decision(response.is_allowed(), response.is_default())
                }
                Err(_) => metrics.record_error(),
            }
            metrics.record_latency(start.elapsed());
        }
        result
    }

    /// Decide a request whose contexts may be absent
    ///
    /// A missing context is a caller bug and is reported, never defaulted.
    pub fn check_request(
        &self,
        principal: Option<&PrincipalContext>,
        resource: Option<&ResourceContext>,
    ) -> Result<SecurityCheckResponse> {
        let principal = principal.ok_or(AuthzError::MissingContext("principal"))?;
        let resource = resource.ok_or(AuthzError::MissingContext("resource"))?;
        self.check_rules(principal, resource)
    }

    /// Decide a request, turning DENY into [`AuthzError::AccessDenied`]
    pub fn authorize(
        &self,
        principal: &PrincipalContext,
        resource: &ResourceContext,
    ) -> Result<SecurityCheckResponse> {
        let response = self.check_rules(principal, resource)?;
        if response.is_allowed() {
            Ok(response)
        } else {
            Err(AuthzError::AccessDenied(Box::new(response)))
        }
    }

    fn check_inner(
        &self,
        principal: &PrincipalContext,
        resource: &ResourceContext,
    ) -> Result<SecurityCheckResponse> {
        validate(principal, resource)?;

        let index = self.index.load_full();

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(principal, resource, index.version()) {
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_hit();
                }
                debug!("Cache hit");
                return Ok(hit.reissued_for(principal));
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_miss();
            }
        }

        let response = self.evaluate(&index, principal, resource)?;

        if let Some(cache) = &self.cache {
            cache.put(principal, resource, index.version(), response.clone());
        }
        Ok(response)
    }

    fn evaluate(
        &self,
        index: &RuleIndex,
        principal: &PrincipalContext,
        resource: &ResourceContext,
    ) -> Result<SecurityCheckResponse> {
        let case = self.config.case_sensitivity;
        let candidates = index.candidates(principal, self.config.tie_break);
        let tenancy = resource.tenancy(principal);
        let guard_ctx = GuardContext::new(principal, resource, case);

        debug!(candidates = candidates.len(), "Evaluating candidate rules");

        let eval = index::evaluate(&candidates, |candidate| {
            let rule = candidate.rule();
            if !rule.header().matches(resource, case) {
                return Applicability::Ignored;
            }
            if !rule.body().matches(&tenancy, case) {
                debug!(rule = rule.name(), body = %rule.body(), "Body does not match");
                return Applicability::Skipped(
                    MatchPhase::Body,
                    format!("body {} does not match the resource tenancy", rule.body()),
                );
            }
            match candidate.guard().map(|guard| guard.evaluate(&guard_ctx)) {
                None | Some(Ok(true)) => {
                    debug!(rule = rule.name(), effect = %rule.effect(), "Rule applies");
                    Applicability::Applies
                }
                Some(Ok(false)) => {
                    debug!(rule = rule.name(), "Guard evaluated to false");
                    Applicability::Skipped(MatchPhase::Guard, "guard evaluated to false".into())
                }
                Some(Err(e)) => {
                    warn!(rule = rule.name(), error = %e, "Guard evaluation failed; rule not applied");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_guard_failure();
                    }
                    Applicability::Skipped(MatchPhase::Guard, e.to_string())
                }
            }
        });

        let final_effect = eval.effect.unwrap_or(self.config.default_effect);
        let winner = eval.winner.as_ref().map(|w| w.winning());
        let mut response =
            SecurityCheckResponse::new(principal, resource, final_effect, winner, index.version());

        if final_effect.is_allow() && self.config.is_filter_action(&resource.action) {
            let vars = FilterVariables::from_contexts(principal, resource);
            let mut composer = FilterComposer::new();
            for applied in &eval.applied {
                composer.push(applied.rule(), &vars)?;
            }
            response.row_filter = composer.finish();
        }

        response.rule_results = eval.rule_results;
        response.not_applicable = eval.not_applicable;

        debug!(
            effect = %response.final_effect,
            rule = response.winning_rule_name().unwrap_or("-"),
            "Decision computed"
        );
        Ok(response)
    }

    /// Export a client snapshot for `principal`
    ///
    /// The requested scope is `requested` when given, else the principal's
    /// own data domain.
    #[instrument(skip_all, fields(user = %principal.user_id))]
    pub fn export_snapshot(
        &self,
        principal: &PrincipalContext,
        requested: Option<&DataDomain>,
    ) -> Snapshot {
        let (key, fallback) = self
            .scope_resolver
            .resolve(requested.unwrap_or(&principal.data_domain));
        let index = self.index.load();
        build_snapshot(&index, &self.config, principal, &key, &fallback)
    }

    /// Current metrics, if enabled
    pub fn metrics(&self) -> Option<EngineMetrics> {
        self.metrics.as_ref().map(|m| m.get_metrics())
    }

    /// Prometheus text exposition, if metrics are enabled
    pub fn export_prometheus(&self) -> Option<String> {
        self.metrics.as_ref().map(|m| m.export_prometheus())
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(DecisionCache::stats)
    }

    pub fn scope_resolver(&self) -> &ScopeResolver {
        &self.scope_resolver
    }
}

impl Default for RuleContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Version-0 index holding only the built-in rules
fn seeded_index(config: &EngineConfig) -> RuleIndex {
    let built = system::system_rules(&config.system_user_id).and_then(|rules| {
        RuleIndex::build(
            config.case_sensitivity,
            rules
                .into_iter()
                .map(|rule| (rule.header().identity().to_string(), rule)),
        )
    });
    match built {
        Ok(index) => index,
        Err(e) => {
            warn!(error = %e, "Could not seed system rules; starting empty");
            RuleIndex::new(config.case_sensitivity)
        }
    }
}

fn validate(principal: &PrincipalContext, resource: &ResourceContext) -> Result<()> {
    if principal.user_id.trim().is_empty() {
        return Err(AuthzError::MissingContext("principal"));
    }
    let blank = [
        ("area", &resource.area),
        ("functionalDomain", &resource.functional_domain),
        ("action", &resource.action),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());
    if let Some((field, _)) = blank {
        return Err(AuthzError::InvalidInput(format!(
            "resource {field} must not be empty"
        )));
    }
    Ok(())
}
