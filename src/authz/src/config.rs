//! Engine configuration
//!
//! Defaults are usable as-is. `from_env` overlays `ABAC_*` variables and
//! `from_yaml_str` / `from_yaml_file` read the same fields from YAML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::engine::CacheConfig;
use crate::error::{AuthzError, Result};
use crate::policy::Effect;
use crate::wildcard::CaseSensitivity;

/// Ordering of equal-priority rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Declaration order; the later non-final rule wins a conflict
    #[default]
    LastDeclared,
    /// Within a priority: finals, then ALLOW, then DENY
    DenyOverrides,
    /// Within a priority: finals, then DENY, then ALLOW
    AllowOverrides,
}

impl TieBreak {
    /// Sort rank of a rule inside its priority band
    pub(crate) fn rank(self, effect: Effect, final_rule: bool) -> u8 {
        let preferred = match self {
            Self::LastDeclared => return 0,
            Self::DenyOverrides => Effect::Deny,
            Self::AllowOverrides => Effect::Allow,
        };
        if final_rule {
            0
        } else if effect != preferred {
            1
        } else {
            2
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "last_declared" => Some(Self::LastDeclared),
            "deny_overrides" => Some(Self::DenyOverrides),
            "allow_overrides" => Some(Self::AllowOverrides),
            _ => None,
        }
    }
}

/// Rule context configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wildcard matching and identity bucket normalization
    pub case_sensitivity: CaseSensitivity,

    /// Effect when no rule applies
    pub default_effect: Effect,

    pub tie_break: TieBreak,

    /// Actions for which a row filter is composed
    pub filter_actions: Vec<String>,

    /// Enable the server-side decision cache
    pub enable_cache: bool,

    pub cache: CacheConfig,

    /// Enable metrics collection
    pub enable_metrics: bool,

    /// `enabled` flag written into exported snapshots
    pub snapshot_enabled: bool,

    /// Keep the built-in system and default user rules in every index
    pub seed_system_rules: bool,

    /// Identity of the system superuser in seeded rules
    pub system_user_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            case_sensitivity: CaseSensitivity::Insensitive,
            default_effect: Effect::Deny,
            tie_break: TieBreak::LastDeclared,
            filter_actions: vec!["list".to_string(), "view".to_string()],
            enable_cache: false,
            cache: CacheConfig::default(),
            enable_metrics: true,
            snapshot_enabled: true,
            seed_system_rules: false,
            system_user_id: "system@system.com".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `ABAC_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().overlay_env(|name| std::env::var(name).ok())
    }

    /// Read configuration from a YAML document; absent fields keep defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Apply overrides from a variable lookup
    ///
    /// Unparseable values are configuration errors rather than being ignored.
    pub fn overlay_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ABAC_CASE_SENSITIVITY") {
            self.case_sensitivity = match value.trim().to_ascii_lowercase().as_str() {
                "sensitive" => CaseSensitivity::Sensitive,
                "insensitive" => CaseSensitivity::Insensitive,
                _ => return Err(invalid("ABAC_CASE_SENSITIVITY", &value)),
            };
        }
        if let Some(value) = lookup("ABAC_DEFAULT_EFFECT") {
            self.default_effect = match value.trim().to_ascii_uppercase().as_str() {
                "ALLOW" => Effect::Allow,
                "DENY" => Effect::Deny,
                _ => return Err(invalid("ABAC_DEFAULT_EFFECT", &value)),
            };
        }
        if let Some(value) = lookup("ABAC_TIE_BREAK") {
            self.tie_break =
                TieBreak::parse(&value).ok_or_else(|| invalid("ABAC_TIE_BREAK", &value))?;
        }
        if let Some(value) = lookup("ABAC_FILTER_ACTIONS") {
            self.filter_actions = value
                .split(',')
                .map(str::trim)
                .filter(|action| !action.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("ABAC_ENABLE_CACHE") {
            self.enable_cache = parse_bool("ABAC_ENABLE_CACHE", &value)?;
        }
        if let Some(value) = lookup("ABAC_CACHE_CAPACITY") {
            self.cache.capacity = value
                .trim()
                .parse()
                .map_err(|_| invalid("ABAC_CACHE_CAPACITY", &value))?;
        }
        if let Some(value) = lookup("ABAC_CACHE_TTL_SECS") {
            let secs: u64 = value
                .trim()
                .parse()
                .map_err(|_| invalid("ABAC_CACHE_TTL_SECS", &value))?;
            self.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(value) = lookup("ABAC_ENABLE_METRICS") {
            self.enable_metrics = parse_bool("ABAC_ENABLE_METRICS", &value)?;
        }
        if let Some(value) = lookup("ABAC_SNAPSHOT_ENABLED") {
            self.snapshot_enabled = parse_bool("ABAC_SNAPSHOT_ENABLED", &value)?;
        }
        if let Some(value) = lookup("ABAC_SEED_SYSTEM_RULES") {
            self.seed_system_rules = parse_bool("ABAC_SEED_SYSTEM_RULES", &value)?;
        }
        if let Some(value) = lookup("ABAC_SYSTEM_USER_ID") {
            let value = value.trim();
            if value.is_empty() {
                return Err(invalid("ABAC_SYSTEM_USER_ID", value));
            }
            self.system_user_id = value.to_string();
        }
        Ok(self)
    }

    /// Whether a row filter is composed for `action`
    pub fn is_filter_action(&self, action: &str) -> bool {
        let action = self.case_sensitivity.normalize(action);
        self.filter_actions
            .iter()
            .any(|candidate| self.case_sensitivity.normalize(candidate) == action)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}

fn invalid(name: &str, value: &str) -> AuthzError {
    AuthzError::Config(format!("invalid value for {name}: '{value}'"))
}
