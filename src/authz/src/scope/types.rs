//! Scope key type definitions and fallback widening
//!
//! A scope key is the canonical string form of a data domain:
//! `org=<org>|acct=<acct>|tenant=<tenant>|seg=<seg>|owner=<owner>`.
//! Widening replaces one attribute at a time with `*`, in the fixed order
//! owner, data segment, tenant, account, organization.

use std::fmt;
use std::str::FromStr;

use crate::types::DataDomain;
use crate::uri::SecurityUriBody;
use crate::wildcard::{self, WILDCARD};

/// The fully wildcarded scope key
pub const GLOBAL_SCOPE_KEY: &str = "org=*|acct=*|tenant=*|seg=*|owner=*";

/// Result type for scope operations
pub type ScopeResult<T> = Result<T, ScopeError>;

/// Errors that can occur during scope operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// Empty scope string provided
    EmptyScope,
    /// Invalid scope format
    InvalidFormat(String),
    /// Same label appears twice
    DuplicateField(String),
    /// One of the five labels is missing
    MissingField(&'static str),
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyScope => write!(f, "Scope key cannot be empty"),
            Self::InvalidFormat(msg) => write!(f, "Invalid scope key format: {}", msg),
            Self::DuplicateField(label) => write!(f, "Scope key repeats '{}'", label),
            Self::MissingField(label) => write!(f, "Scope key is missing '{}'", label),
        }
    }
}

impl std::error::Error for ScopeError {}

/// Tenancy attribute of a scope key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeField {
    Org,
    Account,
    Tenant,
    Segment,
    Owner,
}

impl ScopeField {
    /// Label used in the key string
    pub fn label(self) -> &'static str {
        match self {
            Self::Org => "org",
            Self::Account => "acct",
            Self::Tenant => "tenant",
            Self::Segment => "seg",
            Self::Owner => "owner",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "org" => Some(Self::Org),
            "acct" => Some(Self::Account),
            "tenant" => Some(Self::Tenant),
            "seg" => Some(Self::Segment),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }
}

/// Order in which attributes are wildcarded, most specific first
pub const WIDENING_ORDER: [ScopeField; 5] = [
    ScopeField::Owner,
    ScopeField::Segment,
    ScopeField::Tenant,
    ScopeField::Account,
    ScopeField::Org,
];

/// Canonical lookup key for a data domain
///
/// # Examples
///
/// ```
/// use abac_authz::scope::ScopeKey;
/// use abac_authz::types::DataDomain;
///
/// let key = ScopeKey::from_data_domain(&DataDomain::new("acme", "A1", "t-1", "0", "u1"));
/// assert_eq!(key.to_string(), "org=acme|acct=A1|tenant=t-1|seg=0|owner=u1");
/// assert_eq!(key.fallback_chain()[0].to_string(), "org=acme|acct=A1|tenant=t-1|seg=0|owner=*");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    org: String,
    account: String,
    tenant: String,
    segment: String,
    owner: String,
}

impl ScopeKey {
    /// Build a key from raw values; blank values become `*`
    pub fn new(
        org: impl AsRef<str>,
        account: impl AsRef<str>,
        tenant: impl AsRef<str>,
        segment: impl AsRef<str>,
        owner: impl AsRef<str>,
    ) -> Self {
        let v = |s: &str| wildcard::or_wildcard(Some(s));
        Self {
            org: v(org.as_ref()),
            account: v(account.as_ref()),
            tenant: v(tenant.as_ref()),
            segment: v(segment.as_ref()),
            owner: v(owner.as_ref()),
        }
    }

    /// The fully wildcarded key
    pub fn global() -> Self {
        Self::new(WILDCARD, WILDCARD, WILDCARD, WILDCARD, WILDCARD)
    }

    /// Key for a data domain, values taken verbatim
    pub fn from_data_domain(domain: &DataDomain) -> Self {
        Self::new(
            &domain.org_ref_name,
            &domain.account_number,
            &domain.tenant_id,
            &domain.data_segment,
            &domain.owner_id,
        )
    }

    /// Key for a rule body, if every tenancy field is a literal or `*`
    pub fn from_body(body: &SecurityUriBody) -> Option<Self> {
        let fields = [
            body.org_ref_name(),
            body.account_number(),
            body.tenant_id(),
            body.data_segment(),
            body.owner_id(),
        ];
        if fields.iter().any(|f| wildcard::is_partial_glob(f)) {
            return None;
        }
        fn any(f: &str) -> &str {
            if wildcard::is_any(f) {
                WILDCARD
            } else {
                f
            }
        }
        Some(Self::new(
            any(fields[0]),
            any(fields[1]),
            any(fields[2]),
            any(fields[3]),
            any(fields[4]),
        ))
    }

    /// Parse the canonical string form
    pub fn parse(s: &str) -> ScopeResult<Self> {
        if s.trim().is_empty() {
            return Err(ScopeError::EmptyScope);
        }

        let mut values: [Option<String>; 5] = Default::default();
        for part in s.split('|') {
            let (label, value) = part
                .split_once('=')
                .ok_or_else(|| ScopeError::InvalidFormat(format!("'{}' has no '='", part)))?;
            let field = ScopeField::from_label(label)
                .ok_or_else(|| ScopeError::InvalidFormat(format!("unknown label '{}'", label)))?;
            let slot = &mut values[field as usize];
            if slot.is_some() {
                return Err(ScopeError::DuplicateField(label.to_string()));
            }
            *slot = Some(value.to_string());
        }

        let [org, account, tenant, segment, owner] = values;
        Ok(Self::new(
            org.ok_or(ScopeError::MissingField("org"))?,
            account.ok_or(ScopeError::MissingField("acct"))?,
            tenant.ok_or(ScopeError::MissingField("tenant"))?,
            segment.ok_or(ScopeError::MissingField("seg"))?,
            owner.ok_or(ScopeError::MissingField("owner"))?,
        ))
    }

    pub fn get(&self, field: ScopeField) -> &str {
        match field {
            ScopeField::Org => &self.org,
            ScopeField::Account => &self.account,
            ScopeField::Tenant => &self.tenant,
            ScopeField::Segment => &self.segment,
            ScopeField::Owner => &self.owner,
        }
    }

    /// Copy with one attribute wildcarded
    pub fn widen(&self, field: ScopeField) -> Self {
        let mut next = self.clone();
        let slot = match field {
            ScopeField::Org => &mut next.org,
            ScopeField::Account => &mut next.account,
            ScopeField::Tenant => &mut next.tenant,
            ScopeField::Segment => &mut next.segment,
            ScopeField::Owner => &mut next.owner,
        };
        *slot = WILDCARD.to_string();
        next
    }

    /// The five successive widenings, ending at the global key
    pub fn fallback_chain(&self) -> Vec<ScopeKey> {
        let mut chain = Vec::with_capacity(WIDENING_ORDER.len());
        let mut current = self.clone();
        for field in WIDENING_ORDER {
            current = current.widen(field);
            chain.push(current.clone());
        }
        chain
    }

    /// This key followed by its fallback chain
    pub fn scope_chain(&self) -> Vec<ScopeKey> {
        let mut chain = Vec::with_capacity(WIDENING_ORDER.len() + 1);
        chain.push(self.clone());
        chain.extend(self.fallback_chain());
        chain
    }

    pub fn is_global(&self) -> bool {
        WIDENING_ORDER.iter().all(|f| self.get(*f) == WILDCARD)
    }

    /// Data domain with this key's values (`*` where wildcarded)
    pub fn to_data_domain(&self) -> DataDomain {
        DataDomain::new(
            &self.org,
            &self.account,
            &self.tenant,
            &self.segment,
            &self.owner,
        )
    }
}

impl FromStr for ScopeKey {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "org={}|acct={}|tenant={}|seg={}|owner={}",
            self.org, self.account, self.tenant, self.segment, self.owner
        )
    }
}

/// Canonical key string for a data domain
pub fn scope_key(domain: &DataDomain) -> String {
    ScopeKey::from_data_domain(domain).to_string()
}

/// The five widenings of a key string
pub fn fallback_chain(key: &str) -> ScopeResult<Vec<String>> {
    Ok(ScopeKey::parse(key)?
        .fallback_chain()
        .iter()
        .map(ToString::to_string)
        .collect())
}

/// A key string followed by its widenings
pub fn scope_chain(key: &str) -> ScopeResult<Vec<String>> {
    Ok(ScopeKey::parse(key)?
        .scope_chain()
        .iter()
        .map(ToString::to_string)
        .collect())
}
