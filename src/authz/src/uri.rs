//! Security URI model
//!
//! A [`SecurityUri`] is the pattern a rule matches against. The header says
//! who may do what (`identity:area:functionalDomain:action`); the body says
//! where (`org:account:realm:tenant:segment:owner`). Every field is a
//! wildcard pattern, and absent input is stored as `*`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ResourceContext, Tenancy};
use crate::wildcard::{self, matches, CaseSensitivity, WILDCARD};

fn wildcard_default() -> String {
    WILDCARD.to_string()
}

fn normalize(value: Option<String>) -> String {
    wildcard::or_wildcard(value.as_deref())
}

/// Who/what-action half of a security URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityUriHeader {
    #[serde(default = "wildcard_default")]
    identity: String,
    #[serde(default = "wildcard_default")]
    area: String,
    #[serde(default = "wildcard_default")]
    functional_domain: String,
    #[serde(default = "wildcard_default")]
    action: String,
}

impl SecurityUriHeader {
    /// Start building a header; unset fields become `*`
    pub fn builder() -> SecurityUriHeaderBuilder {
        SecurityUriHeaderBuilder::default()
    }

    /// Builder seeded with this header's values
    pub fn to_builder(&self) -> SecurityUriHeaderBuilder {
        SecurityUriHeaderBuilder {
            identity: Some(self.identity.clone()),
            area: Some(self.area.clone()),
            functional_domain: Some(self.functional_domain.clone()),
            action: Some(self.action.clone()),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn functional_domain(&self) -> &str {
        &self.functional_domain
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Match area, functional domain and action against a resource
    pub fn matches(&self, resource: &ResourceContext, case: CaseSensitivity) -> bool {
        self.matches_triple(&resource.area, &resource.functional_domain, &resource.action, case)
    }

    /// Match an explicit `(area, domain, action)` triple
    pub fn matches_triple(
        &self,
        area: &str,
        functional_domain: &str,
        action: &str,
        case: CaseSensitivity,
    ) -> bool {
        matches(area, &self.area, case)
            && matches(functional_domain, &self.functional_domain, case)
            && matches(action, &self.action, case)
    }

    /// True when area, domain or action is a partial glob such as `ord*`
    pub fn has_partial_glob(&self) -> bool {
        [&self.area, &self.functional_domain, &self.action]
            .iter()
            .any(|field| wildcard::is_partial_glob(field))
    }
}

impl fmt::Display for SecurityUriHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.identity, self.area, self.functional_domain, self.action
        )
    }
}

/// Builder for [`SecurityUriHeader`]
#[derive(Debug, Clone, Default)]
pub struct SecurityUriHeaderBuilder {
    identity: Option<String>,
    area: Option<String>,
    functional_domain: Option<String>,
    action: Option<String>,
}

impl SecurityUriHeaderBuilder {
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(area.into());
        self
    }

    pub fn functional_domain(mut self, functional_domain: impl Into<String>) -> Self {
        self.functional_domain = Some(functional_domain.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn build(self) -> SecurityUriHeader {
        SecurityUriHeader {
            identity: normalize(self.identity),
            area: normalize(self.area),
            functional_domain: normalize(self.functional_domain),
            action: normalize(self.action),
        }
    }
}

/// Tenancy/ownership half of a security URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityUriBody {
    #[serde(default = "wildcard_default")]
    org_ref_name: String,
    #[serde(default = "wildcard_default")]
    account_number: String,
    #[serde(default = "wildcard_default")]
    realm: String,
    #[serde(default = "wildcard_default")]
    tenant_id: String,
    #[serde(default = "wildcard_default")]
    owner_id: String,
    #[serde(default = "wildcard_default")]
    data_segment: String,
}

impl Default for SecurityUriBody {
    fn default() -> Self {
        SecurityUriBodyBuilder::default().build()
    }
}

impl SecurityUriBody {
    /// Start building a body; unset fields become `*`
    pub fn builder() -> SecurityUriBodyBuilder {
        SecurityUriBodyBuilder::default()
    }

    /// Builder seeded with this body's values
    pub fn to_builder(&self) -> SecurityUriBodyBuilder {
        SecurityUriBodyBuilder {
            org_ref_name: Some(self.org_ref_name.clone()),
            account_number: Some(self.account_number.clone()),
            realm: Some(self.realm.clone()),
            tenant_id: Some(self.tenant_id.clone()),
            owner_id: Some(self.owner_id.clone()),
            data_segment: Some(self.data_segment.clone()),
        }
    }

    pub fn org_ref_name(&self) -> &str {
        &self.org_ref_name
    }

    pub fn account_number(&self) -> &str {
        &self.account_number
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn data_segment(&self) -> &str {
        &self.data_segment
    }

    /// Match every tenancy attribute
    pub fn matches(&self, tenancy: &Tenancy<'_>, case: CaseSensitivity) -> bool {
        matches(tenancy.org_ref_name, &self.org_ref_name, case)
            && matches(tenancy.account_number, &self.account_number, case)
            && matches(tenancy.realm, &self.realm, case)
            && matches(tenancy.tenant_id, &self.tenant_id, case)
            && matches(tenancy.owner_id, &self.owner_id, case)
            && matches(tenancy.data_segment, &self.data_segment, case)
    }

    /// True when any tenancy field is a partial glob
    pub fn has_partial_glob(&self) -> bool {
        [
            &self.org_ref_name,
            &self.account_number,
            &self.realm,
            &self.tenant_id,
            &self.owner_id,
            &self.data_segment,
        ]
        .iter()
        .any(|field| wildcard::is_partial_glob(field))
    }
}

impl fmt::Display for SecurityUriBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.org_ref_name,
            self.account_number,
            self.realm,
            self.tenant_id,
            self.data_segment,
            self.owner_id
        )
    }
}

/// Builder for [`SecurityUriBody`]
#[derive(Debug, Clone, Default)]
pub struct SecurityUriBodyBuilder {
    org_ref_name: Option<String>,
    account_number: Option<String>,
    realm: Option<String>,
    tenant_id: Option<String>,
    owner_id: Option<String>,
    data_segment: Option<String>,
}

impl SecurityUriBodyBuilder {
    pub fn org_ref_name(mut self, org_ref_name: impl Into<String>) -> Self {
        self.org_ref_name = Some(org_ref_name.into());
        self
    }

    pub fn account_number(mut self, account_number: impl Into<String>) -> Self {
        self.account_number = Some(account_number.into());
        self
    }

    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn data_segment(mut self, data_segment: impl Into<String>) -> Self {
        self.data_segment = Some(data_segment.into());
        self
    }

    pub fn build(self) -> SecurityUriBody {
        SecurityUriBody {
            org_ref_name: normalize(self.org_ref_name),
            account_number: normalize(self.account_number),
            realm: normalize(self.realm),
            tenant_id: normalize(self.tenant_id),
            owner_id: normalize(self.owner_id),
            data_segment: normalize(self.data_segment),
        }
    }
}

/// Header and body pattern pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityUri {
    pub header: SecurityUriHeader,
    #[serde(default)]
    pub body: SecurityUriBody,
}

impl SecurityUri {
    pub fn new(header: SecurityUriHeader, body: SecurityUriBody) -> Self {
        Self { header, body }
    }

    /// Replace the header, keeping the body
    pub fn with_header(&self, header: SecurityUriHeader) -> Self {
        Self {
            header,
            body: self.body.clone(),
        }
    }

    /// Header and body both match
    pub fn matches(
        &self,
        resource: &ResourceContext,
        tenancy: &Tenancy<'_>,
        case: CaseSensitivity,
    ) -> bool {
        self.header.matches(resource, case) && self.body.matches(tenancy, case)
    }
}

impl fmt::Display for SecurityUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.header, self.body)
    }
}
