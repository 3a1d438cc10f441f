//! Core authorization types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::wildcard::WILDCARD;

/// Tenancy tuple scoping a record or a principal
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDomain {
    /// Organization reference name
    #[serde(default)]
    pub org_ref_name: String,

    /// Account number within the organization
    #[serde(default)]
    pub account_number: String,

    /// Tenant identifier within the account
    #[serde(default)]
    pub tenant_id: String,

    /// Data segment (usually a small integer rendered as text)
    #[serde(default)]
    pub data_segment: String,

    /// Owning user id
    #[serde(default)]
    pub owner_id: String,
}

impl DataDomain {
    /// Create a data domain from its five attributes
    pub fn new(
        org_ref_name: impl Into<String>,
        account_number: impl Into<String>,
        tenant_id: impl Into<String>,
        data_segment: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            org_ref_name: org_ref_name.into(),
            account_number: account_number.into(),
            tenant_id: tenant_id.into(),
            data_segment: data_segment.into(),
            owner_id: owner_id.into(),
        }
    }

    /// The fully wildcarded domain
    pub fn global() -> Self {
        Self::new(WILDCARD, WILDCARD, WILDCARD, WILDCARD, WILDCARD)
    }
}

/// Audit-only impersonation metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Impersonation {
    /// Identity the caller is acting as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acting_as: Option<String>,

    /// User id on whose behalf the caller acts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acting_on_behalf_of_user_id: Option<String>,

    /// Subject on whose behalf the caller acts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acting_on_behalf_of_subject: Option<String>,
}

/// The authenticated actor making a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalContext {
    /// User identifier
    pub user_id: String,

    /// Assigned role names
    #[serde(default)]
    pub roles: Vec<String>,

    /// Home tenancy of the principal
    #[serde(default)]
    pub data_domain: DataDomain,

    /// Realm used when the resource does not name one
    #[serde(default)]
    pub default_realm: String,

    /// Informational scope label
    #[serde(default)]
    pub scope: String,

    /// Impersonation info (never used for authorization)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonation: Option<Impersonation>,

    /// Custom principal attributes
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl PrincipalContext {
    /// Create a principal with no roles in an empty domain
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Add a role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add several roles
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Set the home data domain
    pub fn with_data_domain(mut self, data_domain: DataDomain) -> Self {
        self.data_domain = data_domain;
        self
    }

    /// Set the default realm
    pub fn with_default_realm(mut self, realm: impl Into<String>) -> Self {
        self.default_realm = realm.into();
        self
    }

    /// Set the scope label
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Add a custom property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Attach impersonation metadata
    pub fn with_impersonation(mut self, impersonation: Impersonation) -> Self {
        self.impersonation = Some(impersonation);
        self
    }

    /// Identity tokens this principal can match: user id then roles
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.user_id.as_str()).chain(self.roles.iter().map(String::as_str))
    }
}

/// Target of an action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContext {
    /// Functional area (e.g. "sales")
    pub area: String,

    /// Functional domain inside the area (e.g. "order")
    pub functional_domain: String,

    /// Action being performed (e.g. "view")
    pub action: String,

    /// Target record id, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Owner of the target record, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// Tenancy of the target record, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_domain: Option<DataDomain>,

    /// Realm of the target record, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

impl ResourceContext {
    /// Create a resource descriptor for `area/functional_domain/action`
    pub fn new(
        area: impl Into<String>,
        functional_domain: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            area: area.into(),
            functional_domain: functional_domain.into(),
            action: action.into(),
            ..Default::default()
        }
    }

    /// Set the record id
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Set the record owner
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Set the record tenancy
    pub fn with_data_domain(mut self, data_domain: DataDomain) -> Self {
        self.data_domain = Some(data_domain);
        self
    }

    /// Set the record realm
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Owner named by the record itself (explicit owner, then its data domain)
    pub fn declared_owner(&self) -> Option<&str> {
        let present = |owner: &&str| !owner.is_empty();
        self.owner_id.as_deref().filter(present).or_else(|| {
            self.data_domain
                .as_ref()
                .map(|dd| dd.owner_id.as_str())
                .filter(present)
        })
    }

    /// Resolve the tenancy attributes used for body matching
    ///
    /// Values the record does not carry come from the principal's home
    /// domain and default realm.
    pub fn tenancy<'a>(&'a self, principal: &'a PrincipalContext) -> Tenancy<'a> {
        let domain = self.data_domain.as_ref().unwrap_or(&principal.data_domain);
        Tenancy {
            org_ref_name: &domain.org_ref_name,
            account_number: &domain.account_number,
            realm: self.realm.as_deref().unwrap_or(&principal.default_realm),
            tenant_id: &domain.tenant_id,
            data_segment: &domain.data_segment,
            owner_id: self
                .declared_owner()
                .unwrap_or(&principal.data_domain.owner_id),
        }
    }
}

/// Resolved tenancy values a rule body is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenancy<'a> {
    pub org_ref_name: &'a str,
    pub account_number: &'a str,
    pub realm: &'a str,
    pub tenant_id: &'a str,
    pub data_segment: &'a str,
    pub owner_id: &'a str,
}
