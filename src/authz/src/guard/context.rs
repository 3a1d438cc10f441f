//! Evaluation context for guard expressions

use crate::types::{PrincipalContext, ResourceContext};
use crate::wildcard::CaseSensitivity;

use super::error::{GuardError, Result};
use super::parser::{Attribute, Operand};

/// Resolved operand value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    Str(&'a str),
    List(&'a [String]),
}

/// Principal and resource visible to a guard
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub principal: &'a PrincipalContext,
    pub resource: &'a ResourceContext,
    pub case: CaseSensitivity,
}

impl<'a> GuardContext<'a> {
    pub fn new(
        principal: &'a PrincipalContext,
        resource: &'a ResourceContext,
        case: CaseSensitivity,
    ) -> Self {
        Self {
            principal,
            resource,
            case,
        }
    }

    /// Read an attribute; absent optional values are an error
    pub fn attribute(&self, attr: &Attribute) -> Result<Value<'a>> {
        let p = self.principal;
        let r = self.resource;
        let domain = r.data_domain.as_ref();

        let value: Option<&'a str> = match attr {
            Attribute::PrincipalRoles => return Ok(Value::List(p.roles.as_slice())),
            Attribute::PrincipalUserId => Some(p.user_id.as_str()),
            Attribute::PrincipalDefaultRealm => Some(p.default_realm.as_str()),
            Attribute::PrincipalScope => Some(p.scope.as_str()),
            Attribute::PrincipalOrgRefName => Some(p.data_domain.org_ref_name.as_str()),
            Attribute::PrincipalAccountNumber => Some(p.data_domain.account_number.as_str()),
            Attribute::PrincipalTenantId => Some(p.data_domain.tenant_id.as_str()),
            Attribute::PrincipalDataSegment => Some(p.data_domain.data_segment.as_str()),
            Attribute::PrincipalOwnerId => Some(p.data_domain.owner_id.as_str()),
            Attribute::PrincipalProperty(key) => p.properties.get(key).map(String::as_str),
            Attribute::ResourceArea => Some(r.area.as_str()),
            Attribute::ResourceFunctionalDomain => Some(r.functional_domain.as_str()),
            Attribute::ResourceAction => Some(r.action.as_str()),
            Attribute::ResourceId => r.resource_id.as_deref(),
            Attribute::ResourceOwnerId => r.declared_owner(),
            Attribute::ResourceRealm => r.realm.as_deref(),
            Attribute::ResourceOrgRefName => domain.map(|d| d.org_ref_name.as_str()),
            Attribute::ResourceAccountNumber => domain.map(|d| d.account_number.as_str()),
            Attribute::ResourceTenantId => domain.map(|d| d.tenant_id.as_str()),
            Attribute::ResourceDataSegment => domain.map(|d| d.data_segment.as_str()),
        };

        value
            .map(Value::Str)
            .ok_or_else(|| GuardError::MissingAttribute(attr.path()))
    }

    /// Resolve an operand (literals borrow from the compiled expression)
    pub fn operand<'e>(&self, operand: &'e Operand) -> Result<Value<'e>>
    where
        'a: 'e,
    {
        match operand {
            Operand::Literal(value) => Ok(Value::Str(value.as_str())),
            Operand::List(items) => Ok(Value::List(items.as_slice())),
            Operand::Attr(attr) => self.attribute(attr),
        }
    }

    /// Compare two scalars under the configured case mode
    pub fn same(&self, a: &str, b: &str) -> bool {
        self.case.normalize(a) == self.case.normalize(b)
    }
}
