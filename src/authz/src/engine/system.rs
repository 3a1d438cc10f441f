//! Built-in rules seeded ahead of loaded rules
//!
//! With `seed_system_rules` on, every index carries these rules even when a
//! reload omits them, so the system principal can always administer the
//! security area.

use crate::error::Result;
use crate::loader::DEFAULT_PRIORITY;
use crate::policy::{Effect, Rule};
use crate::uri::SecurityUriHeader;

/// Area administered by the system principal
pub const SECURITY_AREA: &str = "security";

/// Role granted the same rights as the system user
pub const SYSTEM_ROLE: &str = "system";

pub const SYS_ANY_ACTION_SECURITY: &str = "SysAnyActionSecurity";
pub const SYS_ROLE_ANY_ACTION_SECURITY: &str = "SysRoleAnyActionSecurity";
pub const USER_OWN_RESOURCES: &str = "view your own resources, limit to default dataSegment";
pub const USER_NO_SECURITY_DELETE: &str = "users can't delete anything in security area";
pub const TENANT_ADMIN: &str = "tenant admin can administer the tenant records";

const OWNER_FILTER: &str = "dataDomain.ownerId:${principalId}&&dataDomain.dataSegment:#0";

fn header(identity: &str, area: &str, action: &str) -> SecurityUriHeader {
    SecurityUriHeader::builder()
        .identity(identity)
        .area(area)
        .functional_domain("*")
        .action(action)
        .build()
}

/// The built-in rules, in precedence order
pub fn system_rules(system_user_id: &str) -> Result<Vec<Rule>> {
    Ok(vec![
        Rule::builder(SYS_ANY_ACTION_SECURITY)
            .description("System can take any action within security")
            .header(header(system_user_id, SECURITY_AREA, "*"))
            .effect(Effect::Allow)
            .priority(0)
            .final_rule(true)
            .build()?,
        Rule::builder(SYS_ROLE_ANY_ACTION_SECURITY)
            .description("System role can take any action within security")
            .header(header(SYSTEM_ROLE, SECURITY_AREA, "*"))
            .effect(Effect::Allow)
            .priority(1)
            .final_rule(true)
            .build()?,
        Rule::builder(USER_OWN_RESOURCES)
            .header(header("user", "*", "*"))
            .and_filter(OWNER_FILTER)
            .effect(Effect::Allow)
            .priority(DEFAULT_PRIORITY)
            .build()?,
        Rule::builder(USER_NO_SECURITY_DELETE)
            .header(header("user", SECURITY_AREA, "delete"))
            .and_filter(OWNER_FILTER)
            .effect(Effect::Deny)
            .priority(DEFAULT_PRIORITY)
            .final_rule(true)
            .build()?,
        Rule::builder(TENANT_ADMIN)
            .header(header("admin", "*", "*"))
            .and_filter("dataDomain.tenantId:${pTenantId}")
            .effect(Effect::Allow)
            .priority(DEFAULT_PRIORITY)
            .final_rule(true)
            .build()?,
    ])
}

/// Prepend every built-in rule whose name `rules` does not already use
pub fn with_system_rules(system_user_id: &str, rules: Vec<Rule>) -> Result<Vec<Rule>> {
    let mut seeded: Vec<Rule> = system_rules(system_user_id)?
        .into_iter()
        .filter(|builtin| rules.iter().all(|r| r.name() != builtin.name()))
        .collect();
    seeded.extend(rules);
    Ok(seeded)
}
