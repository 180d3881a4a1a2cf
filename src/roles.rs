//! Translation of IdP-asserted roles into local roles.

use std::collections::HashSet;

use crate::claims::ClaimSet;
use crate::idp::ExternalIdpConfig;
use crate::types::LocalRoleId;

/// Separator between values of a multi-valued claim.
pub const MULTI_VALUE_SEPARATOR: char = ',';

#[derive(Debug, Clone, Copy, Default)]
pub struct RoleMapper;

impl RoleMapper {
    /// Map the roles found under `role_claim_uri` through the IdP's role
    /// mappings.
    ///
    /// Roles without a mapping are dropped, never defaulted. Each local role
    /// appears once, in the order its first remote role was asserted.
    pub fn map_roles(
        idp: &ExternalIdpConfig,
        external_attributes: &ClaimSet,
        role_claim_uri: &str,
    ) -> Vec<LocalRoleId> {
        let Some(asserted) = external_attributes.get_non_blank(role_claim_uri) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        asserted
            .split(MULTI_VALUE_SEPARATOR)
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .flat_map(|role| {
                idp.role_mappings
                    .iter()
                    .filter(move |m| m.remote_role == role)
                    .map(|m| m.local_role.clone())
            })
            .filter(|local| seen.insert(local.clone()))
            .collect()
    }
}
