//! Identity provider settings as seen by provisioning.

use serde::{Deserialize, Serialize};

use crate::claims::DEFAULT_ROLE_CLAIM;
use crate::types::{IdpName, LocalRoleId};

/// Per-tenant settings of one external identity provider.
///
/// Owned by the IdP configuration registry; provisioning only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIdpConfig {
    pub name: IdpName,
    /// Create or update a local account for users of this IdP.
    #[serde(default)]
    pub provisioning_enabled: bool,
    /// Ask the user to choose a local password during sign-up.
    #[serde(default)]
    pub password_provisioning_enabled: bool,
    /// Let the user pick a different local username during sign-up.
    #[serde(default)]
    pub modify_username_allowed: bool,
    /// Claim in the IdP assertion that carries the user's roles.
    #[serde(default)]
    pub role_claim_uri: Option<String>,
    /// Local claim the IdP role claim maps onto.
    #[serde(default = "default_local_role_claim")]
    pub local_role_claim_uri: String,
    #[serde(default)]
    pub role_mappings: Vec<RoleMapping>,
}

fn default_local_role_claim() -> String {
    DEFAULT_ROLE_CLAIM.to_string()
}

impl ExternalIdpConfig {
    /// A config with every feature switched off.
    pub fn new(name: impl Into<IdpName>) -> Self {
        Self {
            name: name.into(),
            provisioning_enabled: false,
            password_provisioning_enabled: false,
            modify_username_allowed: false,
            role_claim_uri: None,
            local_role_claim_uri: default_local_role_claim(),
            role_mappings: Vec::new(),
        }
    }

    pub fn with_provisioning(mut self, enabled: bool) -> Self {
        self.provisioning_enabled = enabled;
        self
    }

    pub fn with_password_provisioning(mut self, enabled: bool) -> Self {
        self.password_provisioning_enabled = enabled;
        self
    }

    pub fn with_modify_username(mut self, allowed: bool) -> Self {
        self.modify_username_allowed = allowed;
        self
    }

    pub fn with_role_claim(mut self, uri: impl Into<String>) -> Self {
        self.role_claim_uri = Some(uri.into());
        self
    }

    pub fn with_role_mapping(
        mut self,
        remote_role: impl Into<String>,
        local_role: impl Into<LocalRoleId>,
    ) -> Self {
        self.role_mappings.push(RoleMapping {
            remote_role: remote_role.into(),
            local_role: local_role.into(),
        });
        self
    }

    /// The claim to read roles from: the IdP's own role claim, or the local
    /// role claim when the IdP does not define one.
    pub fn effective_role_claim(&self) -> &str {
        self.role_claim_uri
            .as_deref()
            .filter(|uri| !uri.trim().is_empty())
            .unwrap_or(DEFAULT_ROLE_CLAIM)
    }
}

/// Maps one role asserted by the IdP onto a local role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleMapping {
    pub remote_role: String,
    pub local_role: LocalRoleId,
}

/// Metadata of a tenant's resident (local) identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpMetadata {
    pub home_realm_id: Option<String>,
    pub description: Option<String>,
    pub display_name: Option<String>,
}
