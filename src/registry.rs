//! Configuration-backed IdP registry, claim dialect and resident IdP lookup.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::claims::ClaimDescriptor;
use crate::collaborators::{ClaimSchemaSource, IdpConfigRegistry, ResidentIdpSource};
use crate::config::{ProvisioningConfig, TenantConfig};
use crate::idp::{ExternalIdpConfig, IdpMetadata};
use crate::types::{IdpName, TenantDomain};

/// Serves the per-tenant IdP settings loaded from `provisioning.json`.
#[derive(Debug, Clone, Default)]
pub struct StaticIdpRegistry {
    tenants: HashMap<TenantDomain, TenantConfig>,
}

impl StaticIdpRegistry {
    pub fn from_config(config: &ProvisioningConfig) -> Self {
        let tenants: HashMap<_, _> = config
            .tenants
            .iter()
            .map(|(name, tenant)| (TenantDomain::new(name.as_str()), tenant.clone()))
            .collect();
        info!(
            tenants = tenants.len(),
            idps = tenants.values().map(|t| t.idps.len()).sum::<usize>(),
            "Loaded IdP registry"
        );
        Self { tenants }
    }

    /// Add or replace a tenant.
    pub fn with_tenant(mut self, tenant: impl Into<TenantDomain>, config: TenantConfig) -> Self {
        self.tenants.insert(tenant.into(), config);
        self
    }

    fn tenant(&self, tenant: &TenantDomain) -> Option<&TenantConfig> {
        self.tenants.get(tenant)
    }
}

#[async_trait]
impl IdpConfigRegistry for StaticIdpRegistry {
    async fn get_external_idp_config(
        &self,
        name: &IdpName,
        tenant: &TenantDomain,
    ) -> Result<Option<ExternalIdpConfig>> {
        let found = self
            .tenant(tenant)
            .and_then(|t| t.idps.iter().find(|idp| &idp.name == name))
            .cloned();
        debug!(%tenant, idp = %name, found = found.is_some(), "IdP lookup");
        Ok(found)
    }
}

#[async_trait]
impl ClaimSchemaSource for StaticIdpRegistry {
    async fn get_tenant_claim_schema(&self, tenant: &TenantDomain) -> Result<Vec<ClaimDescriptor>> {
        Ok(self
            .tenant(tenant)
            .map(|t| t.claims.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ResidentIdpSource for StaticIdpRegistry {
    async fn get_resident_idp(&self, tenant: &TenantDomain) -> Result<Option<IdpMetadata>> {
        Ok(self.tenant(tenant).and_then(|t| t.resident_idp.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookups_from_sample_config() {
        let registry = StaticIdpRegistry::from_config(&ProvisioningConfig::sample());
        let acme = TenantDomain::new("acme");

        let idp = registry
            .get_external_idp_config(&"GoogleIdP".into(), &acme)
            .await
            .unwrap()
            .unwrap();
        assert!(idp.provisioning_enabled);

        assert!(
            registry
                .get_external_idp_config(&"GoogleIdP".into(), &"globex".into())
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(registry.get_tenant_claim_schema(&acme).await.unwrap().len(), 3);
        assert!(registry.get_resident_idp(&acme).await.unwrap().is_some());
        assert!(
            registry
                .get_resident_idp(&"globex".into())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_with_tenant() {
        let registry = StaticIdpRegistry::default().with_tenant(
            "globex",
            TenantConfig {
                idps: vec![ExternalIdpConfig::new("OktaIdP")],
                ..Default::default()
            },
        );
        let idp = registry
            .get_external_idp_config(&"OktaIdP".into(), &"globex".into())
            .await
            .unwrap();
        assert_eq!(idp.map(|i| i.provisioning_enabled), Some(false));
    }
}
