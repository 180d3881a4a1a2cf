//! Services provisioning depends on but does not own.
//!
//! Implementations report transport failures as `anyhow::Error`; the state
//! machine wraps them into [`ProvisioningError`](crate::provisioning::ProvisioningError)
//! with tenant, IdP and user context.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use crate::claims::{ClaimDescriptor, ClaimSet};
use crate::consent::ConsentReceipt;
use crate::flow::FlowContext;
use crate::idp::{ExternalIdpConfig, IdpMetadata};
use crate::types::{IdpName, LocalRoleId, SubjectId, TenantDomain, Username};

/// Decides whether a flow needs JIT handling at all.
#[async_trait]
pub trait JitPolicy: Send + Sync {
    async fn is_jit_handling_needed(&self, context: &FlowContext) -> bool;
}

#[async_trait]
pub trait IdpConfigRegistry: Send + Sync {
    /// `Ok(None)` when the tenant has no IdP with that name.
    async fn get_external_idp_config(
        &self,
        name: &IdpName,
        tenant: &TenantDomain,
    ) -> Result<Option<ExternalIdpConfig>>;
}

#[async_trait]
pub trait ClaimSchemaSource: Send + Sync {
    /// Every local claim known in the tenant's claim dialect.
    async fn get_tenant_claim_schema(&self, tenant: &TenantDomain) -> Result<Vec<ClaimDescriptor>>;
}

#[async_trait]
pub trait AccountLinkageResolver: Send + Sync {
    /// The local account linked to `subject` at `idp`, if any. A missing
    /// link is `Ok(None)`, not an error.
    async fn find_local_username(
        &self,
        tenant: &TenantDomain,
        idp: &IdpName,
        subject: &SubjectId,
    ) -> Result<Option<Username>>;
}

#[async_trait]
pub trait UserProvisioner: Send + Sync {
    /// Create or update the local account.
    async fn provision_user(
        &self,
        username: &Username,
        claims: &ClaimSet,
        roles: &[LocalRoleId],
        context: &FlowContext,
    ) -> Result<()>;
}

#[async_trait]
pub trait ConsentStore: Send + Sync {
    async fn persist_consent(&self, receipt: &ConsentReceipt) -> Result<()>;
}

#[async_trait]
pub trait ResidentIdpSource: Send + Sync {
    /// `Ok(None)` when the tenant has no resident IdP.
    async fn get_resident_idp(&self, tenant: &TenantDomain) -> Result<Option<IdpMetadata>>;
}

/// Where the suspension redirect is written.
pub trait ResponseSink: Send {
    fn send_redirect(&mut self, location: Url) -> Result<()>;
}

/// The collaborators a [`JitProvisioningHandler`](crate::provisioning::JitProvisioningHandler)
/// is wired with. Shared, so one handler can serve any number of flows.
#[derive(Clone)]
pub struct Collaborators {
    pub policy: Arc<dyn JitPolicy>,
    pub idp_registry: Arc<dyn IdpConfigRegistry>,
    pub claim_schema: Arc<dyn ClaimSchemaSource>,
    pub linkage: Arc<dyn AccountLinkageResolver>,
    pub provisioner: Arc<dyn UserProvisioner>,
    pub consent_store: Arc<dyn ConsentStore>,
    pub resident_idp: Arc<dyn ResidentIdpSource>,
}
