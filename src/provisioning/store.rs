//! Local accounts written by provisioning.

use anyhow::Result;
use async_trait::async_trait;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tracing::info;

use crate::claims::{ASSOCIATED_ID_CLAIM, ClaimSet, IDP_ID_CLAIM, PASSWORD_CLAIM};
use crate::collaborators::UserProvisioner;
use crate::db::{FederatedAssociationRecord, ProvisionedUserRecord, QueryBuilder, timestamp_now};
use crate::flow::FlowContext;
use crate::types::{LocalRoleId, TenantDomain, Username};

/// A stored local account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedUser {
    pub tenant: TenantDomain,
    pub username: Username,
    pub claims: ClaimSet,
    pub roles: Vec<LocalRoleId>,
    pub password_set: bool,
}

/// Writes accounts to `provisioned_user` and links them to the federated
/// subject, so the next login from the same IdP finds the account.
#[derive(Clone)]
pub struct SurrealUserProvisioner {
    db: Surreal<Any>,
}

impl SurrealUserProvisioner {
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    pub async fn find_user(
        &self,
        tenant: &TenantDomain,
        username: &Username,
    ) -> Result<Option<ProvisionedUser>> {
        let record =
            QueryBuilder::find_provisioned_user(&self.db, tenant.as_str(), username.as_str()).await?;
        Ok(record.map(|r| ProvisionedUser {
            tenant: r.tenant.into(),
            username: r.username.into(),
            claims: r.claims.into_iter().collect(),
            roles: r.roles.into_iter().map(LocalRoleId::new).collect(),
            password_set: r.password_set,
        }))
    }
}

#[async_trait]
impl UserProvisioner for SurrealUserProvisioner {
    async fn provision_user(
        &self,
        username: &Username,
        claims: &ClaimSet,
        roles: &[LocalRoleId],
        context: &FlowContext,
    ) -> Result<()> {
        let tenant = context.tenant();
        let mut stored = claims.clone();
        let password_set = stored
            .remove(PASSWORD_CLAIM)
            .is_some_and(|p| !p.is_empty());
        let idp = claims.get(IDP_ID_CLAIM).map(str::to_string);

        let record = ProvisionedUserRecord {
            tenant: tenant.to_string(),
            username: username.to_string(),
            claims: stored.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            password_set,
            idp: idp.clone(),
            updated_at: timestamp_now(),
        };
        QueryBuilder::upsert_provisioned_user(&self.db, &record).await?;

        if let (Some(idp), Some(subject)) = (idp, claims.get_non_blank(ASSOCIATED_ID_CLAIM)) {
            let association = FederatedAssociationRecord {
                tenant: tenant.to_string(),
                idp,
                subject: subject.to_string(),
                username: username.to_string(),
                created_at: timestamp_now(),
            };
            QueryBuilder::upsert_association(&self.db, &association).await?;
        }

        info!(%tenant, %username, roles = roles.len(), password_set, "Stored provisioned user");
        Ok(())
    }
}
