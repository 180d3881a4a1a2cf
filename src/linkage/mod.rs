//! Links between federated subjects and local accounts.

use anyhow::Result;
use async_trait::async_trait;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tracing::{debug, info};

use crate::collaborators::AccountLinkageResolver;
use crate::db::{FederatedAssociationRecord, QueryBuilder, timestamp_now};
use crate::types::{IdpName, SubjectId, TenantDomain, Username};

/// One stored link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedAssociation {
    pub tenant: TenantDomain,
    pub idp: IdpName,
    pub subject: SubjectId,
    pub username: Username,
}

impl From<FederatedAssociationRecord> for FederatedAssociation {
    fn from(record: FederatedAssociationRecord) -> Self {
        Self {
            tenant: record.tenant.into(),
            idp: record.idp.into(),
            subject: record.subject.into(),
            username: record.username.into(),
        }
    }
}

/// Association lookups backed by the `federated_association` table.
#[derive(Clone)]
pub struct SurrealLinkageResolver {
    db: Surreal<Any>,
}

impl SurrealLinkageResolver {
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Link `subject` at `idp` to a local account, replacing any earlier link.
    pub async fn link(
        &self,
        tenant: &TenantDomain,
        idp: &IdpName,
        subject: &SubjectId,
        username: &Username,
    ) -> Result<()> {
        let record = FederatedAssociationRecord {
            tenant: tenant.to_string(),
            idp: idp.to_string(),
            subject: subject.to_string(),
            username: username.to_string(),
            created_at: timestamp_now(),
        };
        QueryBuilder::upsert_association(&self.db, &record).await?;
        info!(%tenant, %idp, %username, "Linked federated subject to local account");
        Ok(())
    }

    pub async fn list(&self, tenant: &TenantDomain) -> Result<Vec<FederatedAssociation>> {
        let records = QueryBuilder::list_associations(&self.db, tenant.as_str()).await?;
        Ok(records.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl AccountLinkageResolver for SurrealLinkageResolver {
    async fn find_local_username(
        &self,
        tenant: &TenantDomain,
        idp: &IdpName,
        subject: &SubjectId,
    ) -> Result<Option<Username>> {
        let found =
            QueryBuilder::find_association(&self.db, tenant.as_str(), idp.as_str(), subject.as_str())
                .await?;
        debug!(%tenant, %idp, linked = found.is_some(), "Resolved federated association");
        Ok(found.map(|r| Username::new(r.username)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};

    async fn resolver() -> SurrealLinkageResolver {
        let db = create_connection(DatabaseConfig {
            url: "memory".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        ensure_schema(&db).await.unwrap();
        SurrealLinkageResolver::new(db)
    }

    #[tokio::test]
    async fn test_missing_link_is_none() {
        let resolver = resolver().await;
        let found = resolver
            .find_local_username(
                &"acme".into(),
                &"GoogleIdP".into(),
                &"alice@gmail.com".into(),
            )
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_link_then_resolve() {
        let resolver = resolver().await;
        let tenant = TenantDomain::new("acme");
        let idp = IdpName::new("GoogleIdP");
        let subject = SubjectId::new("alice@gmail.com");

        resolver
            .link(&tenant, &idp, &subject, &Username::new("alice"))
            .await
            .unwrap();
        // Relinking replaces the earlier account.
        resolver
            .link(&tenant, &idp, &subject, &Username::new("alice@acme"))
            .await
            .unwrap();

        let found = resolver
            .find_local_username(&tenant, &idp, &subject)
            .await
            .unwrap();
        assert_eq!(found, Some(Username::new("alice@acme")));

        let links = resolver.list(&tenant).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].subject, subject);
    }

    #[tokio::test]
    async fn test_link_is_scoped_by_tenant_and_idp() {
        let resolver = resolver().await;
        let subject = SubjectId::new("alice@gmail.com");
        resolver
            .link(&"acme".into(), &"GoogleIdP".into(), &subject, &"alice".into())
            .await
            .unwrap();

        let other_tenant = resolver
            .find_local_username(&"globex".into(), &"GoogleIdP".into(), &subject)
            .await
            .unwrap();
        let other_idp = resolver
            .find_local_username(&"acme".into(), &"OktaIdP".into(), &subject)
            .await
            .unwrap();
        assert_eq!(other_tenant, None);
        assert_eq!(other_idp, None);
        assert!(resolver.list(&"globex".into()).await.unwrap().is_empty());
    }
}
