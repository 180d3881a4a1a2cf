use anyhow::Result;
use async_trait::async_trait;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tracing::info;

use crate::collaborators::ConsentStore;
use crate::consent::ConsentReceipt;
use crate::db::{ConsentReceiptRecord, QueryBuilder, timestamp_now};
use crate::types::TenantDomain;

/// Keeps consent receipts in the `consent_receipt` table.
#[derive(Clone)]
pub struct SurrealConsentStore {
    db: Surreal<Any>,
}

impl SurrealConsentStore {
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Receipts recorded for a principal, oldest first.
    pub async fn list_receipts(
        &self,
        tenant: &TenantDomain,
        principal_id: &str,
    ) -> Result<Vec<ConsentReceipt>> {
        QueryBuilder::list_consent_receipts(&self.db, tenant.as_str(), principal_id)
            .await?
            .into_iter()
            .map(|r| Ok(serde_json::from_str(&r.receipt)?))
            .collect()
    }
}

#[async_trait]
impl ConsentStore for SurrealConsentStore {
    async fn persist_consent(&self, receipt: &ConsentReceipt) -> Result<()> {
        let record = ConsentReceiptRecord {
            receipt_id: uuid::Uuid::new_v4().to_string(),
            tenant: receipt.tenant.to_string(),
            principal_id: receipt.principal_id.clone(),
            receipt: serde_json::to_string(receipt)?,
            created_at: timestamp_now(),
        };
        QueryBuilder::insert_consent_receipt(&self.db, &record).await?;
        info!(receipt_id = %record.receipt_id, tenant = %record.tenant, "Stored consent receipt");
        Ok(())
    }
}
