// Database query helpers for SurrealDB.
//
// Every table is keyed by a natural key rendered through `record_key`, so the
// write paths are plain UPSERTs and the read paths are point lookups.

use crate::db::schema::*;
use anyhow::Result;
use surrealdb::{Surreal, engine::any::Any};

/// Render a composite natural key as a single record id string.
pub fn record_key(parts: &[&str]) -> Result<String> {
    Ok(serde_json::to_string(parts)?)
}

pub struct QueryBuilder;

impl QueryBuilder {
    /// Insert or replace a suspended flow.
    pub async fn upsert_flow_context(db: &Surreal<Any>, record: &FlowContextRecord) -> Result<()> {
        db.query("UPSERT type::thing($tb, $key) CONTENT $record")
            .bind(("tb", FLOW_CONTEXT_TABLE))
            .bind(("key", record.context_id.clone()))
            .bind(("record", record.clone()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn find_flow_context(
        db: &Surreal<Any>,
        context_id: &str,
    ) -> Result<Option<FlowContextRecord>> {
        let mut res = db
            .query("SELECT * FROM type::thing($tb, $key)")
            .bind(("tb", FLOW_CONTEXT_TABLE))
            .bind(("key", context_id.to_string()))
            .await?;
        let record: Option<FlowContextRecord> = res.take(0)?;
        Ok(record)
    }

    /// Delete a suspended flow and return what was stored.
    ///
    /// A single DELETE statement, so two concurrent callers can never both
    /// receive the record.
    pub async fn take_flow_context(
        db: &Surreal<Any>,
        context_id: &str,
    ) -> Result<Option<FlowContextRecord>> {
        let mut res = db
            .query("DELETE type::thing($tb, $key) RETURN BEFORE")
            .bind(("tb", FLOW_CONTEXT_TABLE))
            .bind(("key", context_id.to_string()))
            .await?;
        let records: Vec<FlowContextRecord> = res.take(0)?;
        Ok(records.into_iter().next())
    }

    /// Delete every suspended flow saved before `cutoff` (RFC3339).
    pub async fn delete_flow_contexts_before(db: &Surreal<Any>, cutoff: &str) -> Result<usize> {
        let mut res = db
            .query("DELETE flow_context WHERE saved_at < $cutoff RETURN BEFORE")
            .bind(("cutoff", cutoff.to_string()))
            .await?;
        let deleted: Vec<FlowContextRecord> = res.take(0)?;
        Ok(deleted.len())
    }

    pub async fn upsert_association(
        db: &Surreal<Any>,
        record: &FederatedAssociationRecord,
    ) -> Result<()> {
        let key = record_key(&[&record.tenant, &record.idp, &record.subject])?;
        db.query("UPSERT type::thing($tb, $key) CONTENT $record")
            .bind(("tb", FEDERATED_ASSOCIATION_TABLE))
            .bind(("key", key))
            .bind(("record", record.clone()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn find_association(
        db: &Surreal<Any>,
        tenant: &str,
        idp: &str,
        subject: &str,
    ) -> Result<Option<FederatedAssociationRecord>> {
        let key = record_key(&[tenant, idp, subject])?;
        let mut res = db
            .query("SELECT * FROM type::thing($tb, $key)")
            .bind(("tb", FEDERATED_ASSOCIATION_TABLE))
            .bind(("key", key))
            .await?;
        let record: Option<FederatedAssociationRecord> = res.take(0)?;
        Ok(record)
    }

    pub async fn list_associations(
        db: &Surreal<Any>,
        tenant: &str,
    ) -> Result<Vec<FederatedAssociationRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM federated_association
                WHERE tenant = $tenant
                ORDER BY created_at ASC
                "#,
            )
            .bind(("tenant", tenant.to_string()))
            .await?;
        let records: Vec<FederatedAssociationRecord> = res.take(0)?;
        Ok(records)
    }

    pub async fn upsert_provisioned_user(
        db: &Surreal<Any>,
        record: &ProvisionedUserRecord,
    ) -> Result<()> {
        let key = record_key(&[&record.tenant, &record.username])?;
        db.query("UPSERT type::thing($tb, $key) CONTENT $record")
            .bind(("tb", PROVISIONED_USER_TABLE))
            .bind(("key", key))
            .bind(("record", record.clone()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn find_provisioned_user(
        db: &Surreal<Any>,
        tenant: &str,
        username: &str,
    ) -> Result<Option<ProvisionedUserRecord>> {
        let key = record_key(&[tenant, username])?;
        let mut res = db
            .query("SELECT * FROM type::thing($tb, $key)")
            .bind(("tb", PROVISIONED_USER_TABLE))
            .bind(("key", key))
            .await?;
        let record: Option<ProvisionedUserRecord> = res.take(0)?;
        Ok(record)
    }

    pub async fn insert_consent_receipt(
        db: &Surreal<Any>,
        record: &ConsentReceiptRecord,
    ) -> Result<()> {
        db.query("CREATE type::thing($tb, $key) CONTENT $record")
            .bind(("tb", CONSENT_RECEIPT_TABLE))
            .bind(("key", record.receipt_id.clone()))
            .bind(("record", record.clone()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn list_consent_receipts(
        db: &Surreal<Any>,
        tenant: &str,
        principal_id: &str,
    ) -> Result<Vec<ConsentReceiptRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM consent_receipt
                WHERE tenant = $tenant AND principal_id = $principal_id
                ORDER BY created_at ASC
                "#,
            )
            .bind(("tenant", tenant.to_string()))
            .bind(("principal_id", principal_id.to_string()))
            .await?;
        let records: Vec<ConsentReceiptRecord> = res.take(0)?;
        Ok(records)
    }
}
