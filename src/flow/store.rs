//! Durable storage for suspended flows.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tracing::{debug, info};

use crate::db::{FlowContextRecord, QueryBuilder, format_timestamp, timestamp_now};
use crate::flow::FlowContext;
use crate::types::ContextId;

/// Keeps suspended [`FlowContext`]s between the redirect and the resumed
/// request, keyed by context identifier.
#[derive(Clone)]
pub struct FlowContextStore {
    db: Surreal<Any>,
}

impl FlowContextStore {
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Persist a context, replacing any earlier copy with the same id.
    pub async fn save(&self, context: &FlowContext) -> Result<()> {
        let record = FlowContextRecord {
            context_id: context.context_id().to_string(),
            tenant: context.tenant().to_string(),
            payload: serde_json::to_string(context)?,
            saved_at: timestamp_now(),
        };
        QueryBuilder::upsert_flow_context(&self.db, &record).await?;
        debug!(context_id = %context.context_id(), tenant = %context.tenant(), "Saved flow context");
        Ok(())
    }

    /// Read a context without consuming it.
    pub async fn load(&self, context_id: &ContextId) -> Result<Option<FlowContext>> {
        QueryBuilder::find_flow_context(&self.db, context_id.as_str())
            .await?
            .map(decode)
            .transpose()
    }

    /// Remove and return a context. Of several concurrent callers with the
    /// same id at most one gets `Some`.
    pub async fn take(&self, context_id: &ContextId) -> Result<Option<FlowContext>> {
        QueryBuilder::take_flow_context(&self.db, context_id.as_str())
            .await?
            .map(decode)
            .transpose()
    }

    /// Drop contexts saved before `cutoff`; returns how many were removed.
    pub async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed =
            QueryBuilder::delete_flow_contexts_before(&self.db, &format_timestamp(cutoff)).await?;
        if removed > 0 {
            info!(removed, "Removed abandoned flow contexts");
        }
        Ok(removed)
    }
}

fn decode(record: FlowContextRecord) -> Result<FlowContext> {
    serde_json::from_str(&record.payload)
        .with_context(|| format!("corrupt flow context {}", record.context_id))
}
