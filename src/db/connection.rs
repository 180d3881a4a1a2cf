use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::debug;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "jit".to_string()),
            database: env::var("SURREALDB_DATABASE")
                .unwrap_or_else(|_| "provisioning".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    debug!(url = %config.url, ns = %config.namespace, db = %config.database, "Connecting to SurrealDB");
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Suspended flows awaiting the sign-up form
        "DEFINE TABLE IF NOT EXISTS flow_context SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS flow_context_saved_at ON TABLE flow_context COLUMNS saved_at;",
        // Federated subject -> local account
        "DEFINE TABLE IF NOT EXISTS federated_association SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS federated_association_user ON TABLE federated_association COLUMNS tenant, username;",
        // Accounts created or updated by provisioning
        "DEFINE TABLE IF NOT EXISTS provisioned_user SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS provisioned_user_tenant ON TABLE provisioned_user COLUMNS tenant;",
        // Consent receipts
        "DEFINE TABLE IF NOT EXISTS consent_receipt SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS consent_receipt_principal ON TABLE consent_receipt COLUMNS tenant, principal_id;",
    ];

    for query in schema_queries {
        db.query(query).await?;
    }

    Ok(())
}
