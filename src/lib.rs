// Core modules
mod config;
mod db;
pub mod api;
pub mod types;

// Provisioning domain
pub mod claims;
pub mod collaborators;
pub mod consent;
pub mod flow;
pub mod idp;
pub mod linkage;
pub mod provisioning;
pub mod registry;
pub mod roles;

// Re-export key types and functions
pub use api::{ApiState, AppState, create_admin_router, create_public_router};
pub use config::{ProvisioningConfig, TenantConfig, load_config, load_config_from};
pub use db::{DatabaseConfig, Db, create_connection, ensure_schema};
pub use flow::{FlowContext, FlowContextStore, JitState, RequestParams};
pub use provisioning::{
    HandlerSettings, JitProvisioningHandler, ProvisioningError, ProvisioningOutcome,
};

use anyhow::Result;
use std::sync::Arc;

use collaborators::Collaborators;
use consent::SurrealConsentStore;
use linkage::SurrealLinkageResolver;
use provisioning::{FederatedStepPolicy, SurrealUserProvisioner};
use registry::StaticIdpRegistry;

/// Wire a handler against SurrealDB-backed stores and the configured IdPs.
pub fn create_handler(db: Db, config: &ProvisioningConfig) -> JitProvisioningHandler {
    let registry = Arc::new(StaticIdpRegistry::from_config(config));
    let deps = Collaborators {
        policy: Arc::new(FederatedStepPolicy),
        idp_registry: registry.clone(),
        claim_schema: registry.clone(),
        linkage: Arc::new(SurrealLinkageResolver::new(db.clone())),
        provisioner: Arc::new(SurrealUserProvisioner::new(db.clone())),
        consent_store: Arc::new(SurrealConsentStore::new(db)),
        resident_idp: registry,
    };
    JitProvisioningHandler::new(deps, config.handler_settings())
}

/// Shared state for the HTTP routers on an existing connection.
pub fn create_app_state(db: Db, config: &ProvisioningConfig) -> AppState {
    Arc::new(ApiState {
        handler: create_handler(db.clone(), config),
        flows: FlowContextStore::new(db.clone()),
        links: SurrealLinkageResolver::new(db),
    })
}

/// Connect, make sure the schema exists and build the router state.
pub async fn connect(config: DatabaseConfig, provisioning: &ProvisioningConfig) -> Result<AppState> {
    let db = create_connection(config).await?;
    ensure_schema(&db).await?;
    Ok(create_app_state(db, provisioning))
}
