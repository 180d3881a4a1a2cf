//! Error types for JIT provisioning.
//!
//! Every variant carries a stable code (`JIT-600xx`) and a message naming the
//! tenant, IdP or user involved. None of them are retried here; a failed
//! evaluation is retried, if at all, by re-running the whole flow.

use serde::Serialize;
use thiserror::Error;

use crate::consent::ConsentError;

/// Broad failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// IdP or tenant lookup failed.
    ConfigResolution,
    /// Tenant claim schema lookup failed.
    ClaimSchema,
    /// Account linkage lookup failed. Distinct from "no linkage".
    LinkageLookup,
    /// Creating or updating the local account failed.
    ProvisioningCall,
    /// The consent submission could not be turned into a receipt.
    ConsentBuild,
    /// Storing the consent receipt failed.
    ConsentPersist,
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("error while getting IdP {idp} of tenant {tenant}")]
    ConfigResolution {
        tenant: String,
        idp: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("IdP {idp} is not configured for tenant {tenant}")]
    IdpNotFound { tenant: String, idp: String },

    #[error("error while getting the claims of tenant {tenant} to provision users from IdP {idp}")]
    ClaimSchema {
        tenant: String,
        idp: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("error while getting the local account associated with IdP {idp} in tenant {tenant}")]
    LinkageLookup {
        tenant: String,
        idp: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("error while redirecting user {username} of IdP {idp} to the sign-up endpoint")]
    Redirect {
        username: String,
        idp: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("error while provisioning user {username} from IdP {idp} in tenant {tenant}")]
    Provisioning {
        tenant: String,
        idp: String,
        username: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid consent submitted by user {username} in tenant {tenant}: {source}")]
    ConsentBuild {
        tenant: String,
        username: String,
        #[source]
        source: ConsentError,
    },

    #[error("error while getting the resident IdP of tenant {tenant}")]
    ResidentIdp {
        tenant: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("resident IdP of tenant {tenant} is not configured")]
    ResidentIdpNotFound { tenant: String },

    #[error("error while adding consent for user {username} in tenant {tenant}")]
    ConsentPersist {
        tenant: String,
        username: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Result type for provisioning operations.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

impl ProvisioningError {
    /// Stable code identifying this failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigResolution { .. } => "JIT-60001",
            Self::IdpNotFound { .. } => "JIT-60002",
            Self::ClaimSchema { .. } => "JIT-60003",
            Self::LinkageLookup { .. } => "JIT-60004",
            Self::Redirect { .. } => "JIT-60005",
            Self::Provisioning { .. } => "JIT-60006",
            Self::ConsentBuild { .. } => "JIT-60007",
            Self::ResidentIdp { .. } => "JIT-60008",
            Self::ResidentIdpNotFound { .. } => "JIT-60009",
            Self::ConsentPersist { .. } => "JIT-60010",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigResolution { .. } | Self::IdpNotFound { .. } => ErrorKind::ConfigResolution,
            Self::ClaimSchema { .. } => ErrorKind::ClaimSchema,
            Self::LinkageLookup { .. } => ErrorKind::LinkageLookup,
            Self::Redirect { .. } | Self::Provisioning { .. } => ErrorKind::ProvisioningCall,
            Self::ConsentBuild { .. } => ErrorKind::ConsentBuild,
            Self::ResidentIdp { .. }
            | Self::ResidentIdpNotFound { .. }
            | Self::ConsentPersist { .. } => ErrorKind::ConsentPersist,
        }
    }

    /// Whether the failure happened after the account was already written.
    /// Provisioning is not rolled back in that case.
    pub fn is_consent_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConsentBuild | ErrorKind::ConsentPersist
        )
    }
}
