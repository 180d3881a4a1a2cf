//! Consent receipts for data collected during sign-up.

mod builder;
mod store;

pub use builder::{ConsentError, ConsentReceiptBuilder, RESIDENT_IDP_LABEL};
pub use store::SurrealConsentStore;

use serde::{Deserialize, Serialize};

use crate::types::TenantDomain;

pub const COLLECTION_METHOD_JIT: &str = "JIT";
pub const LANGUAGE_ENGLISH: &str = "en";
pub const EXPLICIT_CONSENT_TYPE: &str = "EXPLICIT";
pub const INFINITE_TERMINATION: &str = "DATE_UNTIL:INDEFINITE";
pub const DEFAULT_JURISDICTION: &str = "USA";

/// Record of what a principal consented to, ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentReceipt {
    pub principal_id: String,
    pub tenant: TenantDomain,
    pub jurisdiction: String,
    pub collection_method: String,
    pub language: String,
    pub policy_url: Option<String>,
    pub services: Vec<ConsentService>,
}

/// Consent given to one service. Unset identity fields are filled from the
/// tenant's resident IdP before the receipt is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentService {
    pub service: Option<String>,
    pub tenant: Option<TenantDomain>,
    pub description: Option<String>,
    pub display_name: Option<String>,
    pub purposes: Vec<ConsentPurpose>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentPurpose {
    pub purpose_id: u32,
    pub purpose_category_ids: Vec<u32>,
    pub consent_type: String,
    pub primary_purpose: bool,
    pub third_party_disclosure: bool,
    pub termination: String,
    pub pii_categories: Vec<PiiCategoryValidity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiiCategoryValidity {
    pub pii_category_id: u32,
    pub validity: String,
}
