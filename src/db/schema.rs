//! Persisted record shapes.
//!
//! Record ids are derived from natural keys (`type::thing`) so writes are
//! upserts; the structs below therefore omit the `id` field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FLOW_CONTEXT_TABLE: &str = "flow_context";
pub const FEDERATED_ASSOCIATION_TABLE: &str = "federated_association";
pub const PROVISIONED_USER_TABLE: &str = "provisioned_user";
pub const CONSENT_RECEIPT_TABLE: &str = "consent_receipt";

/// A suspended flow. The context itself is kept as a JSON document string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowContextRecord {
    pub context_id: String,
    pub tenant: String,
    pub payload: String,
    /// RFC3339, UTC, millisecond precision.
    pub saved_at: String,
}

/// Link between a federated subject and a local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedAssociationRecord {
    pub tenant: String,
    pub idp: String,
    pub subject: String,
    pub username: String,
    pub created_at: String,
}

/// A local account as last written by provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedUserRecord {
    pub tenant: String,
    pub username: String,
    pub claims: BTreeMap<String, String>,
    pub roles: Vec<String>,
    /// Whether the user chose a local password. The password itself is
    /// never stored here.
    pub password_set: bool,
    pub idp: Option<String>,
    pub updated_at: String,
}

/// A persisted consent receipt; `receipt` holds the full receipt document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentReceiptRecord {
    pub receipt_id: String,
    pub tenant: String,
    pub principal_id: String,
    pub receipt: String,
    pub created_at: String,
}

/// Current time in the fixed-width format used for every stored timestamp,
/// so string comparison orders them chronologically.
pub fn timestamp_now() -> String {
    format_timestamp(chrono::Utc::now())
}

pub fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
