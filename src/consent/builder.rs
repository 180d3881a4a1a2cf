use serde::Deserialize;
use thiserror::Error;

use crate::consent::{
    COLLECTION_METHOD_JIT, ConsentPurpose, ConsentReceipt, ConsentService, DEFAULT_JURISDICTION,
    EXPLICIT_CONSENT_TYPE, INFINITE_TERMINATION, LANGUAGE_ENGLISH, PiiCategoryValidity,
};
use crate::idp::IdpMetadata;
use crate::types::TenantDomain;

/// Label used when the resident IdP has no description or display name.
pub const RESIDENT_IDP_LABEL: &str = "Resident IDP";

#[derive(Debug, Error)]
pub enum ConsentError {
    #[error("malformed consent payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("consent payload contains no services")]
    NoServices,
}

// Shape posted by the sign-up form.
#[derive(Debug, Deserialize)]
struct RawConsent {
    services: Vec<RawService>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    purposes: Vec<RawPurpose>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPurpose {
    purpose_id: u32,
    purpose_category_id: Vec<u32>,
    #[serde(default)]
    pii_category: Vec<RawPiiCategory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPiiCategory {
    pii_category_id: u32,
}

/// Turns a raw consent submission into a [`ConsentReceipt`].
#[derive(Debug, Clone)]
pub struct ConsentReceiptBuilder {
    jurisdiction: String,
}

impl Default for ConsentReceiptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_JURISDICTION)
    }
}

impl ConsentReceiptBuilder {
    pub fn new(jurisdiction: impl Into<String>) -> Self {
        Self {
            jurisdiction: jurisdiction.into(),
        }
    }

    /// Parse `raw` and build the receipt. Every purpose is an explicit,
    /// primary purpose without third-party disclosure that never expires.
    pub fn build(
        &self,
        principal_id: &str,
        tenant: &TenantDomain,
        raw: &str,
        policy_url: Option<&str>,
    ) -> Result<ConsentReceipt, ConsentError> {
        let raw: RawConsent = serde_json::from_str(raw)?;
        if raw.services.is_empty() {
            return Err(ConsentError::NoServices);
        }

        let services = raw
            .services
            .into_iter()
            .map(|service| ConsentService {
                purposes: service.purposes.into_iter().map(purpose).collect(),
                ..Default::default()
            })
            .collect();

        Ok(ConsentReceipt {
            principal_id: principal_id.to_string(),
            tenant: tenant.clone(),
            jurisdiction: self.jurisdiction.clone(),
            collection_method: COLLECTION_METHOD_JIT.to_string(),
            language: LANGUAGE_ENGLISH.to_string(),
            policy_url: policy_url
                .filter(|p| !p.trim().is_empty())
                .map(str::to_string),
            services,
        })
    }

    /// Fill unset service fields from the tenant's resident IdP.
    pub fn backfill(receipt: &mut ConsentReceipt, resident: &IdpMetadata) {
        let tenant = receipt.tenant.clone();
        for service in &mut receipt.services {
            if is_unset(&service.service) {
                service.service = resident.home_realm_id.clone();
            }
            if service.tenant.as_ref().is_none_or(|t| t.is_blank()) {
                service.tenant = Some(tenant.clone());
            }
            if is_unset(&service.description) {
                service.description = Some(label_or_default(&resident.description));
            }
            if is_unset(&service.display_name) {
                service.display_name = Some(label_or_default(&resident.display_name));
            }
        }
    }
}

fn purpose(raw: RawPurpose) -> ConsentPurpose {
    ConsentPurpose {
        purpose_id: raw.purpose_id,
        purpose_category_ids: raw.purpose_category_id,
        consent_type: EXPLICIT_CONSENT_TYPE.to_string(),
        primary_purpose: true,
        third_party_disclosure: false,
        termination: INFINITE_TERMINATION.to_string(),
        pii_categories: raw
            .pii_category
            .into_iter()
            .map(|c| PiiCategoryValidity {
                pii_category_id: c.pii_category_id,
                validity: INFINITE_TERMINATION.to_string(),
            })
            .collect(),
    }
}

fn is_unset(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

fn label_or_default(value: &Option<String>) -> String {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(RESIDENT_IDP_LABEL)
        .to_string()
}
