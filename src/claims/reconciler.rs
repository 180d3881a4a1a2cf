//! Merging of cached federated claims with values from the sign-up form.

use crate::claims::{ClaimDescriptor, ClaimSet, MISSING_CLAIM_PREFIX};
use crate::flow::RequestParams;

/// Result of reconciling one resumed request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Claims handed to provisioning.
    pub claims: ClaimSet,
    /// Mandatory claims the user supplied through the "missing-" fallback
    /// fields. Always a subset of `claims`.
    pub missing: ClaimSet,
}

/// Stateless claim reconciliation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimReconciler;

impl ClaimReconciler {
    /// Reconcile the claims known in `schema`.
    ///
    /// Starts from `cached` (the unfiltered local claim values captured before
    /// the flow was suspended). For each schema URI, a non-blank submitted
    /// value is adopted only when nothing non-blank is cached; otherwise a
    /// non-blank `missing-<uri>` field is adopted into both sets. A present
    /// cached value is never replaced with a blank submission.
    pub fn reconcile(
        schema: &[ClaimDescriptor],
        submitted: &RequestParams,
        cached: &ClaimSet,
    ) -> Reconciled {
        let mut claims = cached.clone();
        let mut missing = ClaimSet::new();

        for descriptor in schema {
            let uri = descriptor.uri.as_str();
            let has_cached = cached.get_non_blank(uri).is_some();

            if let Some(value) = submitted.get_non_blank(uri).filter(|_| !has_cached) {
                claims.insert(uri, value);
                continue;
            }

            let fallback_field = format!("{MISSING_CLAIM_PREFIX}{uri}");
            if let Some(value) = submitted.get_non_blank(&fallback_field) {
                claims.insert(uri, value);
                missing.insert(uri, value);
            }
        }

        Reconciled { claims, missing }
    }
}
