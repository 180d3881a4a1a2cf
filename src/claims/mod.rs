//! Claim sets and claim reconciliation.
//!
//! A claim is a `(claim URI, string value)` pair. Claims reach provisioning
//! from three places: the federated assertion (already mapped to local URIs
//! and cached on the flow), the sign-up form the user filled in, and the
//! "missing-" fields the form renders for claims the relying application
//! declared mandatory.

mod reconciler;

pub use reconciler::{ClaimReconciler, Reconciled};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved claim carrying the subject identifier asserted by the IdP.
pub const ASSOCIATED_ID_CLAIM: &str = "associatedID";

/// Reserved claim carrying the name of the IdP that authenticated the user.
pub const IDP_ID_CLAIM: &str = "idpId";

/// Claim carrying the password submitted on the sign-up form.
pub const PASSWORD_CLAIM: &str = "password";

/// Local claim holding the account name.
pub const USERNAME_CLAIM: &str = "http://wso2.org/claims/username";

/// Local role claim, used when an IdP does not configure its own.
pub const DEFAULT_ROLE_CLAIM: &str = "http://wso2.org/claims/role";

/// Prefix the sign-up form puts in front of mandatory-but-missing claims.
pub const MISSING_CLAIM_PREFIX: &str = "missing-";

/// Mapping from claim URI to value.
///
/// A URI appears at most once and later writes overwrite earlier ones.
/// Ordered so that anything rendered from it (redirect parameters, logs)
/// is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(BTreeMap<String, String>);

impl ClaimSet {
    /// Create an empty claim set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a claim, returning the previous value.
    pub fn insert(&mut self, uri: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(uri.into(), value.into())
    }

    /// Get a claim value.
    pub fn get(&self, uri: &str) -> Option<&str> {
        self.0.get(uri).map(String::as_str)
    }

    /// Get a claim value only if it has non-whitespace content.
    pub fn get_non_blank(&self, uri: &str) -> Option<&str> {
        self.get(uri).filter(|v| !v.trim().is_empty())
    }

    /// Remove a claim, returning its value.
    pub fn remove(&mut self, uri: &str) -> Option<String> {
        self.0.remove(uri)
    }

    /// Check whether a claim is present.
    pub fn contains(&self, uri: &str) -> bool {
        self.0.contains_key(uri)
    }

    /// Copy every claim from `other` into this set, overwriting duplicates.
    pub fn merge(&mut self, other: &ClaimSet) {
        for (uri, value) in other.iter() {
            self.0.insert(uri.to_string(), value.to_string());
        }
    }

    /// Iterate over `(uri, value)` pairs in URI order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over claim URIs in order.
    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ClaimSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A claim known to a tenant's claim dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimDescriptor {
    /// Local claim URI (e.g., "http://wso2.org/claims/country").
    pub uri: String,
    /// Human-readable name shown on the sign-up form.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ClaimDescriptor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// A claim the relying application requires but the IdP did not supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingClaim {
    pub uri: String,
    pub display_name: String,
}

impl MissingClaim {
    pub fn new(uri: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            display_name: display_name.into(),
        }
    }
}

/// Render missing claims as the two comma-joined parallel lists the sign-up
/// form expects: `(uris, display_names)`. `None` when nothing is missing.
pub fn missing_claim_lists(missing: &[MissingClaim]) -> Option<(String, String)> {
    if missing.is_empty() {
        return None;
    }
    let uris = missing
        .iter()
        .map(|c| c.uri.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let names = missing
        .iter()
        .map(|c| c.display_name.as_str())
        .collect::<Vec<_>>()
        .join(",");
    Some((uris, names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_set_overwrites() {
        let mut claims = ClaimSet::new();
        assert_eq!(claims.insert("http://wso2.org/claims/country", "USA"), None);
        assert_eq!(
            claims.insert("http://wso2.org/claims/country", "CAN"),
            Some("USA".to_string())
        );
        assert_eq!(claims.len(), 1);
        assert_eq!(claims.get("http://wso2.org/claims/country"), Some("CAN"));
    }

    #[test]
    fn test_get_non_blank() {
        let claims: ClaimSet = [("a", "  "), ("b", "x")].into_iter().collect();
        assert_eq!(claims.get_non_blank("a"), None);
        assert_eq!(claims.get_non_blank("b"), Some("x"));
        assert_eq!(claims.get_non_blank("c"), None);
    }

    #[test]
    fn test_merge_and_ordering() {
        let mut base: ClaimSet = [("z", "1"), ("a", "2")].into_iter().collect();
        let other: ClaimSet = [("a", "3"), ("m", "4")].into_iter().collect();
        base.merge(&other);

        let uris: Vec<_> = base.uris().collect();
        assert_eq!(uris, vec!["a", "m", "z"]);
        assert_eq!(base.get("a"), Some("3"));
    }

    #[test]
    fn test_claim_set_serializes_as_map() {
        let claims: ClaimSet = [("uri", "v")].into_iter().collect();
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json, serde_json::json!({ "uri": "v" }));
    }

    #[test]
    fn test_missing_claim_lists() {
        assert_eq!(missing_claim_lists(&[]), None);

        let missing = vec![
            MissingClaim::new("http://wso2.org/claims/country", "Country"),
            MissingClaim::new("http://wso2.org/claims/mobile", "Mobile"),
        ];
        let (uris, names) = missing_claim_lists(&missing).unwrap();
        assert_eq!(
            uris,
            "http://wso2.org/claims/country,http://wso2.org/claims/mobile"
        );
        assert_eq!(names, "Country,Mobile");
    }
}
