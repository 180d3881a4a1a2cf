//! Parameters of an inbound request, as handed over by the HTTP layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::ContextId;

/// Name of the parameter that correlates a request with its flow.
pub const SESSION_DATA_KEY: &str = "sessionDataKey";

/// Query and form fields of one request.
///
/// Only the first value of a repeated field is kept, matching how the
/// sign-up form posts back single-valued claim fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams(HashMap<String, String>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and the HTTP adapter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.entry(name.into()).or_insert_with(|| value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Get a field only if it has non-whitespace content.
    pub fn get_non_blank(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.trim().is_empty())
    }

    /// The correlation key carried by a resumed request.
    pub fn context_id(&self) -> Option<ContextId> {
        self.get_non_blank(SESSION_DATA_KEY).map(ContextId::new)
    }

    /// Fold another set of fields in; existing fields win.
    pub fn extend(&mut self, other: RequestParams) {
        for (name, value) in other.0 {
            self.0.entry(name).or_insert(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RequestParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params = params.with(k, v);
        }
        params
    }
}

impl From<HashMap<String, String>> for RequestParams {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}
