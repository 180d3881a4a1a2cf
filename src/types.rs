//! NewType wrappers for the identities that flow through provisioning.
//!
//! Tenants, identity providers, subjects and local usernames are all plain
//! strings on the wire; wrapping them keeps a subject identifier from being
//! handed to something that expects a local username.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }

            /// True when the value is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Tenant domain that scopes users, claims and identity providers
    /// (e.g., "acme", "carbon.super").
    TenantDomain
);

newtype_string!(
    /// Name of an external identity provider as registered for a tenant
    /// (e.g., "GoogleIdP").
    IdpName
);

newtype_string!(
    /// Subject identifier asserted by an identity provider for the
    /// authenticated user (e.g., "alice@gmail.com").
    ///
    /// Only meaningful together with the `IdpName` that asserted it.
    SubjectId
);

newtype_string!(
    /// Local account name in the tenant's user store.
    Username
);

newtype_string!(
    /// Opaque identifier of one in-progress authentication attempt.
    ///
    /// Travels to the sign-up UI as `sessionDataKey` and comes back on the
    /// resumed request; it is the only handle for finding a suspended flow.
    ContextId
);

newtype_string!(
    /// Identifier of a role in the local user store.
    LocalRoleId
);

impl ContextId {
    /// Generate a fresh random context identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
