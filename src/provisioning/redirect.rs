//! The sign-up redirect that suspends a flow.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::claims::{ClaimSet, MissingClaim, missing_claim_lists};
use crate::collaborators::ResponseSink;
use crate::flow::SESSION_DATA_KEY;
use crate::types::{ContextId, Username};

pub const USERNAME_PARAM: &str = "username";
pub const ALLOW_CHANGE_USERNAME_PARAM: &str = "allowChangeUsername";
pub const PASSWORD_PROVISION_ENABLED_PARAM: &str = "passwordProvisionEnabled";
pub const SKIP_SIGN_UP_ENABLE_CHECK_PARAM: &str = "skipSignUpEnableCheck";
pub const MISSING_CLAIMS_PARAM: &str = "missingClaims";
pub const MISSING_CLAIMS_DISPLAY_NAME_PARAM: &str = "missingClaimsDisplayName";
pub const CONSENT_PARAM: &str = "consent";
pub const POLICY_PARAM: &str = "policy";

/// Where users without a local account are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpEndpoints {
    /// Used when the user keeps the suggested username.
    pub sign_up: String,
    /// Used when the IdP lets the user pick a different username.
    pub registration: String,
}

impl Default for SignUpEndpoints {
    fn default() -> Self {
        Self {
            sign_up: "https://localhost:9443/accountrecoveryendpoint/signup.do".to_string(),
            registration: "https://localhost:9443/accountrecoveryendpoint/register.do".to_string(),
        }
    }
}

/// Everything the sign-up page needs to resume the flow.
#[derive(Debug, Clone)]
pub struct SignUpRedirect<'a> {
    pub username: &'a Username,
    pub context_id: &'a ContextId,
    pub allow_change_username: bool,
    pub password_provisioning: bool,
    pub missing_claims: &'a [MissingClaim],
    pub prefilled: &'a ClaimSet,
}

impl SignUpRedirect<'_> {
    /// Render the redirect target. Parameter order: the username-change
    /// flag, the password flag, username, skip-check, `sessionDataKey`, the
    /// missing-claim lists, then one parameter per prefilled claim.
    pub fn to_url(&self, endpoints: &SignUpEndpoints) -> Result<Url, url::ParseError> {
        let base = if self.allow_change_username {
            &endpoints.registration
        } else {
            &endpoints.sign_up
        };
        let mut url = Url::parse(base)?;

        {
            let mut query = url.query_pairs_mut();
            if self.allow_change_username {
                query.append_pair(ALLOW_CHANGE_USERNAME_PARAM, "true");
            }
            if self.password_provisioning {
                query.append_pair(PASSWORD_PROVISION_ENABLED_PARAM, "true");
            }
            query.append_pair(USERNAME_PARAM, self.username.as_str());
            query.append_pair(SKIP_SIGN_UP_ENABLE_CHECK_PARAM, "true");
            query.append_pair(SESSION_DATA_KEY, self.context_id.as_str());
            if let Some((uris, names)) = missing_claim_lists(self.missing_claims) {
                query.append_pair(MISSING_CLAIMS_PARAM, &uris);
                query.append_pair(MISSING_CLAIMS_DISPLAY_NAME_PARAM, &names);
            }
            for (uri, value) in self.prefilled.iter() {
                query.append_pair(uri, value);
            }
        }

        Ok(url)
    }
}

/// A [`ResponseSink`] that keeps the redirect for the caller to send.
#[derive(Debug, Default)]
pub struct RedirectCapture {
    location: Option<Url>,
}

impl RedirectCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location(&self) -> Option<&Url> {
        self.location.as_ref()
    }

    pub fn into_location(self) -> Option<Url> {
        self.location
    }
}

impl ResponseSink for RedirectCapture {
    fn send_redirect(&mut self, location: Url) -> anyhow::Result<()> {
        if let Some(previous) = &self.location {
            anyhow::bail!("redirect already issued to {previous}");
        }
        self.location = Some(location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_sign_up_redirect() {
        let username = Username::new("alice@acme");
        let context_id = ContextId::new("ctx-1");
        let prefilled: ClaimSet = [("http://wso2.org/claims/emailaddress", "alice@gmail.com")]
            .into_iter()
            .collect();
        let missing = vec![MissingClaim::new("http://wso2.org/claims/country", "Country")];

        let url = SignUpRedirect {
            username: &username,
            context_id: &context_id,
            allow_change_username: false,
            password_provisioning: true,
            missing_claims: &missing,
            prefilled: &prefilled,
        }
        .to_url(&SignUpEndpoints::default())
        .unwrap();

        assert_eq!(url.path(), "/accountrecoveryendpoint/signup.do");
        assert!(url.as_str().contains("username=alice%40acme"));
        assert_eq!(
            query(&url),
            vec![
                ("passwordProvisionEnabled".into(), "true".into()),
                ("username".into(), "alice@acme".into()),
                ("skipSignUpEnableCheck".into(), "true".into()),
                ("sessionDataKey".into(), "ctx-1".into()),
                ("missingClaims".into(), "http://wso2.org/claims/country".into()),
                ("missingClaimsDisplayName".into(), "Country".into()),
                (
                    "http://wso2.org/claims/emailaddress".into(),
                    "alice@gmail.com".into()
                ),
            ]
        );
    }

    #[test]
    fn test_registration_redirect_when_username_change_allowed() {
        let username = Username::new("bob");
        let context_id = ContextId::new("ctx-2");
        let url = SignUpRedirect {
            username: &username,
            context_id: &context_id,
            allow_change_username: true,
            password_provisioning: false,
            missing_claims: &[],
            prefilled: &ClaimSet::new(),
        }
        .to_url(&SignUpEndpoints::default())
        .unwrap();

        assert_eq!(url.path(), "/accountrecoveryendpoint/register.do");
        let params = query(&url);
        assert_eq!(params[0], ("allowChangeUsername".into(), "true".into()));
        assert!(!params.iter().any(|(k, _)| k == "passwordProvisionEnabled"));
        assert!(!params.iter().any(|(k, _)| k == "missingClaims"));
    }

    #[test]
    fn test_invalid_endpoint() {
        let endpoints = SignUpEndpoints {
            sign_up: "not a url".into(),
            ..Default::default()
        };
        let username = Username::new("bob");
        let context_id = ContextId::new("ctx");
        let result = SignUpRedirect {
            username: &username,
            context_id: &context_id,
            allow_change_username: false,
            password_provisioning: false,
            missing_claims: &[],
            prefilled: &ClaimSet::new(),
        }
        .to_url(&endpoints);
        assert!(result.is_err());
    }

    #[test]
    fn test_capture_accepts_one_redirect() {
        let mut sink = RedirectCapture::new();
        let url = Url::parse("https://idp.example/signup.do").unwrap();
        sink.send_redirect(url.clone()).unwrap();
        assert!(sink.send_redirect(url.clone()).is_err());
        assert_eq!(sink.into_location(), Some(url));
    }
}
