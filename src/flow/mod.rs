//! Authentication flow state.
//!
//! A [`FlowContext`] carries everything provisioning knows about one
//! authentication attempt. It is plain serializable data: suspending the flow
//! means persisting the context, resuming it means loading it back by its
//! [`ContextId`].

mod request;
mod store;

pub use request::{RequestParams, SESSION_DATA_KEY};
pub use store::FlowContextStore;

use serde::{Deserialize, Serialize};

use crate::claims::{ClaimSet, MissingClaim};
use crate::idp::ExternalIdpConfig;
use crate::types::{ContextId, IdpName, SubjectId, TenantDomain, Username};

/// Closed set of authenticator kinds a step can complete with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticatorKind {
    Local,
    Federated,
}

/// The user a step (or the whole sequence) authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    /// Name the user authenticated as (e.g., "alice@gmail.com").
    pub username: Username,
    /// Subject identifier asserted by the IdP.
    pub subject: SubjectId,
    /// Attributes as asserted by the IdP, including its role claim.
    #[serde(default)]
    pub attributes: ClaimSet,
}

impl AuthenticatedUser {
    pub fn new(username: impl Into<Username>, subject: impl Into<SubjectId>) -> Self {
        Self {
            username: username.into(),
            subject: subject.into(),
            attributes: ClaimSet::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: ClaimSet) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Outcome of one completed authentication step. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationStepResult {
    pub step: u32,
    pub idp: IdpName,
    pub authenticator_name: String,
    pub kind: AuthenticatorKind,
    pub user: AuthenticatedUser,
}

impl AuthenticationStepResult {
    /// A step completed by a federated authenticator.
    pub fn federated(step: u32, idp: impl Into<IdpName>, user: AuthenticatedUser) -> Self {
        Self {
            step,
            idp: idp.into(),
            authenticator_name: "FederatedAuthenticator".to_string(),
            kind: AuthenticatorKind::Federated,
            user,
        }
    }

    /// A step completed by a local authenticator against the resident IdP.
    pub fn local(step: u32, user: AuthenticatedUser) -> Self {
        Self {
            step,
            idp: IdpName::new("LOCAL"),
            authenticator_name: "BasicAuthenticator".to_string(),
            kind: AuthenticatorKind::Local,
            user,
        }
    }

    pub fn with_authenticator_name(mut self, name: impl Into<String>) -> Self {
        self.authenticator_name = name.into();
        self
    }

    pub fn is_federated(&self) -> bool {
        matches!(self.kind, AuthenticatorKind::Federated)
    }
}

/// Where provisioning stopped for a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JitState {
    NotApplicable,
    RequestPhase,
    AwaitingExternalInput,
    ResponsePhase,
    Completed,
    Failed,
}

/// Named flow properties used by provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowProperties {
    /// Set when the sign-up redirect has been issued; the next evaluation
    /// of this flow is the response phase.
    #[serde(default)]
    pub provisioning_redirect_triggered: bool,
    /// Set when the user was sent to the registration page, which lets them
    /// pick their own username.
    #[serde(default)]
    pub username_change_allowed: bool,
    /// Local claim values from the federated assertion, before any filtering
    /// for the relying application.
    #[serde(default)]
    pub unfiltered_local_claims: Option<ClaimSet>,
    #[serde(default)]
    pub jit_state: Option<JitState>,
}

/// One in-progress authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContext {
    context_id: ContextId,
    tenant: TenantDomain,
    #[serde(default)]
    steps: Vec<AuthenticationStepResult>,
    #[serde(default)]
    authenticated_user: Option<AuthenticatedUser>,
    #[serde(default)]
    properties: FlowProperties,
    #[serde(default)]
    external_idp: Option<ExternalIdpConfig>,
    #[serde(default)]
    missing_claims: Vec<MissingClaim>,
}

impl FlowContext {
    pub fn new(context_id: ContextId, tenant: impl Into<TenantDomain>) -> Self {
        Self {
            context_id,
            tenant: tenant.into(),
            steps: Vec::new(),
            authenticated_user: None,
            properties: FlowProperties::default(),
            external_idp: None,
            missing_claims: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: AuthenticationStepResult) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_authenticated_user(mut self, user: AuthenticatedUser) -> Self {
        self.authenticated_user = Some(user);
        self
    }

    pub fn with_unfiltered_local_claims(mut self, claims: ClaimSet) -> Self {
        self.properties.unfiltered_local_claims = Some(claims);
        self
    }

    /// Claims the relying application marked mandatory that are still missing.
    pub fn with_missing_claims(mut self, missing: Vec<MissingClaim>) -> Self {
        self.missing_claims = missing;
        self
    }

    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    pub fn tenant(&self) -> &TenantDomain {
        &self.tenant
    }

    pub fn steps(&self) -> &[AuthenticationStepResult] {
        &self.steps
    }

    /// Completed steps in ascending step-index order.
    pub fn steps_in_order(&self) -> Vec<&AuthenticationStepResult> {
        let mut steps: Vec<_> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.step);
        steps
    }

    /// The user the whole sequence authenticated, if the framework set one.
    pub fn authenticated_user(&self) -> Option<&AuthenticatedUser> {
        self.authenticated_user.as_ref()
    }

    /// Merge claims into the sequence user's attributes so later consumers
    /// of this context see them. No-op when no sequence user is set.
    pub fn enrich_user_attributes(&mut self, claims: &ClaimSet) {
        if let Some(user) = self.authenticated_user.as_mut() {
            user.attributes.merge(claims);
        }
    }

    pub fn properties(&self) -> &FlowProperties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut FlowProperties {
        &mut self.properties
    }

    pub fn unfiltered_local_claims(&self) -> Option<&ClaimSet> {
        self.properties.unfiltered_local_claims.as_ref()
    }

    pub fn jit_state(&self) -> Option<JitState> {
        self.properties.jit_state
    }

    pub fn set_jit_state(&mut self, state: JitState) {
        self.properties.jit_state = Some(state);
    }

    /// IdP configuration of the step currently being handled.
    pub fn external_idp(&self) -> Option<&ExternalIdpConfig> {
        self.external_idp.as_ref()
    }

    pub fn set_external_idp(&mut self, idp: Option<ExternalIdpConfig>) {
        self.external_idp = idp;
    }

    pub fn missing_claims(&self) -> &[MissingClaim] {
        &self.missing_claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> AuthenticatedUser {
        AuthenticatedUser::new("alice@gmail.com", "alice@gmail.com")
    }

    #[test]
    fn test_steps_in_order() {
        let ctx = FlowContext::new(ContextId::new("ctx"), "acme")
            .with_step(AuthenticationStepResult::federated(2, "GoogleIdP", alice()))
            .with_step(AuthenticationStepResult::local(1, alice()));

        let order: Vec<u32> = ctx.steps_in_order().iter().map(|s| s.step).collect();
        assert_eq!(order, vec![1, 2]);
        // Recorded order is untouched.
        assert_eq!(ctx.steps()[0].step, 2);
    }

    #[test]
    fn test_enrich_user_attributes() {
        let mut ctx = FlowContext::new(ContextId::new("ctx"), "acme");
        let extra: ClaimSet = [("http://wso2.org/claims/country", "USA")]
            .into_iter()
            .collect();

        ctx.enrich_user_attributes(&extra);
        assert!(ctx.authenticated_user().is_none());

        let mut ctx = ctx.with_authenticated_user(alice());
        ctx.enrich_user_attributes(&extra);
        let user = ctx.authenticated_user().unwrap();
        assert_eq!(
            user.attributes.get("http://wso2.org/claims/country"),
            Some("USA")
        );
    }

    #[test]
    fn test_flow_context_json_round_trip() {
        let mut ctx = FlowContext::new(ContextId::new("ctx-9"), "acme")
            .with_step(AuthenticationStepResult::federated(1, "GoogleIdP", alice()))
            .with_missing_claims(vec![MissingClaim::new("uri", "Name")]);
        ctx.properties_mut().provisioning_redirect_triggered = true;
        ctx.set_jit_state(JitState::AwaitingExternalInput);

        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"AWAITING_EXTERNAL_INPUT\""));
        let parsed: FlowContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ctx);
    }

    #[test]
    fn test_local_step_is_not_federated() {
        let step = AuthenticationStepResult::local(1, alice());
        assert!(!step.is_federated());
        assert_eq!(step.kind, AuthenticatorKind::Local);
    }
}
