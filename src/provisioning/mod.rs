//! The JIT provisioning state machine.
//!
//! Provisioning runs after a multi-step authentication completes. For every
//! federated step whose IdP has provisioning enabled it either updates the
//! linked local account right away, or suspends the flow by redirecting the
//! user to a sign-up page. The sign-up page posts back to the framework,
//! which loads the suspended [`FlowContext`] and evaluates it again; the
//! `provisioning_redirect_triggered` property then routes it to the response
//! phase, where the account is created from the reconciled claims.
//!
//! The handler keeps no per-flow state, so one instance serves every flow.

mod error;
mod policy;
mod redirect;
mod store;


pub use error::{ErrorKind, ProvisioningError, ProvisioningResult};
pub use policy::FederatedStepPolicy;
pub use redirect::{
    ALLOW_CHANGE_USERNAME_PARAM, CONSENT_PARAM, MISSING_CLAIMS_DISPLAY_NAME_PARAM,
    MISSING_CLAIMS_PARAM, PASSWORD_PROVISION_ENABLED_PARAM, POLICY_PARAM, RedirectCapture,
    SKIP_SIGN_UP_ENABLE_CHECK_PARAM, SignUpEndpoints, SignUpRedirect, USERNAME_PARAM,
};
pub use store::{ProvisionedUser, SurrealUserProvisioner};

use tracing::{debug, error, info, warn};

use crate::claims::{
    ASSOCIATED_ID_CLAIM, ClaimReconciler, ClaimSet, IDP_ID_CLAIM, PASSWORD_CLAIM, Reconciled,
    USERNAME_CLAIM,
};
use crate::collaborators::{Collaborators, ResponseSink};
use crate::consent::{ConsentReceiptBuilder, DEFAULT_JURISDICTION};
use crate::flow::{AuthenticationStepResult, AuthenticatorKind, FlowContext, JitState, RequestParams};
use crate::idp::ExternalIdpConfig;
use crate::roles::RoleMapper;
use crate::types::{IdpName, TenantDomain, Username};

/// Default name of the tenant whose users carry no tenant suffix.
pub const DEFAULT_SUPER_TENANT: &str = "carbon.super";

/// Result of one evaluation.
#[derive(Debug)]
pub enum ProvisioningOutcome {
    /// Nothing left to do for this flow.
    Completed,
    /// The flow is suspended on a redirect; persist the context and wait for
    /// the resumed request.
    Incomplete,
    /// The flow must fail.
    Failed(ProvisioningError),
}

impl ProvisioningOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete)
    }

    pub fn error(&self) -> Option<&ProvisioningError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Deployment settings of the handler.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub endpoints: SignUpEndpoints,
    pub super_tenant: TenantDomain,
    pub jurisdiction: String,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            endpoints: SignUpEndpoints::default(),
            super_tenant: TenantDomain::new(DEFAULT_SUPER_TENANT),
            jurisdiction: DEFAULT_JURISDICTION.to_string(),
        }
    }
}

enum PhaseResult {
    Done,
    Suspended,
}

/// Stateless JIT provisioning handler.
#[derive(Clone)]
pub struct JitProvisioningHandler {
    deps: Collaborators,
    endpoints: SignUpEndpoints,
    super_tenant: TenantDomain,
    consent_builder: ConsentReceiptBuilder,
}

impl JitProvisioningHandler {
    pub fn new(deps: Collaborators, settings: HandlerSettings) -> Self {
        Self {
            deps,
            endpoints: settings.endpoints,
            super_tenant: settings.super_tenant,
            consent_builder: ConsentReceiptBuilder::new(settings.jurisdiction),
        }
    }

    /// Evaluate provisioning for one inbound request.
    ///
    /// `request` holds the fields of the current request (only read in the
    /// response phase), `response` receives the sign-up redirect when the
    /// flow suspends. The reached [`JitState`] is recorded on `context`.
    pub async fn evaluate(
        &self,
        request: &RequestParams,
        response: &mut dyn ResponseSink,
        context: &mut FlowContext,
    ) -> ProvisioningOutcome {
        if !self.deps.policy.is_jit_handling_needed(context).await {
            debug!(context_id = %context.context_id(), "JIT provisioning not needed");
            context.set_jit_state(JitState::NotApplicable);
            return ProvisioningOutcome::Completed;
        }

        let result = if context.properties().provisioning_redirect_triggered {
            debug!(context_id = %context.context_id(), "Entering JIT response phase");
            context.set_jit_state(JitState::ResponsePhase);
            self.handle_response_phase(request, context).await
        } else {
            debug!(context_id = %context.context_id(), "Entering JIT request phase");
            context.set_jit_state(JitState::RequestPhase);
            self.handle_request_phase(response, context).await
        };

        match result {
            Ok(PhaseResult::Done) => {
                context.set_jit_state(JitState::Completed);
                ProvisioningOutcome::Completed
            }
            Ok(PhaseResult::Suspended) => {
                context.set_jit_state(JitState::AwaitingExternalInput);
                ProvisioningOutcome::Incomplete
            }
            Err(err) => {
                error!(
                    context_id = %context.context_id(),
                    tenant = %context.tenant(),
                    code = err.code(),
                    "JIT provisioning failed: {err}"
                );
                context.set_jit_state(JitState::Failed);
                ProvisioningOutcome::Failed(err)
            }
        }
    }

    async fn handle_request_phase(
        &self,
        response: &mut dyn ResponseSink,
        context: &mut FlowContext,
    ) -> ProvisioningResult<PhaseResult> {
        let tenant = context.tenant().clone();
        let steps = ordered_steps(context);

        for step in &steps {
            match step.kind {
                AuthenticatorKind::Local => continue,
                AuthenticatorKind::Federated => {}
            }

            let idp = self.resolve_idp(&tenant, &step.idp).await?;
            context.set_external_idp(Some(idp.clone()));
            if !idp.provisioning_enabled {
                debug!(%tenant, idp = %step.idp, "Provisioning disabled, skipping step {}", step.step);
                continue;
            }

            let linked = self
                .deps
                .linkage
                .find_local_username(&tenant, &step.idp, &step.user.subject)
                .await
                .map_err(|source| ProvisioningError::LinkageLookup {
                    tenant: tenant.to_string(),
                    idp: step.idp.to_string(),
                    source,
                })?;
            let local_claims = context.unfiltered_local_claims().cloned().unwrap_or_default();

            match linked {
                Some(username) => {
                    debug!(%tenant, idp = %step.idp, %username, "Federated user has a local account");
                    self.provision(&username, local_claims, &idp, step, context)
                        .await?;
                }
                None => {
                    let candidate = tenant_qualified_username(
                        authenticated_name(context, step).as_str(),
                        &tenant,
                        &self.super_tenant,
                    );
                    self.redirect_to_sign_up(&idp, &candidate, &local_claims, response, context)?;
                    context.properties_mut().provisioning_redirect_triggered = true;
                    info!(
                        %tenant,
                        idp = %step.idp,
                        context_id = %context.context_id(),
                        "No local account, suspended flow for sign-up"
                    );
                    return Ok(PhaseResult::Suspended);
                }
            }
        }

        Ok(PhaseResult::Done)
    }

    async fn handle_response_phase(
        &self,
        request: &RequestParams,
        context: &mut FlowContext,
    ) -> ProvisioningResult<PhaseResult> {
        let tenant = context.tenant().clone();
        let steps = ordered_steps(context);

        for step in &steps {
            match step.kind {
                AuthenticatorKind::Local => continue,
                AuthenticatorKind::Federated => {}
            }

            let idp = self.resolve_idp(&tenant, &step.idp).await?;
            context.set_external_idp(Some(idp.clone()));
            if !idp.provisioning_enabled {
                continue;
            }

            let schema = self
                .deps
                .claim_schema
                .get_tenant_claim_schema(&tenant)
                .await
                .map_err(|source| ProvisioningError::ClaimSchema {
                    tenant: tenant.to_string(),
                    idp: idp.name.to_string(),
                    source,
                })?;
            let cached = context.unfiltered_local_claims().cloned().unwrap_or_default();
            let Reconciled {
                mut claims,
                missing,
            } = ClaimReconciler::reconcile(&schema, request, &cached);
            if !missing.is_empty() {
                debug!(%tenant, count = missing.len(), "User supplied mandatory claims");
                context.enrich_user_attributes(&missing);
            }

            if idp.password_provisioning_enabled {
                match request.get(PASSWORD_CLAIM) {
                    Some(password) => {
                        claims.insert(PASSWORD_CLAIM, password);
                    }
                    None => warn!(%tenant, idp = %idp.name, "Password provisioning enabled but no password submitted"),
                }
            }

            let authenticated = authenticated_name(context, step);
            let username = if context.properties().username_change_allowed {
                request
                    .get_non_blank(USERNAME_PARAM)
                    .map(Username::new)
                    .unwrap_or(authenticated)
            } else {
                authenticated
            };

            self.provision(&username, claims, &idp, step, context).await?;
            self.handle_consent(request, step, &username, &tenant).await?;
        }

        Ok(PhaseResult::Done)
    }

    async fn resolve_idp(
        &self,
        tenant: &TenantDomain,
        name: &IdpName,
    ) -> ProvisioningResult<ExternalIdpConfig> {
        self.deps
            .idp_registry
            .get_external_idp_config(name, tenant)
            .await
            .map_err(|source| ProvisioningError::ConfigResolution {
                tenant: tenant.to_string(),
                idp: name.to_string(),
                source,
            })?
            .ok_or_else(|| ProvisioningError::IdpNotFound {
                tenant: tenant.to_string(),
                idp: name.to_string(),
            })
    }

    fn redirect_to_sign_up(
        &self,
        idp: &ExternalIdpConfig,
        username: &Username,
        prefilled: &ClaimSet,
        response: &mut dyn ResponseSink,
        context: &mut FlowContext,
    ) -> ProvisioningResult<()> {
        if idp.modify_username_allowed {
            context.properties_mut().username_change_allowed = true;
        }

        let redirect = SignUpRedirect {
            username,
            context_id: context.context_id(),
            allow_change_username: idp.modify_username_allowed,
            password_provisioning: idp.password_provisioning_enabled,
            missing_claims: context.missing_claims(),
            prefilled,
        };
        let redirect_error = |source: anyhow::Error| ProvisioningError::Redirect {
            username: username.to_string(),
            idp: idp.name.to_string(),
            source,
        };

        let location = redirect
            .to_url(&self.endpoints)
            .map_err(|e| redirect_error(e.into()))?;
        response.send_redirect(location).map_err(redirect_error)
    }

    /// Hand the account to the user provisioner with the reserved claims set
    /// and roles mapped through the IdP configuration.
    async fn provision(
        &self,
        username: &Username,
        mut claims: ClaimSet,
        idp: &ExternalIdpConfig,
        step: &AuthenticationStepResult,
        context: &FlowContext,
    ) -> ProvisioningResult<()> {
        let roles = RoleMapper::map_roles(idp, &step.user.attributes, idp.effective_role_claim());

        claims.insert(ASSOCIATED_ID_CLAIM, step.user.subject.as_str());
        claims.insert(IDP_ID_CLAIM, step.idp.as_str());
        // Roles travel separately.
        claims.remove(&idp.local_role_claim_uri);
        claims.insert(USERNAME_CLAIM, username.as_str());

        self.deps
            .provisioner
            .provision_user(username, &claims, &roles, context)
            .await
            .map_err(|source| ProvisioningError::Provisioning {
                tenant: context.tenant().to_string(),
                idp: idp.name.to_string(),
                username: username.to_string(),
                source,
            })?;

        info!(
            tenant = %context.tenant(),
            idp = %idp.name,
            %username,
            roles = roles.len(),
            "Provisioned federated user"
        );
        Ok(())
    }

    /// Store the consent submitted with the sign-up form, if any. Runs after
    /// provisioning; a failure here leaves the account in place.
    async fn handle_consent(
        &self,
        request: &RequestParams,
        step: &AuthenticationStepResult,
        username: &Username,
        tenant: &TenantDomain,
    ) -> ProvisioningResult<()> {
        let Some(raw) = request.get_non_blank(CONSENT_PARAM) else {
            return Ok(());
        };

        let principal = self
            .deps
            .linkage
            .find_local_username(tenant, &step.idp, &step.user.subject)
            .await
            .map_err(|source| ProvisioningError::LinkageLookup {
                tenant: tenant.to_string(),
                idp: step.idp.to_string(),
                source,
            })?
            .unwrap_or_else(|| username.clone());

        let mut receipt = self
            .consent_builder
            .build(principal.as_str(), tenant, raw, request.get(POLICY_PARAM))
            .map_err(|source| ProvisioningError::ConsentBuild {
                tenant: tenant.to_string(),
                username: principal.to_string(),
                source,
            })?;

        let resident = self
            .deps
            .resident_idp
            .get_resident_idp(tenant)
            .await
            .map_err(|source| ProvisioningError::ResidentIdp {
                tenant: tenant.to_string(),
                source,
            })?
            .ok_or_else(|| ProvisioningError::ResidentIdpNotFound {
                tenant: tenant.to_string(),
            })?;
        ConsentReceiptBuilder::backfill(&mut receipt, &resident);

        self.deps
            .consent_store
            .persist_consent(&receipt)
            .await
            .map_err(|source| ProvisioningError::ConsentPersist {
                tenant: tenant.to_string(),
                username: principal.to_string(),
                source,
            })?;

        info!(%tenant, principal = %principal, services = receipt.services.len(), "Recorded JIT consent");
        Ok(())
    }
}

fn ordered_steps(context: &FlowContext) -> Vec<AuthenticationStepResult> {
    context.steps_in_order().into_iter().cloned().collect()
}

/// The name the sequence authenticated, falling back to the step's user.
fn authenticated_name(context: &FlowContext, step: &AuthenticationStepResult) -> Username {
    context
        .authenticated_user()
        .map(|u| u.username.clone())
        .unwrap_or_else(|| step.user.username.clone())
}

/// Qualify `name` with the tenant it is provisioned into.
///
/// A name already ending in `@<tenant>` is kept. Otherwise the text after the
/// last `@` is dropped and `@<tenant>` appended, except for the super tenant
/// whose users are unqualified.
pub fn tenant_qualified_username(
    name: &str,
    tenant: &TenantDomain,
    super_tenant: &TenantDomain,
) -> Username {
    if name.ends_with(&format!("@{tenant}")) {
        return Username::new(name);
    }
    let tenant_aware = name.rsplit_once('@').map_or(name, |(local, _)| local);
    if tenant.as_str().eq_ignore_ascii_case(super_tenant.as_str()) {
        Username::new(tenant_aware)
    } else {
        Username::new(format!("{tenant_aware}@{tenant}"))
    }
}
