// REST API endpoints for JIT provisioning

use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::claims::{ClaimSet, MissingClaim};
use crate::flow::{
    AuthenticatedUser, AuthenticationStepResult, FlowContext, FlowContextStore, RequestParams,
};
use crate::linkage::SurrealLinkageResolver;
use crate::provisioning::{
    ErrorKind, JitProvisioningHandler, ProvisioningError, ProvisioningOutcome, RedirectCapture,
};
use crate::types::{ContextId, TenantDomain};

/// Shared state of both routers. The handler is stateless, so no lock.
pub struct ApiState {
    pub handler: JitProvisioningHandler,
    pub flows: FlowContextStore,
    pub links: SurrealLinkageResolver,
}

pub type AppState = Arc<ApiState>;

pub fn create_public_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/flows", post(start_flow))
        .route("/commonauth", get(resume_flow_query).post(resume_flow_form))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub fn create_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tenants/{tenant}/links", get(list_links))
        .route("/flows/cleanup", post(cleanup_flows))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// JSON error body: stable code plus message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        error!("Internal error: {err:#}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL",
            "internal server error",
        )
    }
}

impl From<ProvisioningError> for ApiError {
    fn from(err: ProvisioningError) -> Self {
        let status = match (&err, err.kind()) {
            (ProvisioningError::IdpNotFound { .. }, _)
            | (ProvisioningError::ResidentIdpNotFound { .. }, _) => StatusCode::UNPROCESSABLE_ENTITY,
            (_, ErrorKind::ConsentBuild) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "status": "failed",
            "code": self.code,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// A completed authentication sequence handed over by the framework.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartFlowRequest {
    tenant: TenantDomain,
    #[serde(default)]
    context_id: Option<ContextId>,
    steps: Vec<AuthenticationStepResult>,
    #[serde(default)]
    authenticated_user: Option<AuthenticatedUser>,
    #[serde(default)]
    unfiltered_local_claims: Option<ClaimSet>,
    #[serde(default)]
    missing_claims: Vec<MissingClaim>,
}

impl StartFlowRequest {
    fn into_context(self) -> FlowContext {
        let context_id = self.context_id.unwrap_or_else(ContextId::generate);
        let mut context = FlowContext::new(context_id, self.tenant)
            .with_missing_claims(self.missing_claims);
        for step in self.steps {
            context = context.with_step(step);
        }
        if let Some(user) = self.authenticated_user {
            context = context.with_authenticated_user(user);
        }
        if let Some(claims) = self.unfiltered_local_claims {
            context = context.with_unfiltered_local_claims(claims);
        }
        context
    }
}

async fn start_flow(
    State(state): State<AppState>,
    Json(payload): Json<StartFlowRequest>,
) -> Result<Response, ApiError> {
    let mut context = payload.into_context();
    info!(context_id = %context.context_id(), tenant = %context.tenant(), "Evaluating new flow");
    evaluate_and_respond(&state, &RequestParams::new(), &mut context).await
}

// Fields are extracted as pairs so a repeated field keeps its first value.
type Pairs = Vec<(String, String)>;

async fn resume_flow_query(
    State(state): State<AppState>,
    Query(query): Query<Pairs>,
) -> Result<Response, ApiError> {
    resume_flow(&state, query.into_iter().collect()).await
}

/// Query string fields take precedence over form fields of the same name.
async fn resume_flow_form(
    State(state): State<AppState>,
    Query(query): Query<Pairs>,
    Form(form): Form<Pairs>,
) -> Result<Response, ApiError> {
    let mut params: RequestParams = query.into_iter().collect();
    params.extend(form.into_iter().collect());
    resume_flow(&state, params).await
}

async fn resume_flow(state: &ApiState, params: RequestParams) -> Result<Response, ApiError> {
    let Some(context_id) = params.context_id() else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "MISSING_SESSION_DATA_KEY",
            "sessionDataKey is required",
        ));
    };

    // Taking the context makes a replayed sessionDataKey a 404.
    let Some(mut context) = state
        .flows
        .take(&context_id)
        .await
        .map_err(ApiError::internal)?
    else {
        warn!(%context_id, "Resumed request for unknown flow");
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "UNKNOWN_FLOW",
            format!("no suspended flow for {context_id}"),
        ));
    };

    evaluate_and_respond(state, &params, &mut context).await
}

async fn evaluate_and_respond(
    state: &ApiState,
    params: &RequestParams,
    context: &mut FlowContext,
) -> Result<Response, ApiError> {
    let mut sink = RedirectCapture::new();
    match state.handler.evaluate(params, &mut sink, context).await {
        ProvisioningOutcome::Incomplete => {
            let Some(location) = sink.into_location() else {
                return Err(ApiError::internal(anyhow::anyhow!(
                    "flow {} suspended without a redirect",
                    context.context_id()
                )));
            };
            state.flows.save(context).await.map_err(ApiError::internal)?;
            Ok((StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response())
        }
        ProvisioningOutcome::Completed => Ok(Json(serde_json::json!({
            "status": "completed",
            "contextId": context.context_id(),
            "jitState": context.jit_state(),
            "authenticatedUser": context.authenticated_user(),
        }))
        .into_response()),
        ProvisioningOutcome::Failed(err) => Err(err.into()),
    }
}

async fn list_links(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let links = state
        .links
        .list(&TenantDomain::new(tenant))
        .await
        .map_err(ApiError::internal)?;

    let links: Vec<Value> = links
        .iter()
        .map(|l| {
            serde_json::json!({
                "idp": l.idp,
                "subject": l.subject,
                "username": l.username,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "links": links,
        "count": links.len(),
    })))
}

#[derive(Debug, Deserialize)]
struct CleanupRequest {
    max_age_secs: i64,
}

/// Drop suspended flows older than `max_age_secs`.
async fn cleanup_flows(
    State(state): State<AppState>,
    Json(payload): Json<CleanupRequest>,
) -> Result<Json<Value>, ApiError> {
    let cutoff = chrono::Utc::now() - chrono::Duration::seconds(payload.max_age_secs);
    let removed = state
        .flows
        .cleanup_older_than(cutoff)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::Request;
    use tower::ServiceExt;

    use crate::config::ProvisioningConfig;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};
    use crate::provisioning::SurrealUserProvisioner;

    async fn state() -> (AppState, SurrealUserProvisioner) {
        let db = create_connection(DatabaseConfig {
            url: "memory".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        ensure_schema(&db).await.unwrap();
        let state = crate::create_app_state(db.clone(), &ProvisioningConfig::sample());
        (state, SurrealUserProvisioner::new(db))
    }

    fn start_flow_body(idp: &str) -> String {
        serde_json::json!({
            "tenant": "acme",
            "contextId": "ctx-api",
            "steps": [{
                "step": 1,
                "idp": idp,
                "authenticatorName": "GoogleOIDCAuthenticator",
                "kind": "federated",
                "user": {
                    "username": "alice@gmail.com",
                    "subject": "alice@gmail.com",
                    "attributes": { "groups": "engineering" }
                }
            }],
            "unfilteredLocalClaims": {
                "http://wso2.org/claims/emailaddress": "alice@gmail.com"
            },
            "missingClaims": [
                { "uri": "http://wso2.org/claims/country", "displayName": "Country" }
            ]
        })
        .to_string()
    }

    fn post_json(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = state().await;
        let response = create_public_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_sign_up_round_trip() {
        let (state, users) = state().await;
        let app = create_public_router(state.clone());

        let response = app
            .clone()
            .oneshot(post_json("/flows", start_flow_body("GoogleIdP")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.contains("/accountrecoveryendpoint/signup.do"));
        assert!(location.contains("username=alice%40acme"));
        assert!(location.contains("sessionDataKey=ctx-api"));
        assert!(location.contains("passwordProvisionEnabled=true"));

        let resume = Request::builder()
            .method("POST")
            .uri("/commonauth?sessionDataKey=ctx-api")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(
                "missing-http%3A%2F%2Fwso2.org%2Fclaims%2Fcountry=USA&password=s3cret",
            ))
            .unwrap();
        let response = app.clone().oneshot(resume).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["jitState"], "COMPLETED");

        let user = users
            .find_user(&"acme".into(), &"alice@gmail.com".into())
            .await
            .unwrap()
            .unwrap();
        assert!(user.password_set);
        assert_eq!(user.claims.get("http://wso2.org/claims/country"), Some("USA"));
        assert_eq!(user.roles.len(), 1);
        assert_eq!(user.roles[0].as_str(), "developer");

        // The context was consumed.
        let replay = Request::get("/commonauth?sessionDataKey=ctx-api")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(replay).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // The next login from the same subject is linked and completes at once.
        let response = app
            .oneshot(post_json("/flows", start_flow_body("GoogleIdP")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let admin = create_admin_router(state);
        let response = admin
            .oneshot(Request::get("/tenants/acme/links").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["links"][0]["username"], "alice@gmail.com");
    }

    #[tokio::test]
    async fn test_query_field_wins_over_form_field() {
        let (state, _) = state().await;
        let app = create_public_router(state);
        let response = app
            .clone()
            .oneshot(post_json("/flows", start_flow_body("GoogleIdP")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);

        let resume = Request::builder()
            .method("POST")
            .uri("/commonauth?sessionDataKey=ctx-api")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("sessionDataKey=ctx-other"))
            .unwrap();
        let response = app.oneshot(resume).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["contextId"], "ctx-api");
    }

    #[tokio::test]
    async fn test_repeated_query_field_keeps_first_value() {
        let (state, _) = state().await;
        let app = create_public_router(state);
        let response = app
            .clone()
            .oneshot(post_json("/flows", start_flow_body("GoogleIdP")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);

        let resume = Request::get("/commonauth?sessionDataKey=ctx-api&sessionDataKey=ctx-other")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(resume).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["contextId"], "ctx-api");
    }

    #[tokio::test]
    async fn test_repeated_form_field_keeps_first_value() {
        let (state, _) = state().await;
        let app = create_public_router(state);
        let response = app
            .clone()
            .oneshot(post_json("/flows", start_flow_body("GoogleIdP")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);

        let resume = Request::builder()
            .method("POST")
            .uri("/commonauth")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("sessionDataKey=ctx-api&sessionDataKey=ctx-other"))
            .unwrap();
        let response = app.oneshot(resume).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["contextId"], "ctx-api");
    }

    #[tokio::test]
    async fn test_missing_session_data_key() {
        let (state, _) = state().await;
        let response = create_public_router(state)
            .oneshot(Request::get("/commonauth").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_idp_is_reported_with_code() {
        let (state, _) = state().await;
        let response = create_public_router(state)
            .oneshot(post_json("/flows", start_flow_body("UnknownIdP")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["code"], "JIT-60002");
        assert_eq!(body["status"], "failed");
    }

    #[tokio::test]
    async fn test_empty_consent_is_bad_request() {
        let (state, _) = state().await;
        let app = create_public_router(state);
        let response = app
            .clone()
            .oneshot(post_json("/flows", start_flow_body("GoogleIdP")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);

        let resume = Request::builder()
            .method("POST")
            .uri("/commonauth")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(
                "sessionDataKey=ctx-api&consent=%7B%22services%22%3A%5B%5D%7D",
            ))
            .unwrap();
        let response = app.oneshot(resume).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "JIT-60007");
    }

    #[tokio::test]
    async fn test_cleanup_endpoint() {
        let (state, _) = state().await;
        let response = create_public_router(state.clone())
            .oneshot(post_json("/flows", start_flow_body("GoogleIdP")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);

        let response = create_admin_router(state.clone())
            .oneshot(post_json(
                "/flows/cleanup",
                r#"{"max_age_secs": -60}"#.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["removed"], 1);
        assert!(
            state
                .flows
                .load(&ContextId::new("ctx-api"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
