//! Route handlers
//!
//! Each handler builds the corresponding typed control message and hands
//! it to the Router, so HTTP stays a thin skin over the transport-
//! agnostic surface.

use super::state::AppState;
use crate::core::types::{
    CancelFlag, ControlRequest, DispatchContext, DispatchRequest, RequestAction,
};
use crate::utils::error::RouterError;
use actix_web::{web, HttpResponse};
use chrono::Duration;
use serde::Deserialize;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .service(
            web::scope("/v1")
                .route("/dispatch", web::post().to(dispatch))
                .route("/providers", web::get().to(list_providers))
                .route("/providers/{name}/test", web::post().to(test_provider))
                .route("/providers/{name}/toggle", web::post().to(toggle_provider))
                .route("/failover/history", web::get().to(failover_history)),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct DispatchBody {
    #[serde(default = "default_action")]
    action: RequestAction,
    payload: serde_json::Value,
    /// Overall deadline for the dispatch, in milliseconds.
    #[serde(default)]
    deadline_ms: Option<u64>,
    #[serde(default)]
    max_attempts: Option<usize>,
    /// Restrict the dispatch to a single named provider.
    #[serde(default)]
    provider: Option<String>,
}

fn default_action() -> RequestAction {
    RequestAction::Analyze
}

async fn dispatch(
    state: web::Data<AppState>,
    body: web::Json<DispatchBody>,
) -> Result<HttpResponse, RouterError> {
    let body = body.into_inner();
    let now = chrono::Utc::now();

    let mut request = DispatchRequest::analyze(body.payload, now);
    request.action = body.action;
    request.max_attempts = body.max_attempts;
    request.pinned_provider = body.provider;

    let ctx = DispatchContext {
        deadline: body
            .deadline_ms
            .map(|ms| now + Duration::milliseconds(ms as i64)),
        cancel: CancelFlag::new(),
    };

    let response = state.router.dispatch(&request, &ctx).await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn list_providers(state: web::Data<AppState>) -> Result<HttpResponse, RouterError> {
    let value = state.router.handle(ControlRequest::ListProviders {}).await?;
    Ok(HttpResponse::Ok().json(value))
}

async fn test_provider(
    state: web::Data<AppState>,
    name: web::Path<String>,
) -> Result<HttpResponse, RouterError> {
    let value = state
        .router
        .handle(ControlRequest::TestProvider {
            name: name.into_inner(),
        })
        .await?;
    Ok(HttpResponse::Ok().json(value))
}

async fn toggle_provider(
    state: web::Data<AppState>,
    name: web::Path<String>,
) -> Result<HttpResponse, RouterError> {
    let value = state
        .router
        .handle(ControlRequest::ToggleProvider {
            name: name.into_inner(),
        })
        .await?;
    Ok(HttpResponse::Ok().json(value))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn failover_history(
    state: web::Data<AppState>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, RouterError> {
    let value = state
        .router
        .handle(ControlRequest::GetFailoverHistory { limit: query.limit })
        .await?;
    Ok(HttpResponse::Ok().json(value))
}
