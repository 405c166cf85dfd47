//! HTTP control surface
//!
//! Thin actix-web adapter over [`Router::handle`]: five JSON endpoints,
//! one per inbound control message, plus a health probe. All error
//! responses carry `{ code, message }` with the machine-readable code
//! from [`RouterError::code`].

pub mod routes;
pub mod state;

use crate::config::ServerConfig;
use crate::core::router::Router;
use crate::utils::error::RouterError;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, ResponseError};
use std::sync::Arc;
use tracing::info;

impl ResponseError for RouterError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NoProviderAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::AllProvidersExhausted { .. } => StatusCode::BAD_GATEWAY,
            Self::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Cancelled => StatusCode::REQUEST_TIMEOUT,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        match self {
            Self::AllProvidersExhausted { attempts } | Self::DeadlineExceeded { attempts } => {
                body["attempts"] = serde_json::to_value(attempts).unwrap_or_default();
            }
            _ => {}
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Run the control-surface server until shutdown.
pub async fn run(config: &ServerConfig, router: Arc<Router>) -> std::io::Result<()> {
    let bind = (config.host.clone(), config.port);
    info!(host = %config.host, port = config.port, "control surface listening");

    let state = web::Data::new(state::AppState { router });
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await
}
