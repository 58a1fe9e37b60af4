mod routes;
mod types;
pub mod websocket;

use crate::auth::{AllowAllAuthorizer, Authorizer, BearerTokenAuthorizer};
use crate::config::HTTPConfig;
use crate::http::routes::*;
use crate::http::types::HttpError;
use crate::http::websocket::WebSocketManager;
use crate::sms::SmsService;
use crate::TracingReloadHandle;
use anyhow::{bail, Result};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::routing::{get, post};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::log::{debug, warn};

#[derive(Clone)]
pub struct HttpState {
    pub sms_service: SmsService,
    pub config: HTTPConfig,
    pub tracing_reload: TracingReloadHandle,
    pub websocket: Option<WebSocketManager>,
}

async fn auth_middleware(
    axum::extract::State(authorizer): axum::extract::State<Arc<dyn Authorizer>>,
    headers: axum::http::HeaderMap,
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, HttpError> {
    if !authorizer.authorize(&headers) {
        return Err(HttpError {
            status: StatusCode::UNAUTHORIZED,
            message: "Missing or invalid authorization".to_string(),
        });
    }

    Ok(next.run(request).await)
}

pub fn create_app(
    config: HTTPConfig,
    websocket: Option<WebSocketManager>,
    sms_service: SmsService,
    _tracing_reload: TracingReloadHandle,
) -> Result<axum::Router> {
    let mut router = axum::Router::new()
        .route("/sms", post(create_sms).get(list_sms))
        .route("/sms/{id}", get(get_sms).delete(delete_sms))
        .route("/sms/{id}/store", post(store_sms))
        .route("/sms/{id}/send", post(send_sms))
        .route("/sys/phone-number", get(sys_phone_number))
        .route("/sys/version", get(sys_version))
        .route("/sys/set-log-level", post(sys_set_log_level))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-version"),
            HeaderValue::from_static(crate::VERSION),
        ))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    // Add optional websocket route if there is a manager.
    if websocket.is_some() {
        debug!("Adding WebSocket broadcaster HTTP route!");
        router = router.route("/ws", get(websocket_upgrade));
    }

    // Add the authorization middleware, backed by whichever Authorizer the
    // configuration calls for.
    let authorizer: Arc<dyn Authorizer> = if config.require_authentication {
        match &config.auth_token {
            Some(token) => {
                debug!("Adding HTTP authentication middleware (bearer token)!");
                Arc::new(BearerTokenAuthorizer::new(token.clone()))
            }
            None => bail!(
                "require_authentication is enabled but no http.auth_token was configured!"
            ),
        }
    } else {
        warn!("Serving HTTP without authentication middleware, as require_authentication is disabled!");
        Arc::new(AllowAllAuthorizer)
    };
    router = router.layer(axum::middleware::from_fn_with_state(authorizer, auth_middleware));

    // Shared HTTP route state.
    let state = HttpState {
        sms_service,
        config,
        tracing_reload: _tracing_reload,
        websocket,
    };
    Ok(router.with_state(state))
}
